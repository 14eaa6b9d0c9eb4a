//! The intercepted call bodies (C7.4's behavior table), grounded on
//! `original_source/runtime_layer/vk_rt_layer_impl.cc`'s `DiveRuntimeLayer`
//! method overrides. Each function here is called from the exported
//! trampolines in `entry.rs` after dispatch-table/device-data lookup; the
//! active [`LayerFlags`] are threaded in explicitly rather than read from
//! the process-global cache here, so these stay unit-testable without
//! environment-variable ordering games.

use ash::vk;

use crate::drawcall::DrawcallCounters;
use crate::flags::LayerFlags;
use crate::state::DeviceData;

/// `VK_IMAGE_CREATE_FRAGMENT_DENSITY_MAP_OFFSET_BIT_QCOM`, not bound by the
/// base `ash::vk::ImageCreateFlags` without the QCOM extension feature.
const IMAGE_CREATE_FRAGMENT_DENSITY_MAP_OFFSET_BIT_QCOM: u32 = 0x0000_2000;
/// `VK_IMAGE_CREATE_SUBSAMPLED_BIT_EXT`.
const IMAGE_CREATE_SUBSAMPLED_BIT_EXT: u32 = 0x0000_4000;

/// The debug-utils label payload that demarcates presentable work in
/// OpenXR contexts, null-terminated for direct comparison against
/// `vkCmdInsertDebugUtilsLabelEXT`'s `pLabelInfo->pLabelName`.
pub const FRAME_BOUNDARY_LABEL_CSTR: &[u8] = b"vr-marker,frame_end,type,application\0";

/// Clears the FDM-offset/subsampled image creation flags when the
/// corresponding layer flag is set, matching `CreateImage`'s flag-masking
/// in the original.
pub fn masked_image_create_flags(flags: LayerFlags, raw_flags: u32) -> u32 {
    let mut out = raw_flags;
    if flags.remove_image_flag_fdm_offset {
        out &= !IMAGE_CREATE_FRAGMENT_DENSITY_MAP_OFFSET_BIT_QCOM;
    }
    if flags.remove_image_flag_subsampled {
        out &= !IMAGE_CREATE_SUBSAMPLED_BIT_EXT;
    }
    out
}

/// `CmdDrawIndexed`'s report/limit/filter gate.
pub fn should_forward_draw_indexed(
    flags: LayerFlags,
    counters: &mut DrawcallCounters,
    index_count: u32,
) -> bool {
    counters.should_forward(flags, index_count)
}

/// Arms `dive-gputime` timestamp tracking for a command buffer at
/// `vkBeginCommandBuffer`, returning the begin-query index to emit (if the
/// pool isn't exhausted) and resetting the drawcall counters for the
/// recording session, matching `BeginCommandBuffer`'s two side effects in
/// the original.
pub fn on_begin_command_buffer(
    data: &DeviceData,
    flags: LayerFlags,
    cb: u64,
    one_time_submit: bool,
) -> Option<u32> {
    data.drawcalls.lock().reset();
    if flags.disable_timestamp {
        return None;
    }
    data.tracker
        .lock()
        .on_begin_command_buffer(cb, one_time_submit)
        .ok()
}

/// Returns the end-query index to emit at `vkEndCommandBuffer`, if this
/// command buffer was armed at `BeginCommandBuffer`.
pub fn on_end_command_buffer(data: &DeviceData, flags: LayerFlags, cb: u64) -> Option<u32> {
    if flags.disable_timestamp {
        return None;
    }
    data.tracker.lock().on_end_command_buffer(cb)
}

/// Marks a frame boundary if `label` matches the debug-utils marker the
/// OpenXR runtime inserts, only when `enable_openxr_gpu_timing` is set.
pub fn on_cmd_insert_debug_utils_label(
    data: &DeviceData,
    flags: LayerFlags,
    cb: u64,
    label: &std::ffi::CStr,
) {
    if !flags.enable_openxr_gpu_timing {
        return;
    }
    if label.to_bytes_with_nul() == FRAME_BOUNDARY_LABEL_CSTR {
        data.tracker
            .lock()
            .on_cmd_insert_debug_utils_label(cb, dive_gputime::FRAME_BOUNDARY_LABEL);
    }
}

/// `QueueSubmit`'s post-submission bookkeeping: reports whether a frame
/// boundary was observed and which query ranges need resolving.
pub fn on_queue_submit(
    data: &DeviceData,
    flags: LayerFlags,
    submitted: &[u64],
) -> dive_gputime::SubmitOutcome {
    if flags.disable_timestamp {
        return dive_gputime::SubmitOutcome::default();
    }
    data.tracker.lock().on_queue_submit(submitted)
}

/// Converts resolved `(begin, end)` tick pairs into a frame duration and
/// folds it into the rolling statistics window.
pub fn finish_frame(data: &DeviceData, resolved_ticks: &[(u64, u64)]) -> Option<f64> {
    data.tracker.lock().finish_frame(resolved_ticks)
}

pub fn on_get_device_queue(data: &DeviceData, queue: u64) {
    data.tracker.lock().on_get_device_queue(queue);
}

pub fn on_allocate_command_buffers(data: &DeviceData, pool: u64, buffers: &[u64]) {
    data.tracker.lock().on_allocate_command_buffers(pool, buffers);
}

pub fn on_free_command_buffers(data: &DeviceData, buffers: &[u64]) {
    data.tracker.lock().on_free_command_buffers(buffers);
}

pub fn on_reset_command_buffer(data: &DeviceData, cb: u64) {
    data.tracker.lock().on_reset_command_buffer(cb);
}

pub fn on_reset_command_pool(data: &DeviceData, pool: u64) {
    data.tracker.lock().on_reset_command_pool(pool);
}

pub fn on_destroy_command_pool(data: &DeviceData, pool: u64) {
    data.tracker.lock().on_destroy_command_pool(pool);
}

/// Reads `device`'s timestamp period, cached on `GpuTimeTracker` at
/// `vkCreateDevice` the same way `DiveRuntimeLayer` caches
/// `VkPhysicalDeviceLimits::timestampPeriod`.
pub fn timestamp_period_ns(limits: &vk::PhysicalDeviceLimits) -> f32 {
    limits.timestamp_period
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(
        report: bool,
        limit: bool,
        filter: bool,
        openxr: bool,
        fdm: bool,
        subsampled: bool,
        disable_ts: bool,
    ) -> LayerFlags {
        LayerFlags {
            enable_drawcall_report: report,
            enable_drawcall_limit: limit,
            enable_drawcall_filter: filter,
            enable_openxr_gpu_timing: openxr,
            remove_image_flag_fdm_offset: fdm,
            remove_image_flag_subsampled: subsampled,
            disable_timestamp: disable_ts,
        }
    }

    #[test]
    fn fdm_offset_flag_clears_only_its_own_bit() {
        let masked = masked_image_create_flags(
            flags(false, false, false, false, true, false, false),
            IMAGE_CREATE_FRAGMENT_DENSITY_MAP_OFFSET_BIT_QCOM | IMAGE_CREATE_SUBSAMPLED_BIT_EXT,
        );
        assert_eq!(masked, IMAGE_CREATE_SUBSAMPLED_BIT_EXT);
    }

    #[test]
    fn both_image_flags_clear_together() {
        let masked = masked_image_create_flags(
            flags(false, false, false, false, true, true, false),
            IMAGE_CREATE_FRAGMENT_DENSITY_MAP_OFFSET_BIT_QCOM
                | IMAGE_CREATE_SUBSAMPLED_BIT_EXT
                | 0x1,
        );
        assert_eq!(masked, 0x1);
    }

    #[test]
    fn disabled_flags_leave_raw_flags_untouched() {
        let raw = IMAGE_CREATE_FRAGMENT_DENSITY_MAP_OFFSET_BIT_QCOM;
        assert_eq!(
            masked_image_create_flags(flags(false, false, false, false, false, false, false), raw),
            raw
        );
    }

    #[test]
    fn drawcall_forwarding_delegates_to_counters() {
        let mut counters = DrawcallCounters::default();
        let f = flags(true, true, false, false, false, false, false);
        assert!(should_forward_draw_indexed(f, &mut counters, 6));
        assert_eq!(counters.drawcall_count(), 1);
    }
}
