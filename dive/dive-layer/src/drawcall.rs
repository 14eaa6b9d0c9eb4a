//! Drawcall accounting for the `enable_drawcall_report`/`enable_drawcall_limit`/
//! `enable_drawcall_filter` flags. Grounded on the file-scope
//! `sDrawcallCounter`/`sTotalIndexCounter` counters in
//! `original_source/runtime_layer/vk_rt_layer_impl.cc`'s `CmdDrawIndexed`
//! override. The original resets these two process-wide statics at every
//! `vkBeginCommandBuffer`; here they live per device instead, since a
//! process-wide static would corrupt counts across concurrently recorded
//! command buffers on different devices.

use crate::flags::{LayerFlags, DRAWCALL_COUNT_LIMIT, VISIBILITY_MASK_INDEX_COUNTS};

#[derive(Debug, Default)]
pub struct DrawcallCounters {
    drawcall_count: u32,
    total_index_count: u64,
}

impl DrawcallCounters {
    pub fn reset(&mut self) {
        self.drawcall_count = 0;
        self.total_index_count = 0;
    }

    pub fn drawcall_count(&self) -> u32 {
        self.drawcall_count
    }

    pub fn total_index_count(&self) -> u64 {
        self.total_index_count
    }

    /// Decides whether a `vkCmdDrawIndexed` call with the given
    /// `index_count` should be forwarded to the next layer, and updates the
    /// running counters as the original does (counting every call that is
    /// not suppressed by the filter).
    pub fn should_forward(&mut self, flags: LayerFlags, index_count: u32) -> bool {
        if flags.enable_drawcall_filter && VISIBILITY_MASK_INDEX_COUNTS.contains(&index_count) {
            return false;
        }
        if flags.enable_drawcall_limit && self.drawcall_count >= DRAWCALL_COUNT_LIMIT {
            return false;
        }
        if flags.enable_drawcall_report {
            self.drawcall_count += 1;
            self.total_index_count += index_count as u64;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(report: bool, limit: bool, filter: bool) -> LayerFlags {
        LayerFlags {
            enable_drawcall_report: report,
            enable_drawcall_limit: limit,
            enable_drawcall_filter: filter,
            enable_openxr_gpu_timing: false,
            remove_image_flag_fdm_offset: false,
            remove_image_flag_subsampled: false,
            disable_timestamp: false,
        }
    }

    #[test]
    fn filter_suppresses_visibility_mask_geometry() {
        let mut counters = DrawcallCounters::default();
        for count in VISIBILITY_MASK_INDEX_COUNTS {
            assert!(!counters.should_forward(flags(false, false, true), count));
        }
        assert!(counters.should_forward(flags(false, false, true), 6));
    }

    #[test]
    fn limit_suppresses_once_the_cap_is_reached() {
        let mut counters = DrawcallCounters::default();
        let f = flags(true, true, false);
        for _ in 0..DRAWCALL_COUNT_LIMIT {
            assert!(counters.should_forward(f, 3));
        }
        assert!(!counters.should_forward(f, 3));
        assert_eq!(counters.drawcall_count(), DRAWCALL_COUNT_LIMIT);
    }

    #[test]
    fn report_accumulates_index_counts() {
        let mut counters = DrawcallCounters::default();
        let f = flags(true, false, false);
        counters.should_forward(f, 6);
        counters.should_forward(f, 12);
        assert_eq!(counters.drawcall_count(), 2);
        assert_eq!(counters.total_index_count(), 18);
    }

    #[test]
    fn reset_clears_both_counters() {
        let mut counters = DrawcallCounters::default();
        counters.should_forward(flags(true, false, false), 6);
        counters.reset();
        assert_eq!(counters.drawcall_count(), 0);
        assert_eq!(counters.total_index_count(), 0);
    }
}
