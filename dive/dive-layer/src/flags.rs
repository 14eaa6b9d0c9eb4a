//! Feature flags (C7.4's interception behavior table), loaded once from the
//! environment at layer load time. Grounded on the file-scope statics in
//! `original_source/runtime_layer/vk_rt_layer_impl.cc`
//! (`sEnableDrawcallReport`, `sEnableDrawcallLimit`, `sEnableDrawcallFilter`,
//! `sEnableOpenXRGPUTiming`, `sRemoveImageFlagFDMOffset`,
//! `sRemoveImageFlagSubSampled`, `sDisableTimestamp`) — the original reads
//! these from a settings file; this shell reads them from environment
//! variables, since the layer has no configuration crate of its own (C10.3
//! restricts `clap` to `dive-host`).

use std::sync::OnceLock;

/// Drawcalls beyond this count are suppressed when `enable_drawcall_limit`
/// is set.
pub const DRAWCALL_COUNT_LIMIT: u32 = 300;

/// Index counts that are suppressed when `enable_drawcall_filter` is set —
/// these match the visibility-mask geometry the original runtime emits for
/// headset lens distortion and aren't representative application work.
pub const VISIBILITY_MASK_INDEX_COUNTS: [u32; 2] = [42, 84];

#[derive(Debug, Clone, Copy)]
pub struct LayerFlags {
    pub enable_drawcall_report: bool,
    pub enable_drawcall_limit: bool,
    pub enable_drawcall_filter: bool,
    pub enable_openxr_gpu_timing: bool,
    pub remove_image_flag_fdm_offset: bool,
    pub remove_image_flag_subsampled: bool,
    pub disable_timestamp: bool,
}

impl LayerFlags {
    fn from_env() -> Self {
        Self {
            enable_drawcall_report: env_bool("DIVE_ENABLE_DRAWCALL_REPORT"),
            enable_drawcall_limit: env_bool("DIVE_ENABLE_DRAWCALL_LIMIT"),
            enable_drawcall_filter: env_bool("DIVE_ENABLE_DRAWCALL_FILTER"),
            enable_openxr_gpu_timing: env_bool("DIVE_ENABLE_OPENXR_GPU_TIMING"),
            remove_image_flag_fdm_offset: env_bool("DIVE_REMOVE_IMAGE_FLAG_FDM_OFFSET"),
            remove_image_flag_subsampled: env_bool("DIVE_REMOVE_IMAGE_FLAG_SUBSAMPLED"),
            disable_timestamp: env_bool("DIVE_DISABLE_TIMESTAMP"),
        }
    }
}

fn env_bool(name: &str) -> bool {
    matches!(std::env::var(name).as_deref(), Ok("1") | Ok("true") | Ok("TRUE"))
}

static FLAGS: OnceLock<LayerFlags> = OnceLock::new();

/// Returns the process-wide flag set, read from the environment on first
/// use and cached for the lifetime of the loaded layer.
pub fn flags() -> LayerFlags {
    *FLAGS.get_or_init(LayerFlags::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_bool_accepts_only_truthy_spellings() {
        assert!(!env_bool("DIVE_LAYER_FLAGS_TEST_UNSET_VAR"));
    }
}
