//! Capture File Resolver (C8): a pure function mapping one user-provided
//! `.gfxr` stem to the set of sibling component files that together make up
//! a single Dive capture.
//!
//! Grounded on `original_source/utils/component_files.{h,cc}` and its
//! constants table in `component_files_constants.h`; the derivation rule and
//! every failure message below mirror
//! `original_source/src/dive/utils/component_files_test.cpp`.

use std::path::{Path, PathBuf};

use dive_proto::{DiveError, Result};

const GFXR_SUBSTR: &str = "_trim_trigger_";
const GFXA_SUBSTR: &str = "_asset_file_";

const GFXR_EXT: &str = "gfxr";
const GFXA_EXT: &str = "gfxa";
const RD_EXT: &str = "rd";
const PNG_EXT: &str = "png";
const CSV_EXT: &str = "csv";
const RDC_EXT: &str = "rdc";

const PROFILING_METRICS_SUFFIX: &str = "_profiling_metrics";
const GPU_TIMING_SUFFIX: &str = "_gpu_time";
const RENDERDOC_SUFFIX: &str = "_capture";

/// The presumed filepaths of every file associated with one Dive capture.
/// Existence is not checked; this is a pure name derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentFilePaths {
    pub gfxr: PathBuf,
    pub gfxa: PathBuf,
    pub perf_counter_csv: PathBuf,
    pub gpu_timing_csv: PathBuf,
    pub pm4_rd: PathBuf,
    pub screenshot_png: PathBuf,
    pub renderdoc_rdc: PathBuf,
}

/// Derives the component file set for a capture given its parent directory
/// and the stem of its `.gfxr` file (no extension, no path separators).
///
/// `gfxr_stem` MUST contain the literal substring `_trim_trigger_`; the
/// `.gfxa` sibling is derived by replacing that substring with
/// `_asset_file_`. Fails with `FailedPrecondition` if `gfxr_stem` or
/// `parent_dir` is empty, contains a path separator, or lacks the required
/// substring.
pub fn component_paths(parent_dir: &Path, gfxr_stem: &str) -> Result<ComponentFilePaths> {
    if gfxr_stem.is_empty() {
        return Err(DiveError::failed_precondition("gfxr_stem cannot be empty"));
    }
    if parent_dir.as_os_str().is_empty() {
        return Err(DiveError::failed_precondition("parent_dir cannot be empty"));
    }
    if gfxr_stem.contains('/') || gfxr_stem.contains('\\') {
        return Err(DiveError::failed_precondition(format!(
            "unexpected name for gfxr file: {gfxr_stem}, not a stem"
        )));
    }
    let Some(pos) = gfxr_stem.find(GFXR_SUBSTR) else {
        return Err(DiveError::failed_precondition(format!(
            "unexpected name for gfxr file: {gfxr_stem}, expecting name containing: {GFXR_SUBSTR}"
        )));
    };
    let gfxa_stem = format!(
        "{}{}{}",
        &gfxr_stem[..pos],
        GFXA_SUBSTR,
        &gfxr_stem[pos + GFXR_SUBSTR.len()..]
    );

    Ok(ComponentFilePaths {
        gfxr: parent_dir.join(format!("{gfxr_stem}.{GFXR_EXT}")),
        gfxa: parent_dir.join(format!("{gfxa_stem}.{GFXA_EXT}")),
        perf_counter_csv: parent_dir.join(format!("{gfxr_stem}{PROFILING_METRICS_SUFFIX}.{CSV_EXT}")),
        gpu_timing_csv: parent_dir.join(format!("{gfxr_stem}{GPU_TIMING_SUFFIX}.{CSV_EXT}")),
        pm4_rd: parent_dir.join(format!("{gfxr_stem}.{RD_EXT}")),
        screenshot_png: parent_dir.join(format!("{gfxr_stem}.{PNG_EXT}")),
        renderdoc_rdc: parent_dir.join(format!("{gfxr_stem}{RENDERDOC_SUFFIX}.{RDC_EXT}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_gfxr_stem_fails() {
        let err = component_paths(Path::new("PARENT/DIR"), "").unwrap_err();
        assert_eq!(err.code(), dive_proto::StatusCode::FailedPrecondition);
        assert_eq!(err.message, "gfxr_stem cannot be empty");
    }

    #[test]
    fn empty_parent_dir_fails() {
        let err = component_paths(Path::new(""), "PLACEHOLDER_trim_trigger_ID").unwrap_err();
        assert_eq!(err.code(), dive_proto::StatusCode::FailedPrecondition);
        assert_eq!(err.message, "parent_dir cannot be empty");
    }

    #[test]
    fn basic_derivation() {
        let parent = Path::new("PARENT/DIR");
        let paths = component_paths(parent, "PLACEHOLDER_trim_trigger_ID").unwrap();
        assert_eq!(paths.gfxr, parent.join("PLACEHOLDER_trim_trigger_ID.gfxr"));
        assert_eq!(paths.gfxa, parent.join("PLACEHOLDER_asset_file_ID.gfxa"));
        assert_eq!(
            paths.perf_counter_csv,
            parent.join("PLACEHOLDER_trim_trigger_ID_profiling_metrics.csv")
        );
        assert_eq!(
            paths.gpu_timing_csv,
            parent.join("PLACEHOLDER_trim_trigger_ID_gpu_time.csv")
        );
        assert_eq!(paths.pm4_rd, parent.join("PLACEHOLDER_trim_trigger_ID.rd"));
        assert_eq!(
            paths.screenshot_png,
            parent.join("PLACEHOLDER_trim_trigger_ID.png")
        );
        assert_eq!(
            paths.renderdoc_rdc,
            parent.join("PLACEHOLDER_trim_trigger_ID_capture.rdc")
        );
    }

    #[test]
    fn gfxr_substring_appearing_in_parent_path_is_harmless() {
        let parent = Path::new("PARENT/DIR/_trim_trigger_");
        let paths = component_paths(parent, "PLACEHOLDER_trim_trigger_ID").unwrap();
        assert_eq!(paths.gfxr, parent.join("PLACEHOLDER_trim_trigger_ID.gfxr"));
        assert_eq!(paths.gfxa, parent.join("PLACEHOLDER_asset_file_ID.gfxa"));
    }

    #[test]
    fn dot_in_gfxr_stem_is_allowed() {
        let parent = Path::new("PARENT/DIR");
        let paths = component_paths(parent, "PLACEHOLDER._trim_trigger_ID.test").unwrap();
        assert_eq!(
            paths.gfxr,
            parent.join("PLACEHOLDER._trim_trigger_ID.test.gfxr")
        );
        assert_eq!(
            paths.gfxa,
            parent.join("PLACEHOLDER._asset_file_ID.test.gfxa")
        );
        assert_eq!(
            paths.renderdoc_rdc,
            parent.join("PLACEHOLDER._trim_trigger_ID.test_capture.rdc")
        );
    }

    #[test]
    fn slash_in_gfxr_stem_fails() {
        let err =
            component_paths(Path::new("PARENT/DIR"), "PLACEHOLDER_trim_trigger_ID/oops").unwrap_err();
        assert_eq!(err.code(), dive_proto::StatusCode::FailedPrecondition);
        assert!(err.message.contains("not a stem"));
    }

    #[test]
    fn backslash_in_gfxr_stem_fails() {
        let err = component_paths(Path::new("PARENT/DIR"), "PLACEHOLDER_trim_trigger_ID\\oops")
            .unwrap_err();
        assert_eq!(err.code(), dive_proto::StatusCode::FailedPrecondition);
        assert!(err.message.contains("not a stem"));
    }

    #[test]
    fn missing_substring_fails() {
        let err = component_paths(Path::new("PARENT/DIR"), "PLACEHOLDER_oops_ID").unwrap_err();
        assert_eq!(err.code(), dive_proto::StatusCode::FailedPrecondition);
        assert!(err.message.contains("expecting name containing"));
    }

    #[test]
    fn derivation_is_idempotent() {
        let parent = Path::new("PARENT/DIR");
        let stem = "PLACEHOLDER_trim_trigger_ID";
        let first = component_paths(parent, stem).unwrap();
        let second = component_paths(parent, stem).unwrap();
        assert_eq!(first, second);
    }
}
