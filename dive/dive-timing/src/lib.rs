//! Available-Timing CSV (C10): a strictly parsed, row-ordered stats table
//! with by-type and by-row lookup.
//!
//! Grounded on `original_source/dive_core/available_gpu_time.{h,cpp}`
//! (`kExpectedHeader`, per-row dispatch by `ObjectType`, dense-id
//! validation, the `m_loaded` single-load guard). The source hand-rolls a
//! stream-splitting CSV parser in C++; this crate uses the `csv` crate for
//! the same job, which is the idiomatic choice in this corpus for
//! structured text formats.

use dive_context::Context;
use dive_proto::{DiveError, Result};

/// The header row every timing CSV must start with, verbatim.
pub const EXPECTED_HEADER: &str = "Type,Id,Mean [ms],Median [ms]";
const EXPECTED_COLUMNS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Frame,
    CommandBuffer,
    RenderPass,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub mean_ms: f32,
    pub median_ms: f32,
}

/// An in-memory table built from a GPU-timing CSV. Load at most once per
/// instance; subsequent `load_*` calls fail with `AlreadyExists` and leave
/// the already-loaded state untouched.
#[derive(Debug, Default)]
pub struct AvailableTimingTable {
    loaded: bool,
    valid: bool,
    ordered: Vec<(ObjectType, u32)>,
    frame_stats: Option<Stats>,
    command_buffer_stats: Vec<Stats>,
    render_pass_stats: Vec<Stats>,
}

impl AvailableTimingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Loads from an already-read string (the CSV file content). Fails with
    /// `AlreadyExists` if already loaded, `InvalidArgument` on any malformed
    /// row, and leaves `self` unchanged in either failure case. `ctx` is
    /// polled once per row so a caller can abort parsing a very large table.
    pub fn load_from_str(&mut self, text: &str, ctx: &Context) -> Result<()> {
        if self.loaded {
            return Err(DiveError::already_exists(
                "timing table cannot be loaded twice",
            ));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());
        let mut records = reader.records();

        let header = records
            .next()
            .transpose()
            .map_err(|e| DiveError::invalid_argument(e.to_string()))?
            .ok_or_else(|| DiveError::invalid_argument("missing header row"))?;
        let header_line = header.iter().collect::<Vec<_>>().join(",");
        if header_line != EXPECTED_HEADER {
            return Err(DiveError::invalid_argument(format!(
                "unexpected header: {header_line}"
            )));
        }

        let mut ordered = Vec::new();
        let mut frame_stats = None;
        let mut command_buffer_stats = Vec::new();
        let mut render_pass_stats = Vec::new();

        for (row_index, record) in records.enumerate() {
            if ctx.is_cancelled() {
                return Err(DiveError::cancelled("timing table load cancelled"));
            }
            let record = record.map_err(|e| DiveError::invalid_argument(e.to_string()))?;
            if record.is_empty() {
                continue;
            }
            let row = row_index + 1;
            if record.len() != EXPECTED_COLUMNS {
                return Err(DiveError::invalid_argument(format!(
                    "row {row}: expected {EXPECTED_COLUMNS} columns, got {}",
                    record.len()
                )));
            }

            let kind = &record[0];
            let id: u32 = record[1]
                .parse()
                .map_err(|_| DiveError::invalid_argument(format!("row {row}: non-integer id")))?;
            let mean_ms = parse_strict_float(&record[2], row)?;
            let median_ms = parse_strict_float(&record[3], row)?;
            let stats = Stats { mean_ms, median_ms };

            match kind {
                "Frame" => {
                    if row != 1 {
                        return Err(DiveError::invalid_argument(format!(
                            "unexpected Frame row at position {row}, Frame must be first"
                        )));
                    }
                    frame_stats = Some(stats);
                    ordered.push((ObjectType::Frame, 0));
                }
                "CommandBuffer" => {
                    if command_buffer_stats.len() as u32 != id {
                        return Err(DiveError::invalid_argument(format!(
                            "row {row}: unexpected CommandBuffer id {id}, expected {}",
                            command_buffer_stats.len()
                        )));
                    }
                    command_buffer_stats.push(stats);
                    ordered.push((ObjectType::CommandBuffer, id));
                }
                "RenderPass" => {
                    if render_pass_stats.len() as u32 != id {
                        return Err(DiveError::invalid_argument(format!(
                            "row {row}: unexpected RenderPass id {id}, expected {}",
                            render_pass_stats.len()
                        )));
                    }
                    render_pass_stats.push(stats);
                    ordered.push((ObjectType::RenderPass, id));
                }
                other => {
                    return Err(DiveError::invalid_argument(format!(
                        "row {row}: unrecognized type {other}"
                    )))
                }
            }
        }

        if frame_stats.is_none() {
            return Err(DiveError::invalid_argument("missing required Frame row"));
        }
        let total_rows = 1 + command_buffer_stats.len() + render_pass_stats.len();
        if total_rows != ordered.len() {
            return Err(DiveError::invalid_argument(format!(
                "inconsistent row count: {} entries for {total_rows} stats",
                ordered.len()
            )));
        }

        tracing::debug!(
            rows = ordered.len(),
            command_buffers = command_buffer_stats.len(),
            render_passes = render_pass_stats.len(),
            "loaded available-timing table"
        );

        self.loaded = true;
        self.valid = true;
        self.ordered = ordered;
        self.frame_stats = frame_stats;
        self.command_buffer_stats = command_buffer_stats;
        self.render_pass_stats = render_pass_stats;
        Ok(())
    }

    /// Loads from a file on disk.
    pub fn load_from_csv(&mut self, path: &std::path::Path, ctx: &Context) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        self.load_from_str(&text, ctx)
    }

    /// Looks up stats by object type and per-frame id. The id is ignored for
    /// `ObjectType::Frame`. Returns `None` if unloaded/invalid or out of
    /// range.
    pub fn stats_by_type(&self, object_type: ObjectType, object_id: u32) -> Option<Stats> {
        if !self.valid {
            return None;
        }
        match object_type {
            ObjectType::Frame => self.frame_stats,
            ObjectType::CommandBuffer => self.command_buffer_stats.get(object_id as usize).copied(),
            ObjectType::RenderPass => self.render_pass_stats.get(object_id as usize).copied(),
        }
    }

    /// Looks up stats by file-order row index, 1-based (row 1 is the first
    /// data row after the header). Returns `None` if unloaded/invalid or out
    /// of range.
    pub fn stats_by_row(&self, row_index_1_based: u32) -> Option<Stats> {
        if !self.valid || row_index_1_based == 0 {
            return None;
        }
        let (object_type, object_id) = *self.ordered.get((row_index_1_based - 1) as usize)?;
        self.stats_by_type(object_type, object_id)
    }

    pub fn row_count(&self) -> usize {
        self.ordered.len()
    }
}

/// Parses a CSV field as `f32`, rejecting integer-looking tokens like `"10"`
/// even though they would otherwise parse fine — the columns are floats
/// only (§8's "integer-typed mean/median... must be rejected").
fn parse_strict_float(field: &str, row: usize) -> Result<f32> {
    if !field.contains('.') {
        return Err(DiveError::invalid_argument(format!(
            "row {row}: expected a float value, got integer-looking token {field:?}"
        )));
    }
    field
        .parse()
        .map_err(|_| DiveError::invalid_argument(format!("row {row}: invalid float {field:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Type,Id,Mean [ms],Median [ms]\nFrame,10,0.345,0.341\nCommandBuffer,0,0.001,0.002\n";

    #[test]
    fn loads_and_validates_the_documented_sample() {
        let mut table = AvailableTimingTable::new();
        table.load_from_str(SAMPLE, &Context::background()).unwrap();
        assert!(table.is_valid());
        assert_eq!(
            table.stats_by_type(ObjectType::Frame, 0),
            Some(Stats {
                mean_ms: 0.345,
                median_ms: 0.341
            })
        );
        assert_eq!(
            table.stats_by_type(ObjectType::CommandBuffer, 0),
            Some(Stats {
                mean_ms: 0.001,
                median_ms: 0.002
            })
        );
    }

    #[test]
    fn reloading_the_same_instance_fails_and_leaves_state_untouched() {
        let mut table = AvailableTimingTable::new();
        table.load_from_str(SAMPLE, &Context::background()).unwrap();
        let err = table.load_from_str(SAMPLE, &Context::background()).unwrap_err();
        assert_eq!(err.code(), dive_proto::StatusCode::AlreadyExists);
        assert!(table.is_valid());
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn row_count_matches_stats_counts_plus_one() {
        let csv = "Type,Id,Mean [ms],Median [ms]\nFrame,1,1.0,1.0\nCommandBuffer,0,0.1,0.1\nCommandBuffer,1,0.2,0.2\nRenderPass,0,0.3,0.3\n";
        let mut table = AvailableTimingTable::new();
        table.load_from_str(csv, &Context::background()).unwrap();
        assert_eq!(table.row_count(), 4);
        for row in 1..=4 {
            assert!(table.stats_by_row(row).is_some());
        }
        assert!(table.stats_by_row(5).is_none());
        assert!(table.stats_by_row(0).is_none());
    }

    #[test]
    fn integer_looking_mean_is_rejected() {
        let csv = "Type,Id,Mean [ms],Median [ms]\nFrame,1,10,20\n";
        let mut table = AvailableTimingTable::new();
        let err = table.load_from_str(csv, &Context::background()).unwrap_err();
        assert_eq!(err.code(), dive_proto::StatusCode::InvalidArgument);
    }

    #[test]
    fn wrong_header_is_rejected() {
        let csv = "Type,Id,Mean,Median\nFrame,1,1.0,1.0\n";
        let mut table = AvailableTimingTable::new();
        let err = table.load_from_str(csv, &Context::background()).unwrap_err();
        assert_eq!(err.code(), dive_proto::StatusCode::InvalidArgument);
    }

    #[test]
    fn non_dense_command_buffer_ids_are_rejected() {
        let csv = "Type,Id,Mean [ms],Median [ms]\nFrame,1,1.0,1.0\nCommandBuffer,1,0.1,0.1\n";
        let mut table = AvailableTimingTable::new();
        let err = table.load_from_str(csv, &Context::background()).unwrap_err();
        assert_eq!(err.code(), dive_proto::StatusCode::InvalidArgument);
    }

    #[test]
    fn out_of_range_lookups_return_none() {
        let mut table = AvailableTimingTable::new();
        table.load_from_str(SAMPLE, &Context::background()).unwrap();
        assert!(table.stats_by_type(ObjectType::CommandBuffer, 5).is_none());
        assert!(table.stats_by_type(ObjectType::RenderPass, 0).is_none());
    }
}
