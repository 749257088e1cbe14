//! Loading instruction sequences from named sources.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::servo::ServoLimits;

use super::LoadError;
use super::instruction::{Instruction, TimedInstruction};
use super::row::split_fields;
use super::timeline::Timeline;

/// A `PARALLEL_SEQUENCE` reference extracted from a source: the nested
/// source name and the offset its playback is triggered at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedSequenceRef {
    pub offset: Duration,
    pub source: String,
}

/// Loads and assembles instruction timelines from a sequence directory.
#[derive(Debug, Clone)]
pub struct InstructionSet {
    dir: PathBuf,
    default_move_time_ms: u32,
    limits: Arc<ServoLimits>,
}

impl InstructionSet {
    pub fn new(dir: impl Into<PathBuf>, default_move_time_ms: u32, limits: Arc<ServoLimits>) -> Self {
        Self {
            dir: dir.into(),
            default_move_time_ms,
            limits,
        }
    }

    fn source_path(&self, source: &str) -> PathBuf {
        self.dir.join(source)
    }

    /// Parses one source into a timeline plus its nested-sequence
    /// references. `PARALLEL_SEQUENCE` rows stay in the timeline as trigger
    /// instructions *and* are returned as refs so callers can pre-resolve
    /// the nested sources.
    pub fn load(&self, source: &str) -> Result<(Timeline, Vec<NestedSequenceRef>), LoadError> {
        let path = self.source_path(source);
        let contents = read_source(&path, source)?;

        let mut timeline = Timeline::new();
        let mut nested = Vec::new();

        // First non-empty line is the header row.
        let mut rows = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());
        rows.next();

        for (index, line) in rows {
            let line_no = index + 1;
            let fields = split_fields(line).ok_or_else(|| LoadError::Parse {
                line: line_no,
                reason: "unterminated quoted field".to_string(),
            })?;
            let instruction = TimedInstruction::from_row(
                &fields,
                line_no,
                self.default_move_time_ms,
                &self.limits,
            )?;

            if let Instruction::NestedSequence(nested_source) = &instruction.instruction {
                nested.push(NestedSequenceRef {
                    offset: instruction.offset,
                    source: nested_source.clone(),
                });
            }
            timeline.insert(instruction);
        }

        tracing::debug!(
            source,
            offsets = timeline.len(),
            instructions = timeline.instruction_count(),
            nested = nested.len(),
            "loaded instruction source"
        );
        Ok((timeline, nested))
    }

    /// Builds one fully merged timeline: nested references are loaded
    /// recursively, shifted to their trigger offset and merged in, and the
    /// trigger instructions dropped. A nested source that fails to load, or
    /// one that refers back into its own ancestry, is logged and skipped;
    /// only a root load failure is an error.
    pub fn build(&self, source: &str) -> Result<Timeline, LoadError> {
        let mut chain = vec![source.to_string()];
        self.build_inner(source, &mut chain)
    }

    fn build_inner(&self, source: &str, chain: &mut Vec<String>) -> Result<Timeline, LoadError> {
        let (mut timeline, nested) = self.load(source)?;
        timeline.drop_nested_triggers();

        for reference in nested {
            if chain.iter().any(|seen| *seen == reference.source) {
                tracing::warn!(
                    source = %reference.source,
                    via = %source,
                    "nested sequence cycle detected, skipping"
                );
                continue;
            }
            chain.push(reference.source.clone());
            match self.build_inner(&reference.source, chain) {
                Ok(child) => timeline.merge(child.shifted(reference.offset)),
                Err(error) => {
                    tracing::warn!(
                        source = %reference.source,
                        %error,
                        "skipping nested sequence that failed to load"
                    );
                }
            }
            chain.pop();
        }

        Ok(timeline)
    }
}

fn read_source(path: &Path, source: &str) -> Result<String, LoadError> {
    if !path.is_file() {
        return Err(LoadError::NotFound {
            name: source.to_string(),
        });
    }
    std::fs::read_to_string(path).map_err(|error| LoadError::Io {
        name: source.to_string(),
        error,
    })
}
