use std::path::Path;

use pktsched_record::{HEADER_WORDS, SUBHEADER_WORDS, TRAILER_WORDS};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Static pipeline configuration, fixed before the first round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Number of ingress lanes.
    pub lanes: usize,
    /// Descriptor Queue depth per lane (also its credit maximum).
    pub descriptor_queue_depth: usize,
    /// Payload Queue depth per lane, in words.
    pub payload_queue_depth: usize,
    /// Handle Queue depth per lane.
    pub handle_queue_depth: usize,
    /// Shared storage size in words.
    pub storage_words: usize,
    /// Number of tiles shared storage is split into.
    pub tiles: usize,
    /// Frame table entries per tile.
    pub entries_per_tile: usize,
    /// Largest hit count a subheader may declare.
    pub max_hits_per_block: usize,
    /// Largest subheader count a header may declare.
    pub max_blocks_per_frame: usize,
    /// Gap, in slots, the allocator steps through one slot per round while
    /// every lane is held on a future descriptor. A wider gap is crossed in
    /// a single jump. Future descriptors are never dropped.
    pub future_slack: u64,
    /// Words a lane may be granted per slot before it must yield the write port.
    pub arbiter_quantum: u32,
    /// Presenter read pipeline depth; a consumer stall rolls back this far.
    pub presenter_pipeline_depth: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lanes: 2,
            descriptor_queue_depth: 16,
            payload_queue_depth: 1024,
            handle_queue_depth: 4,
            storage_words: 8192,
            tiles: 4,
            entries_per_tile: 32,
            max_hits_per_block: 255,
            max_blocks_per_frame: 128,
            future_slack: 16,
            arbiter_quantum: 64,
            presenter_pipeline_depth: 2,
        }
    }
}

impl SchedulerConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Words per tile.
    pub fn tile_words(&self) -> usize {
        self.storage_words / self.tiles.max(1)
    }

    /// Check the configuration for values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let nonzero = [
            ("lanes", self.lanes),
            ("payload_queue_depth", self.payload_queue_depth),
            ("handle_queue_depth", self.handle_queue_depth),
            ("storage_words", self.storage_words),
            ("entries_per_tile", self.entries_per_tile),
            ("max_hits_per_block", self.max_hits_per_block),
            ("max_blocks_per_frame", self.max_blocks_per_frame),
            ("presenter_pipeline_depth", self.presenter_pipeline_depth),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(invalid(format!("{name} must be greater than zero")));
            }
        }
        if self.arbiter_quantum == 0 {
            return Err(invalid("arbiter_quantum must be greater than zero"));
        }
        if self.descriptor_queue_depth < 2 {
            return Err(invalid(
                "descriptor_queue_depth must be at least 2 (one slot is reserved for masked blocks)",
            ));
        }
        if self.tiles < 2 {
            return Err(invalid("tiles must be at least 2"));
        }
        if self.storage_words % self.tiles != 0 {
            return Err(invalid(format!(
                "storage_words ({}) must be divisible by tiles ({})",
                self.storage_words, self.tiles
            )));
        }
        if self.payload_queue_depth < self.max_hits_per_block {
            return Err(invalid(format!(
                "payload_queue_depth ({}) must hold at least one full block ({})",
                self.payload_queue_depth, self.max_hits_per_block
            )));
        }
        if self.max_hits_per_block > usize::from(u16::MAX) {
            return Err(invalid("max_hits_per_block must fit in 16 bits"));
        }
        if self.max_blocks_per_frame > usize::from(u16::MAX) {
            return Err(invalid("max_blocks_per_frame must fit in 16 bits"));
        }
        let smallest_frame = HEADER_WORDS + SUBHEADER_WORDS + TRAILER_WORDS;
        if self.tile_words() < smallest_frame {
            return Err(invalid(format!(
                "tile of {} words cannot hold the smallest frame ({smallest_frame} words)",
                self.tile_words()
            )));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> SchedulerError {
    SchedulerError::InvalidConfig(message.into())
}
