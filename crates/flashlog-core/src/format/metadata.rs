use serde::{Deserialize, Serialize};

use crate::error::FlashlogError;
use crate::types::Result;

/// Source location and format string of one log call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMetadata {
    pub file: String,
    pub line: u32,
    pub format: String,
}

/// Immutable directory mapping log ids to call-site metadata.
///
/// The table is produced outside this crate (by whatever generates the
/// call-site code) and loaded once; entry `i` describes log id `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataTable {
    entries: Vec<LogMetadata>,
}

impl MetadataTable {
    pub fn from_entries(entries: Vec<LogMetadata>) -> Self {
        Self { entries }
    }

    /// Loads a table from its JSON representation: an array of
    /// `{ "file", "line", "format" }` objects indexed by log id.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let entries: Vec<LogMetadata> = serde_json::from_slice(bytes)
            .map_err(|err| FlashlogError::Other(anyhow::anyhow!("metadata table: {err}")))?;
        Ok(Self { entries })
    }

    pub fn get(&self, log_id: u32) -> Option<&LogMetadata> {
        self.entries.get(log_id as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `(id, metadata)` for every entry whose format string contains
    /// `needle`.
    pub fn matching<'a>(&'a self, needle: &str) -> Vec<(u32, &'a LogMetadata)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.format.contains(needle))
            .map(|(id, entry)| (id as u32, entry))
            .collect()
    }
}
