//! Artifact Store and snapshot versioning

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tracing::{debug, info};

use crate::error::{PagesmithError, Result};

/// A Document as it stood after a successful generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub document: String,
    pub turn_index: usize,
    pub created_at: SystemTime,
}

/// Outcome of a rollback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restored {
    /// Turn index of the snapshot that became live, `None` for the empty document
    pub from_turn_index: Option<usize>,
    /// Number of snapshots discarded by the truncation
    pub discarded: usize,
}

/// Holds the live Document, its snapshot history and the working copy that
/// direct edits are written to before they are synced.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    document: String,
    working: Option<String>,
    snapshots: Vec<Snapshot>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    /// Replace the live Document. Does not record a snapshot.
    pub fn set_document(&mut self, document: impl Into<String>) {
        self.document = document.into();
        self.working = None;
        debug!("Document replaced ({} bytes)", self.document.len());
    }

    pub fn working(&self) -> Option<&str> {
        self.working.as_deref()
    }

    /// Store the serialized state of in-progress direct edits
    pub fn set_working(&mut self, working: impl Into<String>) {
        self.working = Some(working.into());
    }

    /// What a surface reload should display: pending edits first
    pub fn effective(&self) -> &str {
        self.working.as_deref().unwrap_or(&self.document)
    }

    /// Append a snapshot. Turn indices must be strictly increasing.
    pub fn record_snapshot(&mut self, document: impl Into<String>, turn_index: usize) -> Result<()> {
        if let Some(last) = self.snapshots.last() {
            if turn_index <= last.turn_index {
                return Err(PagesmithError::state(format!(
                    "snapshot turn index {} is not after {}",
                    turn_index, last.turn_index
                )));
            }
        }
        self.snapshots.push(Snapshot {
            document: document.into(),
            turn_index,
            created_at: SystemTime::now(),
        });
        debug!("Recorded snapshot for turn {}", turn_index);
        Ok(())
    }

    /// The document in effect before `turn_index`: the snapshot with the
    /// greatest index below it, or the empty document.
    pub fn document_as_of(&self, turn_index: usize) -> &str {
        self.snapshot_before(turn_index)
            .map(|s| s.document.as_str())
            .unwrap_or("")
    }

    fn snapshot_before(&self, turn_index: usize) -> Option<&Snapshot> {
        self.snapshots
            .iter()
            .rev()
            .find(|s| s.turn_index < turn_index)
    }

    /// Roll the live Document back to what it was before `turn_index` and
    /// discard every snapshot at or after it.
    pub fn restore_as_of(&mut self, turn_index: usize) -> Restored {
        let (document, from_turn_index) = match self.snapshot_before(turn_index) {
            Some(snapshot) => (snapshot.document.clone(), Some(snapshot.turn_index)),
            None => (String::new(), None),
        };

        let before = self.snapshots.len();
        self.snapshots.retain(|s| s.turn_index < turn_index);
        let discarded = before - self.snapshots.len();

        self.document = document;
        self.working = None;

        info!(
            "Restored document as of turn {} (from {:?}, discarded {} snapshot(s))",
            turn_index, from_turn_index, discarded
        );
        Restored {
            from_turn_index,
            discarded,
        }
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn snapshot_indices(&self) -> Vec<usize> {
        self.snapshots.iter().map(|s| s.turn_index).collect()
    }
}
