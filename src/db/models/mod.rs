//! Rows read back from the session store.

use serde::{Deserialize, Serialize};

use crate::session::{SessionSnapshot, TerminalRecord};

/// A persisted snapshot together with its write metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub snapshot: SessionSnapshot,
    pub version: u64,
    pub is_final: bool,
}

impl StoredSession {
    pub fn terminal_record(&self) -> Option<TerminalRecord> {
        self.snapshot
            .status
            .is_terminal()
            .then(|| TerminalRecord::from(&self.snapshot))
    }
}
