//! Append-only payout journal.
//!
//! The service has no native currency of its own. Its payment primitive
//! records each payout as one JSON line, synced to disk before the payout
//! is reported as delivered; an external settlement process replays the
//! file. Each line carries a sequence number so the consumer can
//! deduplicate.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use habit_engine::{PaymentError, PaymentSink, Payout};

use crate::error::NodeError;

/// One line of the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// 1-based position in the journal.
    pub seq: u64,
    pub payout: Payout,
}

/// Payment sink backed by a JSON-lines file.
///
/// A payout that fails to reach the disk is cut back off the file before
/// the failure is reported, so the journal never holds a payout the ledger
/// has rolled back. If even that cut fails the journal refuses every later
/// payout.
pub struct PayoutJournal {
    path: PathBuf,
    file: File,
    next_seq: u64,
    poisoned: bool,
}

impl PayoutJournal {
    /// Open the journal at `path`, creating it if needed. Existing entries
    /// are kept and numbering continues after them. A partial last line
    /// left by an interrupted write is cut off.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).read(true).append(true).open(&path)?;

        let bytes = std::fs::read(&path)?;
        let complete = complete_len(&bytes);
        if complete < bytes.len() {
            warn!(path = ?path, dropped = bytes.len() - complete, "dropping partial journal line");
            file.set_len(complete as u64)?;
            file.sync_data()?;
        }
        let existing = parse_entries(&bytes[..complete])?.len() as u64;

        Ok(Self { path, file, next_seq: existing + 1, poisoned: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse every complete entry in the journal at `path`. A trailing
    /// fragment without its newline is not an entry.
    pub fn read_entries(path: impl AsRef<Path>) -> Result<Vec<JournalEntry>, NodeError> {
        let bytes = std::fs::read(path)?;
        parse_entries(&bytes[..complete_len(&bytes)])
    }

    /// Cut the file back to `len` bytes after a failed append.
    fn rollback(&mut self, len: u64) {
        let result = self.file.set_len(len).and_then(|()| self.file.sync_data());
        if let Err(e) = result {
            error!(path = ?self.path, error = %e, "journal rollback failed, refusing further payouts");
            self.poisoned = true;
        }
    }
}

/// Length of `bytes` up to and including the last newline.
fn complete_len(bytes: &[u8]) -> usize {
    bytes.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1)
}

fn parse_entries(bytes: &[u8]) -> Result<Vec<JournalEntry>, NodeError> {
    let text = std::str::from_utf8(bytes).map_err(|e| NodeError::Journal(format!("invalid utf-8: {e}")))?;
    let mut entries = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(line).map_err(|e| NodeError::Journal(format!("corrupt line: {e}")))?;
        entries.push(entry);
    }
    Ok(entries)
}

impl PaymentSink for PayoutJournal {
    fn pay(&mut self, payout: &Payout) -> Result<(), PaymentError> {
        if self.poisoned {
            return Err(PaymentError::Io("journal unavailable after failed rollback".into()));
        }
        let entry = JournalEntry { seq: self.next_seq, payout: payout.clone() };
        let mut line = serde_json::to_string(&entry).map_err(|e| PaymentError::Io(e.to_string()))?;
        line.push('\n');

        let len = self.file.metadata().map_err(|e| PaymentError::Io(e.to_string()))?.len();
        if let Err(e) = self.file.write_all(line.as_bytes()).and_then(|()| self.file.sync_data()) {
            self.rollback(len);
            return Err(PaymentError::Io(e.to_string()));
        }
        debug!(seq = entry.seq, to = %payout.to, amount = %payout.amount, "payout journaled");
        self.next_seq += 1;
        Ok(())
    }
}
