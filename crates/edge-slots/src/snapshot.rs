//! Bounded snapshot buffer handed to [`Slot::snapshot`][crate::slot::Slot::snapshot].
//!
//! The buffer owns its bytes and enforces the caller's bound: a write that
//! does not fit is cut at the bound and the snapshot is flagged truncated.

use edge_types::SlotId;

/// Write target for a slot snapshot with a hard length bound.
#[derive(Debug)]
pub struct SnapshotBuffer {
    bytes: Vec<u8>,
    max_len: usize,
    truncated: bool,
}

impl SnapshotBuffer {
    pub fn new(max_len: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(max_len.min(1024)),
            max_len,
            truncated: false,
        }
    }

    /// Append `data`, keeping at most the remaining capacity.  Returns the
    /// number of bytes accepted.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let accepted = data.len().min(self.remaining());
        self.bytes.extend_from_slice(&data[..accepted]);
        if accepted < data.len() {
            self.truncated = true;
        }
        accepted
    }

    pub fn write_str(&mut self, s: &str) -> usize {
        self.write(s.as_bytes())
    }

    pub fn remaining(&self) -> usize {
        self.max_len - self.bytes.len()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn finish(self, slot_id: SlotId) -> SlotSnapshot {
        SlotSnapshot {
            slot_id,
            bytes: self.bytes,
            truncated: self.truncated,
        }
    }
}

/// Captured slot state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub slot_id: SlotId,
    pub bytes: Vec<u8>,
    /// The slot tried to write more than the bound allowed.
    pub truncated: bool,
}
