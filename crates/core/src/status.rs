//! Lifecycle status enums and their transition tables.
//!
//! Statuses are persisted as single-letter codes; the enums here are the
//! only place those codes are interpreted, and every transition goes
//! through `can_transition_to` so the state machines stay closed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical availability of a NAR blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NarStatus {
    /// Registered but the blob has not been verified present.
    Pending,
    /// Blob verified present and intact.
    Available,
    /// Collected by the garbage collector; the record may be resurrected
    /// by a later registration of the same hash.
    Trashed,
}

impl NarStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "P",
            Self::Available => "A",
            Self::Trashed => "T",
        }
    }

    pub fn parse(code: &str) -> crate::Result<Self> {
        match code {
            "P" => Ok(Self::Pending),
            "A" => Ok(Self::Available),
            "T" => Ok(Self::Trashed),
            other => Err(crate::Error::InvalidStatus(format!("nar status {other:?}"))),
        }
    }

    /// Legal transitions: Pending -> Available, Pending|Available -> Trashed
    /// (GC only), Trashed -> Pending (resurrection on re-registration).
    pub fn can_transition_to(&self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Available)
                | (Self::Pending, Self::Trashed)
                | (Self::Available, Self::Trashed)
                | (Self::Trashed, Self::Pending)
        )
    }
}

impl fmt::Display for NarStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Availability of a root, derived from its pinned NAR set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RootStatus {
    /// Registered, fetching has not begun.
    Pending,
    /// At least one pinned NAR is still being fetched.
    Downloading,
    /// Every pinned NAR is available.
    Available,
}

impl RootStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "P",
            Self::Downloading => "D",
            Self::Available => "A",
        }
    }

    pub fn parse(code: &str) -> crate::Result<Self> {
        match code {
            "P" => Ok(Self::Pending),
            "D" => Ok(Self::Downloading),
            "A" => Ok(Self::Available),
            other => Err(crate::Error::InvalidStatus(format!("root status {other:?}"))),
        }
    }
}

impl fmt::Display for RootStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a generation snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerationStatus {
    Pending,
    Indexing,
    Downloading,
    Finished,
    Canceled,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "P",
            Self::Indexing => "I",
            Self::Downloading => "D",
            Self::Finished => "F",
            Self::Canceled => "C",
        }
    }

    pub fn parse(code: &str) -> crate::Result<Self> {
        match code {
            "P" => Ok(Self::Pending),
            "I" => Ok(Self::Indexing),
            "D" => Ok(Self::Downloading),
            "F" => Ok(Self::Finished),
            "C" => Ok(Self::Canceled),
            other => Err(crate::Error::InvalidStatus(format!(
                "generation status {other:?}"
            ))),
        }
    }

    /// Finished and Canceled are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Canceled)
    }

    /// The generation state machine:
    ///
    /// ```text
    /// Pending --start_indexing--> Indexing
    /// Indexing --index_complete--> Downloading
    /// Downloading --all_available--> Finished
    /// Pending|Indexing|Downloading --cancel--> Canceled
    /// ```
    pub fn can_transition_to(&self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Indexing)
                | (Self::Indexing, Self::Downloading)
                | (Self::Downloading, Self::Finished)
                | (Self::Pending, Self::Canceled)
                | (Self::Indexing, Self::Canceled)
                | (Self::Downloading, Self::Canceled)
        )
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
