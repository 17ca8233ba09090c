use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A contiguous range of source records transferred as one unit of work.
///
/// Chunks are produced by the planner and never change afterwards. The range
/// covered is `[start_offset, start_offset + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Chunk {
    pub index: u64,
    pub start_offset: u64,
    pub size: u64,
}

impl Chunk {
    pub fn new(index: u64, start_offset: u64, size: u64) -> Self {
        Chunk {
            index,
            start_offset,
            size,
        }
    }

    /// Exclusive end of the offset range.
    pub fn end_offset(&self) -> u64 {
        self.start_offset + self.size
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunk {} [{}..{})",
            self.index,
            self.start_offset,
            self.end_offset()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ChunkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkState::Pending => "pending",
            ChunkState::InProgress => "in_progress",
            ChunkState::Completed => "completed",
            ChunkState::Failed => "failed",
        }
    }

    /// Whether a new run should put a chunk in this state back on the queue.
    ///
    /// `InProgress` only survives a run that crashed mid-chunk, and no run
    /// resumes mid-chunk, so it is treated like `Pending`. `Failed` needs an
    /// explicit reset first.
    pub fn is_restart_eligible(&self) -> bool {
        matches!(self, ChunkState::Pending | ChunkState::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChunkState::Completed | ChunkState::Failed)
    }
}

impl fmt::Display for ChunkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ChunkState::Pending),
            "in_progress" | "in-progress" | "running" => Ok(ChunkState::InProgress),
            "completed" | "done" => Ok(ChunkState::Completed),
            "failed" => Ok(ChunkState::Failed),
            other => Err(format!("Unknown chunk state: {other}")),
        }
    }
}
