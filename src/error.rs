//! Error types
//!
//! None of these are fatal to a running game: callers log them and degrade.

use thiserror::Error;

use crate::sim::physics::BodyHandle;

/// Level data could not be turned into pegs
#[derive(Debug, Error)]
pub enum LevelError {
    #[error("level parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("level contains no pegs")]
    NoPegs,
    #[error("level needs at least {required} pegs for its special types, found {available}")]
    NotEnoughPegs { required: usize, available: usize },
    #[error("peg #{index} is invalid: {reason}")]
    InvalidPeg { index: usize, reason: String },
}

/// Settings file could not be read or written
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A single contact pair could not be resolved
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollisionError {
    #[error("contact references unknown body {0:?}")]
    UnknownBody(BodyHandle),
    #[error("contact references missing ball {0}")]
    MissingBall(u32),
    #[error("contact references missing peg {0}")]
    MissingPeg(u32),
    #[error("contact references removed peg {0}")]
    PegRemoved(u32),
}
