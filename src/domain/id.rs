//! Identifiers for tasks and dependency edges
//!
//! ID Format:
//! - Task IDs: `t-{7-char-hash}` (e.g., `t-9d3e5f2`)
//! - Edge IDs: `d-{7-char-hash}` (e.g., `d-41ac0e7`)
//!
//! Task hashes derive from title + creation timestamp. Edge hashes derive
//! from both endpoints, the creation timestamp and a nonce the store bumps
//! when a freshly generated ID is already taken.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const HASH_LEN: usize = 7;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Invalid task ID format: expected 't-{{7-char-hash}}', got '{0}'")]
    InvalidTaskId(String),

    #[error("Invalid dependency ID format: expected 'd-{{7-char-hash}}', got '{0}'")]
    InvalidEdgeId(String),
}

/// Generates a 7-character hash from arbitrary input
fn short_hash(input: &str) -> String {
    let hash = blake3::hash(input.as_bytes());
    let hex = hash.to_hex();
    hex[..HASH_LEN].to_string()
}

/// Extracts the hash portion after `prefix`, validating its shape
fn parse_hash<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let hash = s.strip_prefix(prefix)?;
    if hash.len() == HASH_LEN && hash.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(hash)
    } else {
        None
    }
}

/// Task ID in the format `t-{7-char-hash}`
///
/// Tasks are owned by the task registry; the dependency core only ever
/// compares and stores these identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId {
    hash: String,
}

impl TaskId {
    /// Creates a new task ID from title and timestamp
    pub fn new(title: &str, timestamp: DateTime<Utc>) -> Self {
        let input = format!("{}{}", title, timestamp.timestamp_nanos_opt().unwrap_or(0));
        Self {
            hash: short_hash(&input),
        }
    }

    /// Returns the hash portion of the ID
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t-{}", self.hash)
    }
}

impl FromStr for TaskId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let hash = parse_hash(s, "t-").ok_or_else(|| IdError::InvalidTaskId(s.to_string()))?;

        Ok(Self {
            hash: hash.to_ascii_lowercase(),
        })
    }
}

impl TryFrom<String> for TaskId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.to_string()
    }
}

/// Dependency edge ID in the format `d-{7-char-hash}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EdgeId {
    hash: String,
}

impl EdgeId {
    /// Creates an edge ID for the ordered pair at the given time
    ///
    /// `nonce` lets a store derive a different ID when the first
    /// candidate collides with an existing edge.
    pub fn new(
        predecessor: &TaskId,
        successor: &TaskId,
        timestamp: DateTime<Utc>,
        nonce: u32,
    ) -> Self {
        let input = format!(
            "{}>{}@{}#{}",
            predecessor,
            successor,
            timestamp.timestamp_nanos_opt().unwrap_or(0),
            nonce
        );
        Self {
            hash: short_hash(&input),
        }
    }

    /// Returns the hash portion of the ID
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d-{}", self.hash)
    }
}

impl FromStr for EdgeId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let hash = parse_hash(s, "d-").ok_or_else(|| IdError::InvalidEdgeId(s.to_string()))?;

        Ok(Self {
            hash: hash.to_ascii_lowercase(),
        })
    }
}

impl TryFrom<String> for EdgeId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EdgeId> for String {
    fn from(id: EdgeId) -> Self {
        id.to_string()
    }
}
