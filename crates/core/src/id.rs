//! Unique identifiers for dispatched operations and runs.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Correlates the start and end events of one dispatched operation.
///
/// Minted once per router invocation, never per action: a status check and
/// an execution of the same action carry different UIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionUid(Ulid);

impl ActionUid {
    /// Generate a new ActionUid
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ActionUid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ActionUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ActionUid {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Identifies one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Ulid);

impl RunId {
    /// Generate a new RunId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
