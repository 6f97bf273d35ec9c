//! Shared deterministic types for the dispatch core.
//!
//! These types define stable contracts between the pipeline components. They
//! carry no I/O and are cheap to clone.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Permission node that grants every surface command.
pub const WILDCARD_PERMISSION: &str = "cmdlink.*";

/// Stable unique identifier of an actor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identity invoking a pipeline action.
///
/// Interactive actors have a persisted [`ExecutionMode`]; non-interactive
/// actors (the console) always dispatch as [`Identity::Elevated`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: ActorId,
    pub interactive: bool,
    pub permissions: BTreeSet<String>,
}

impl Actor {
    /// The non-interactive console actor. Holds every permission.
    pub fn console() -> Self {
        Self {
            id: ActorId::new("console"),
            interactive: false,
            permissions: BTreeSet::from([WILDCARD_PERMISSION.to_string()]),
        }
    }

    pub fn interactive<I, S>(id: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: ActorId::new(id),
            interactive: true,
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    /// True if the actor holds `node` or the wildcard node.
    pub fn has_permission(&self, node: &str) -> bool {
        self.permissions.contains(node) || self.permissions.contains(WILDCARD_PERMISSION)
    }
}

/// Identity a dispatched command executes under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Host-level identity.
    Elevated,
    /// The invoking actor's own identity.
    Actor(ActorId),
}

impl Identity {
    pub fn label(&self) -> &'static str {
        match self {
            Identity::Elevated => "elevated",
            Identity::Actor(_) => "actor",
        }
    }
}

/// Per-actor dispatch mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Elevated,
    Restricted,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Elevated => "elevated",
            ExecutionMode::Restricted => "restricted",
        }
    }

    /// Persisted form: `true` means elevated.
    pub fn from_flag(elevated: bool) -> Self {
        if elevated {
            ExecutionMode::Elevated
        } else {
            ExecutionMode::Restricted
        }
    }

    pub fn as_flag(self) -> bool {
        self == ExecutionMode::Elevated
    }
}

impl FromStr for ExecutionMode {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_lowercase().as_str() {
            "elevated" => Ok(ExecutionMode::Elevated),
            "restricted" => Ok(ExecutionMode::Restricted),
            _ => Err(ValidationError::InvalidMode(raw.to_string())),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
