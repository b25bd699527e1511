//! Contains common, primitive types and a prelude for easy importing.
//!
//! This module defines the basic ID types used to uniquely identify actors,
//! listeners, and other components within the Furlong engine. Using distinct
//! types improves type safety and code clarity.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

/// A prelude module for convenient importing of the most common Furlong types.
///
/// # Example
/// ```
/// use furlong::prelude::*;
/// ```
pub mod prelude {
    pub use super::{ActorId, ListenerId};
    pub use crate::config::FurlongConfig;
    pub use crate::controller::RacePhaseController;
    pub use crate::supervisor::AutomationSupervisor;
}

new_key_type! {
    /// Uniquely and safely identifies a watcher registered with the
    /// `AutomationSupervisor`.
    ///
    /// This key is returned when a new watcher (e.g., for a phase change)
    /// is added to the supervisor. It is guaranteed to be unique and will
    /// not be reused, preventing stale ID bugs.
    pub struct ListenerId;
}

/// Identifies one of the concurrent actors (processes or clients) that may
/// attempt to drive the shared race timers.
///
/// Exactly one actor holds timer ownership at a time; see
/// [`crate::ownership::TimerOwnership`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
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

impl From<&str> for ActorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
