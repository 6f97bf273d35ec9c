//! Per-actor execution mode state.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::core::types::{Actor, ExecutionMode};
use crate::error::{Result, ValidationError};
use crate::io::persist::Backend;

/// Persisted mode document: `<actor-id> -> bool` where `true` means elevated.
pub type ModeDocument = BTreeMap<String, bool>;

/// Resolves and records the execution mode of interactive actors.
///
/// Each call locks the in-memory document for its own duration only. Racing
/// `set_mode` calls for the same actor are last-write-wins.
pub struct ModeResolver {
    modes: Mutex<ModeDocument>,
    backend: Box<dyn Backend<ModeDocument>>,
}

impl ModeResolver {
    /// Load the persisted document through `backend`.
    pub fn load(backend: Box<dyn Backend<ModeDocument>>) -> Result<Self> {
        let modes = backend.load()?;
        debug!(actors = modes.len(), source = %backend.describe(), "loaded modes");
        Ok(Self {
            modes: Mutex::new(modes),
            backend,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ModeDocument> {
        self.modes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mode the actor's next dispatch runs under.
    ///
    /// Non-interactive actors are always elevated; unknown interactive actors
    /// default to elevated.
    pub fn resolve(&self, actor: &Actor) -> ExecutionMode {
        if !actor.interactive {
            return ExecutionMode::Elevated;
        }
        self.lock()
            .get(actor.id.as_str())
            .copied()
            .map(ExecutionMode::from_flag)
            .unwrap_or_default()
    }

    /// Record `mode` for an interactive actor and flush.
    ///
    /// Setting the value already stored changes nothing and skips the flush.
    /// A failed flush is logged; the in-memory value stays updated.
    pub fn set_mode(&self, actor: &Actor, mode: ExecutionMode) -> Result<()> {
        if !actor.interactive {
            return Err(ValidationError::NotInteractive.into());
        }
        let snapshot = {
            let mut modes = self.lock();
            let previous = modes.insert(actor.id.to_string(), mode.as_flag());
            if previous == Some(mode.as_flag()) {
                debug!(actor = %actor.id, %mode, "mode unchanged");
                return Ok(());
            }
            modes.clone()
        };
        info!(actor = %actor.id, %mode, "mode changed");
        self.persist(&snapshot);
        Ok(())
    }

    /// Parse `raw` and record it. See [`ModeResolver::set_mode`].
    pub fn set_mode_str(&self, actor: &Actor, raw: &str) -> Result<ExecutionMode> {
        let mode: ExecutionMode = raw.parse()?;
        self.set_mode(actor, mode)?;
        Ok(mode)
    }

    /// Write the current document through the backend.
    pub fn flush(&self) -> Result<()> {
        let snapshot = self.lock().clone();
        self.backend.flush(&snapshot)
    }

    fn persist(&self, snapshot: &ModeDocument) {
        if let Err(err) = self.backend.flush(snapshot) {
            warn!(err = %err, "failed to persist modes");
        }
    }
}
