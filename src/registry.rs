//! Process-wide supervisor registry.
//!
//! The supervisor itself is an ordinary object - applications that want
//! dependency injection construct one with [`Supervisor::new`] and pass it
//! around. This module layers the classic singleton access on top for hosts
//! that want exactly one coordinator per process: a lazy accessor, a strict
//! constructor that refuses to replace an existing instance, and a test-only
//! reset.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::supervisor::{EnvError, Supervisor, SupervisorConfig};

fn slot() -> &'static Mutex<Option<Arc<Supervisor>>> {
    static SLOT: OnceLock<Mutex<Option<Arc<Supervisor>>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(None))
}

fn lock_slot() -> MutexGuard<'static, Option<Arc<Supervisor>>> {
    match slot().lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!("Supervisor registry mutex poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// The registered supervisor, lazily constructed with an empty snapshot.
/// Repeat calls return the identical instance. Never fails.
pub fn get_instance() -> Arc<Supervisor> {
    let mut slot = lock_slot();
    match &*slot {
        Some(existing) => Arc::clone(existing),
        None => {
            let supervisor = Arc::new(Supervisor::new(HashMap::new()));
            *slot = Some(Arc::clone(&supervisor));
            supervisor
        }
    }
}

/// Register a new supervisor seeded with `initial_variables`.
///
/// Strict: fails with [`EnvError::MultipleInstance`] if one is already
/// registered - callers wanting the existing instance use [`get_instance`].
pub fn construct(initial_variables: HashMap<String, String>) -> Result<Arc<Supervisor>, EnvError> {
    construct_with_config(initial_variables, SupervisorConfig::default())
}

pub fn construct_with_config(
    initial_variables: HashMap<String, String>,
    config: SupervisorConfig,
) -> Result<Arc<Supervisor>, EnvError> {
    let mut slot = lock_slot();
    if slot.is_some() {
        return Err(EnvError::MultipleInstance);
    }
    let supervisor = Arc::new(Supervisor::with_config(initial_variables, config));
    *slot = Some(Arc::clone(&supervisor));
    Ok(supervisor)
}

/// Drop the registration so a fresh supervisor can be constructed.
///
/// Test-only reset pattern. Outstanding `Arc` handles keep the old supervisor
/// (and its child cleanup on drop) alive until they are released.
pub fn reset() {
    lock_slot().take();
}
