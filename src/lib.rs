//! sharedenv: a mutable key/value namespace shared across processes, backed by
//! one long-lived store subprocess reachable only through a private pipe pair.

pub mod bridge;
pub mod registry;
pub mod store;
pub mod supervisor;

pub use registry::{construct, construct_with_config, get_instance};
pub use supervisor::{
    EnvError, SpawnError, StoreBinSpawner, StoreSpawner, Supervisor, SupervisorConfig,
};
