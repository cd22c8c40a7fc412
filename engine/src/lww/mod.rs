//! Client-side Last-Write-Wins algorithm (§4.3): per-path merge by
//! timestamp instead of structural transformation. Shares its
//! consolidation rules with the server-side LWW coordinator.

pub mod client;
pub mod consolidate;
pub mod server;
pub mod store;

pub use client::LwwClientAlgorithm;
pub use consolidate::{consolidate_client, merge_same_path};
pub use server::{InMemoryLwwServerStore, LwwCoordinator, LwwCoordinatorConfig, LwwServerStore};
pub use store::{InMemoryLwwClientStore, LwwClientStore};
