//! Operational Transformation: client-side pending/sending queues,
//! server-side transformation-against-committed history, rebase on
//! acknowledgment.

pub mod client;
pub mod doc;
pub mod server;
pub mod store;

pub use client::OtClientAlgorithm;
pub use doc::Doc;
pub use server::{InMemoryOtServerStore, OtCoordinator, OtCoordinatorConfig, OtServerStore};
pub use store::{InMemoryOtClientStore, OtClientStore};
