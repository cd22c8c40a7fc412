//! # syncpatch-core
//!
//! Deterministic core for real-time, offline-capable synchronization of
//! JSON documents. A document is a JSON value mutated by clients as
//! sequences of JSON-Patch-style operations; a coordinator (implemented in
//! `syncpatch-server`) assigns a total order and every client converges to
//! the same state.
//!
//! ## Design principles
//!
//! - **No IO**: this crate has no knowledge of transport or storage
//!   backends; stores are traits, transports are traits.
//! - **Deterministic**: `apply`/`transform`/`compose` never depend on
//!   anything but their inputs.
//! - **Two algorithm variants**: Operational Transformation ([`ot`]) for
//!   documents where structural concurrent edits must converge, and
//!   Last-Write-Wins ([`lww`]) for documents where per-field timestamped
//!   merge is sufficient.
//!
//! ## Modules
//!
//! - [`patch`]: the JSON-Patch algebra (`apply`, `transform`, `compose`,
//!   `invert`) including the extended `@inc`/`@bit`/`@max`/`@min`/`@txt`
//!   operators.
//! - [`change`]: the `Change` record that bundles ops with revision
//!   metadata.
//! - [`snapshot`]: the client-side `Snapshot` (materialized state plus
//!   trailing pending changes) and the fundamental `live_state` equation.
//! - [`version`]: `VersionMetadata` / `Version`, durable snapshots used for
//!   history navigation and branch points.
//! - [`branch`]: the `Branch` record type (lifecycle only).
//! - [`branch_manager`]: fork/merge logic, driven against an
//!   [`ot::OtServerStore`] the same way [`ot::OtCoordinator`] is —
//!   `syncpatch-server` owns the Postgres store, this crate owns the
//!   merge algorithm.
//! - [`ot`]: client-side OT algorithm, store trait, and materialized `Doc`.
//! - [`lww`]: client-side LWW algorithm and store trait.
//! - [`sync`]: the transport-agnostic Sync Controller state machine.
//! - [`lock`]: the per-document async lock used by both the client sync
//!   controller and the server coordinators.

pub mod branch;
pub mod branch_manager;
pub mod change;
pub mod error;
pub mod ids;
pub mod lock;
pub mod lww;
pub mod ot;
pub mod patch;
pub mod snapshot;
pub mod sync;
pub mod version;

pub use change::Change;
pub use error::{Error, Result};
pub use ids::{new_change_id, new_doc_id};
pub use patch::{apply, compose, invert, transform, transform_patch, ApplyOptions, JsonPatchOp};
pub use snapshot::Snapshot;
pub use version::{Version, VersionMetadata, VersionOrigin};

/// Opaque document identifier, 22 chars sampled from a 62-char alphabet.
pub type DocId = String;
/// Opaque change identifier, 8 chars sampled from a 62-char alphabet.
pub type ChangeId = String;
/// Server-assigned monotonic revision number.
pub type Rev = u64;
/// Milliseconds since epoch.
pub type Timestamp = u64;
/// JSON-Pointer path string (`""` means the document root).
pub type Path = String;
