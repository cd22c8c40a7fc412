//! Database module for PostgreSQL persistence: the `docs` registry plus
//! the OT and LWW algorithm-specific server stores.

mod docs;
mod lww_store;
mod ot_store;
mod pool;

pub use docs::{ensure_doc, get_doc, set_deleted, Algorithm};
pub use lww_store::{text_deltas_since, PgLwwServerStore};
pub use ot_store::PgOtServerStore;
pub use pool::*;
