//! Request handlers for sync operations: the four RPCs of §6 plus the
//! Branch Manager endpoints, shared between the HTTP routes and the
//! WebSocket dispatch loop.

mod branch;
mod commit;
mod common;
mod delete_doc;
mod get_changes_since;
mod get_doc;
mod websocket;

pub use branch::*;
pub use commit::*;
pub use delete_doc::*;
pub use get_changes_since::*;
pub use get_doc::*;
pub use websocket::*;
