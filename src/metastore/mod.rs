//! Cluster metadata store ("sdb"): versioned, reference-counted rows for
//! database/vgroup/user/connection objects, grounded on the original
//! `mndDb.c`/`mndProfile.c` encode/decode and acquire/release conventions.
//!
//! Mutations never touch a row directly — they flow through
//! `crate::transaction`, which writes redo/undo/commit log raws against
//! this store before dispatching the matching vnode-directed RPC actions.

pub mod row;
pub mod table;

pub use row::{SdbObjectType, SdbRaw, SdbRow, SdbStatus};
pub use table::{SdbTable, SdbTableSet};
