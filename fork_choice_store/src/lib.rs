//! Implementation of the LMD GHOST fork choice rule.
//!
//! [`Store`] keeps every block that descends from the latest finalized block, indexed by root,
//! with an explicit parent-to-children index. Ancestor lookups walk parent links iteratively.
//!
//! The head is found by starting at the justified block and repeatedly descending into the child
//! with the greatest attesting weight. The weight of a block is the sum of effective balances
//! (in units of the effective balance increment) of validators whose latest message votes for the
//! block or one of its descendants. Balances are taken from the justified checkpoint state.
//!
//! The store does not run the state transition. Callers pass each block together with its
//! post-state. Checkpoints found in post-states are applied through [`Store::on_checkpoints`].
//! Finalization moves the anchor and hands removed blocks to a [`Storage`] implementation.
//!
//! This implementation makes use of persistent data structures, but they are not required for the
//! algorithm to work. They're only used to make snapshots cheap.
//!
//! Notes on nomenclature:
//! - Pruning means removing blocks that conflict with finality.
//! - Archiving means removing finalized blocks from memory.

pub use crate::{
    error::Error,
    misc::{ChainLink, LatestMessage, Storage},
    store::Store,
    store_config::StoreConfig,
};

mod error;
mod misc;
mod store;
mod store_config;
