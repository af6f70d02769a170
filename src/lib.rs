//! A decision diagram package: a shared manager, unique table, computed
//! cache and reordering engine serving BDDs, ADDs and ZDDs through three
//! parallel typed interfaces over one node arena design.

#![allow(clippy::many_single_char_names)]

#[macro_use] extern crate log;

pub mod error;
pub mod config;
pub mod vid;
pub mod nid;
pub mod node;
pub mod arena;
pub mod cache;
pub mod manager;

pub mod bdd_ops;
pub mod add_ops;
pub mod zdd_ops;
pub mod bridge;
pub mod decomp;
pub mod priority;
pub mod reorder;

/// Input/output helpers, including the dump/load wire format.
pub mod io;

pub use error::{ManagerError, Result};
pub use manager::Manager;
pub use nid::Nid;
pub use vid::{Level, Variable};
