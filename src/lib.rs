#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod flat_table;

/// A hash set implementation backed by the flat table.
///
/// This module provides a `FlatSet` that wraps the `FlatTable` and provides
/// a standard set interface with configurable hashers.
pub mod set;

pub use flat_table::AllocError;
pub use flat_table::FlatTable;
pub use flat_table::TryInsertError;
pub use set::FlatSet;
