//! Partitions definitions and versioned partition subsets
//!
//! This crate handles:
//! - Static and time-window partitions definitions
//! - Subsets of partition keys, treated as persistent values
//! - Versioned subset serialization with legacy read compatibility

pub mod definition;
pub mod time_window;
pub mod subset;

pub use definition::{PartitionsDefinition, StaticPartitionsDefinition, DefinitionError};
pub use time_window::{Cadence, TimeWindow, TimeWindowPartitionsDefinition, TimeWindowPartitionsSubset};
pub use subset::{DefaultPartitionsSubset, PartitionsSubset, SubsetError};
