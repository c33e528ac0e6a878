//! Scheduler runner -- the task bag, dispatch loop and package table.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructor, add/remove, reset and accessors
//! - `dispatch`: priority sort, candidate scan, admission gate, execution
//! - `lookup`: key lookup, duplicate elimination, bulk removal
//! - `packages`: item factory entry point, package routing, stall recovery

mod core;
mod dispatch;
mod lookup;
mod packages;
#[cfg(test)]
mod tests;

pub use self::core::Scheduler;
