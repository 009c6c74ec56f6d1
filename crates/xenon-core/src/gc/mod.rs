//! Incremental mark-sweep garbage collection
//!
//! The heap is an arena of slots with embedded mark metadata - the index
//! rendition of an intrusive proxy list. The collector runs a tri-color
//! clear/mark/sweep cycle in bounded steps so the interpreter never waits on
//! an unbounded pause.

mod collector;
mod heap;

pub use collector::{Collector, GcStats, Marker, DEFAULT_MAX_ITERATIONS};
pub use heap::{GcHeap, GcObject, GcRef};
