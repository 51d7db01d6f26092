//! Liveness back-walk, fixed-point propagation and interference-graph
//! construction over the Katara IR (spec.md §4.5).

pub mod interference;
pub mod live_ranges;

pub use interference::{build_interference_graph, InterferenceGraph};
pub use live_ranges::{find_live_ranges, BlockLiveRanges, LiveRanges};
