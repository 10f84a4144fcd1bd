//! # Top-Down Closure
//!
//! Stage 3: callee graphs learn what their callers pass in. The bottom-up
//! graphs are copied, then visited callers first; each visit merges the
//! actual side of every recorded caller edge into the formals.
//!
//! ## References
//! - Lattner, C. "Macroscopic Data Structure Analysis and Optimization"
//!   (PhD 2005), chapter 3.4 (top-down phase)

pub mod analysis;
pub mod post_order;

pub use analysis::{run, TopDownGraphs, TopDownStats};
pub use post_order::{graph_call_graph, top_down_order};
