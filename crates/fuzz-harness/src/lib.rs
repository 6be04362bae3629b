//! Relay Routing Fuzz Harness
//!
//! Reusable property-based testing strategies for the routing workspace.
//! Strategies yield plain data (cost grids, stat tuples, relay id lists) so any
//! crate can build its own types from them without a dependency cycle.
//!
//! # Usage
//!
//! ```rust
//! use fuzz_harness::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_fuzz_test((n, costs) in cost_grid(8)) {
//!         prop_assert_eq!(costs.len(), n * n.saturating_sub(1) / 2);
//!     }
//! }
//! ```

pub mod generators;

pub mod prelude {
    pub use crate::generators::*;
    pub use proptest::prelude::*;
}

// Re-export proptest for convenience
pub use proptest;
