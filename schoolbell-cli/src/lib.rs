//! Library target for the `schoolbell-cli` package.
//!
//! The deliverable of this package is the `bell` binary (`src/main.rs`).
//! This re-export lets doc tests and downstream tooling reach the engine
//! through the CLI package.

#[doc(hidden)]
pub use schoolbell;
