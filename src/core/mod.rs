// This module gathers the shared infrastructure the builder, compiler and interpreter all
// lean on: value identities, the shape lattice and the evaluation policies. The hash-consing
// table is a minimal open-addressing set that stores only ids and defers equality to the
// caller, which keeps the full instruction records itself. Error and statistics types round
// out the module.

//! Core infrastructure.
//!
//! # Key Components
//!
//! - [`value`]: `Value` handles, the `Shape` lattice, `Eval` policies
//! - [`cons_table`]: the hash-consing set used for CSE
//! - [`error`]: `ExecError` for checked execution
//! - [`stats`]: `CompileStats`

pub mod cons_table;
pub mod error;
pub mod stats;
pub mod value;

pub use cons_table::ConsTable;
pub use error::{ExecError, ExecResult};
pub use stats::CompileStats;
pub use value::{Eval, Shape, Value};
