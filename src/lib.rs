//! tapevm - a small compiler and interpreter for data-parallel numeric kernels.
//!
//! Kernels are written as scalar-looking operations over an abstract lane
//! index. Every value is classified as constant, uniform or varying; the
//! builder folds constants, hash-conses identical expressions and fuses
//! multiply-add while the graph is being built, and `compile` removes dead
//! code, hoists loop-invariant work into a prefix and lowers the rest to a
//! flat tape. `execute` walks that tape over any number of lanes.
//!
//! # Primary Usage
//!
//! ```
//! use tapevm::Builder;
//!
//! let mut b = Builder::new(2);
//! let ix = b.lane_id();
//! let x = b.load(0, ix);
//! let scale = b.uniform(1, 0.0);
//! let y = b.mul(x, scale);
//! b.store(0, ix, y);
//! let program = b.compile();
//!
//! let mut data = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let mut uniforms = [10.0];
//! program.execute(5, &mut [&mut data[..], &mut uniforms[..]]);
//! assert_eq!(data, [10.0, 20.0, 30.0, 40.0, 50.0]);
//! ```
//!
//! # Architecture
//!
//! - [`core`] - value handles, the shape lattice, the hash-consing table
//! - [`ir`] - opcodes and their static properties
//! - [`builder`] - kernel construction and construction-time optimization
//! - [`program`] - dead-code elimination, hoisting and lowering
//! - [`interp`] - the lane interpreter

pub mod builder;
pub mod core;
pub mod interp;
pub mod ir;
pub mod program;

pub use builder::Builder;
pub use core::{CompileStats, ConsTable, Eval, ExecError, ExecResult, Shape, Value};
pub use interp::{Reg, LANES};
pub use ir::{Op, OpInfo};
pub use program::{compile, Inst, Program};
