// This module defines the error type for the checked execution entry point using the
// thiserror crate. Building and compiling a kernel has no recoverable failures: a malformed
// graph is a caller bug and trips an assertion. Running a compiled program against caller
// buffers is different, because the buffers come from outside and their shape is only known
// at call time. ExecError covers the two contract checks Program::try_execute performs up
// front: a slot the program touches was not supplied, or a slot accessed contiguously is
// shorter than the requested lane count. ExecResult<T> is the matching alias.

//! Error types for checked execution.

use thiserror::Error;

/// Caller contract violation detected before running a program.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("Program uses {needed} pointer slots but only {provided} were supplied")]
    MissingSlot {
        needed: usize,
        provided: usize,
    },

    #[error("Slot {slot} holds {len} elements but {needed} lanes access it contiguously")]
    ShortBuffer {
        slot: usize,
        len: usize,
        needed: usize,
    },
}

/// Result type alias for checked execution.
pub type ExecResult<T> = Result<T, ExecError>;
