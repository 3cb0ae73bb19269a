//! # Onyx Core
//!
//! Core types shared by every component of the Onyx JIT:
//!
//! - **Error Handling**: the compilation error taxonomy and result alias
//! - **Handles**: opaque method/module identifiers handed in by the host
//! - **Configuration**: the process-wide key-value option store, read once per
//!   compilation at session initialization
//! - **Memory**: the bump arena scoped to one root compilation

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod config;
pub mod error;
pub mod handles;

pub use arena::{Arena, ArenaMark};
pub use config::ConfigStore;
pub use error::{JitError, JitResult};
pub use handles::{MethodHandle, ModuleHandle};

/// Onyx version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
