//! Test doubles for [`crate::ModelRuntime`].

mod runtime;

pub use runtime::*;
