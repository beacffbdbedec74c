//! Test suites for the stack broker runtime.

mod lib_api;
pub(crate) mod support;
