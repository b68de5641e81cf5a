//! Common test utilities for genjob integration tests

#[allow(dead_code)]
pub mod assertions;
#[allow(dead_code)]
pub mod provider;

#[allow(unused_imports)]
pub use assertions::*;
pub use provider::*;
