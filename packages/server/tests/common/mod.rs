// Common test utilities

pub mod harness;
pub mod recorder;

pub use harness::*;
pub use recorder::*;
