// Shared test support code for the cleanup engine tests.

pub mod common;
pub mod fakes;
pub mod harness;

pub use common::*;
pub use fakes::{FakeIndex, FakePathLock, FakeProcessLock, PanickingSink};
pub use harness::init_test_logging;
