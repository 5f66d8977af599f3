//! Integration tests for the cleanup engine.
//!
//! Cases drive the facade and the scheduler end to end, against real
//! temporary folders or the in-memory fakes from `support`.

mod cases_scheduler_test;

pub mod support;
