//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters.  All tests run on the host with in-memory or
//! temp-dir storage.

mod mocks;
mod monitor_tests;
mod review_tests;
mod session_tests;
