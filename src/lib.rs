//! AidGuard dosing safety library.
//!
//! Glucose-driven delivery suspension, concurrent feed monitoring, and the
//! two-tier dose approval engine, exposed for the host binary and for
//! integration testing.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod journal;
pub mod monitor;
pub mod safety;
