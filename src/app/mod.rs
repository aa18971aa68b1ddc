//! Application core: dosing decisions, zero I/O.
//!
//! This module contains the business rules for the dosing engine:
//! bolus and basal approval, clinician review, and limit adjustment.
//! All interaction with storage, clocks, and notification channels happens
//! through **port traits** defined in [`ports`], keeping this layer fully
//! testable without files or wall-clock time.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
