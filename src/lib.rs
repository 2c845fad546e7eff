//! Toll booth library
//!
//! Vehicle passage state machine, barrier control, pricing and statistics for
//! toll booths in a tick-driven traffic simulation. Exposes modules for
//! integration testing and binary reuse.

pub mod domain;
pub mod error;
pub mod infra;
pub mod io;
pub mod services;
