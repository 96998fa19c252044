//! crashlog - process-wide diagnostic logging with crash dumps
//!
//! This library provides a dispatcher that fans log calls out to pluggable sinks,
//! keeps the most recent entries in memory, and writes them out when the process
//! dies from an unhandled fault.

pub mod config;
pub mod logging;
pub mod sinks;
pub mod termination;
