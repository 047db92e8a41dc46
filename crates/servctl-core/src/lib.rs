//! Lifecycle control for a forking application server.
//!
//! PID files, OS signals, bounded polling and HTTP health checks sit
//! behind a single [`system::System`] seam; [`controller::Controller`]
//! composes them into the start/stop/restart/upgrade/reopen-logs/status
//! operations, with the zero-downtime upgrade modelled as an explicit
//! phase machine.

pub mod config;
pub mod controller;
pub mod error;
pub mod health;
pub mod launch;
pub mod pidfile;
pub mod poll;
pub mod process;
pub mod signal;
pub mod system;
