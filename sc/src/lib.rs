//! SignalCoord - four-phase right-of-way coordinator
//!
//! A coordinator accepts networked signal units over TCP, registers each by the
//! identifier it announces, and repeatedly drives the first two registered
//! units through a fixed four-phase cycle. Each phase sends one command per
//! unit and waits for the matching `OK-<command>` acknowledgment before moving
//! on, so the two units never show GREEN at the same time.
//!
//! # Modules
//!
//! - [`protocol`] - wire constants, signals and message decoding
//! - [`registry`] - ordered set of currently connected units
//! - [`link`] - the exclusive command/ack channel to one unit
//! - [`connection`] - registration and teardown per accepted connection
//! - [`cycle`] - the four-phase sequence over a pair of units
//! - [`coordinator`] - polling loop that pairs units and runs cycles
//! - [`server`] - TCP listener tying the above together
//! - [`unit`] - the signal unit client
//! - [`demo`] - launcher for a coordinator plus units as child processes
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod cycle;
pub mod demo;
pub mod error;
pub mod link;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod unit;

// Re-export commonly used types
pub use config::{Config, CoordinatorConfig, DemoConfig, UnitConfig};
pub use coordinator::{Coordinator, CoordinatorMetrics, TickOutcome};
pub use cycle::{AckRecord, Cycle, CycleReport, Phase, Role};
pub use error::{CycleError, LinkError, UnitError};
pub use link::{TcpLink, UnitLink};
pub use protocol::Signal;
pub use registry::{ConnId, Registry, Unit};
pub use server::Server;
pub use unit::{SignalUnit, UnitSummary};
