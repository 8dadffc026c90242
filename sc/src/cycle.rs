//! Cycle state machine - one four-phase right-of-way handoff
//!
//! ```text
//! phase 1   A <- GREEN   B <- RED      ack A, ack B
//! phase 2   A <- YELLOW                ack A
//! phase 3   A <- RED     B <- GREEN    ack A, ack B
//! phase 4                B <- YELLOW   ack B
//! ```
//!
//! A phase sends all of its commands, then waits for one acknowledgment per
//! command in the same order. The next phase starts only after every ack has
//! arrived. The first send or receive error abandons the whole cycle.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{CycleError, LinkError};
use crate::protocol::{Signal, ack_for};
use crate::registry::Unit;

/// Position of a unit within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Gets right-of-way first
    A,
    /// Holds red first, gets right-of-way in phase 3
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    One,
    Two,
    Three,
    Four,
}

impl Phase {
    /// All phases in execution order
    pub const ALL: [Phase; 4] = [Phase::One, Phase::Two, Phase::Three, Phase::Four];

    pub fn number(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
        }
    }

    /// Commands sent in this phase, in send order
    ///
    /// Acks are awaited in the same order.
    pub fn commands(self) -> &'static [(Role, Signal)] {
        match self {
            Self::One => &[(Role::A, Signal::Green), (Role::B, Signal::Red)],
            Self::Two => &[(Role::A, Signal::Yellow)],
            Self::Three => &[(Role::A, Signal::Red), (Role::B, Signal::Green)],
            Self::Four => &[(Role::B, Signal::Yellow)],
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phase {}", self.number())
    }
}

/// One acknowledgment collected during a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckRecord {
    pub phase: Phase,
    pub role: Role,
    pub message: String,
}

/// Outcome of a completed cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub unit_a: String,
    pub unit_b: String,
    pub acks: Vec<AckRecord>,
}

/// A single cycle over a chosen pair of units
pub struct Cycle<'a> {
    a: &'a Unit,
    b: &'a Unit,
    ack_timeout: Option<Duration>,
}

impl<'a> Cycle<'a> {
    /// `ack_timeout` of `None` waits for each acknowledgment indefinitely
    pub fn new(a: &'a Unit, b: &'a Unit, ack_timeout: Option<Duration>) -> Self {
        Self { a, b, ack_timeout }
    }

    fn unit(&self, role: Role) -> &'a Unit {
        match role {
            Role::A => self.a,
            Role::B => self.b,
        }
    }

    /// Run all four phases
    pub async fn run(&self) -> Result<CycleReport, CycleError> {
        for unit in [self.a, self.b] {
            let stale = unit.link().discard_pending();
            if stale > 0 {
                debug!(unit = %unit.identifier(), stale, "Cycle::run: discarded stale messages");
            }
        }

        info!(
            a = %self.a.identifier(),
            b = %self.b.identifier(),
            "New cycle: {} -> GREEN | {} -> RED",
            self.a.identifier(),
            self.b.identifier()
        );

        let mut report = CycleReport {
            unit_a: self.a.identifier().to_string(),
            unit_b: self.b.identifier().to_string(),
            acks: Vec::with_capacity(6),
        };

        for phase in Phase::ALL {
            self.run_phase(phase, &mut report).await?;
        }

        info!(a = %report.unit_a, b = %report.unit_b, "Cycle complete");
        Ok(report)
    }

    async fn run_phase(&self, phase: Phase, report: &mut CycleReport) -> Result<(), CycleError> {
        for &(role, signal) in phase.commands() {
            let unit = self.unit(role);
            info!(%phase, unit = %unit.identifier(), %signal, "Sending command");
            unit.link()
                .send(signal)
                .await
                .map_err(|source| abort(phase, unit, source))?;
        }

        for &(role, signal) in phase.commands() {
            let unit = self.unit(role);
            let message = self
                .await_ack(unit)
                .await
                .map_err(|source| abort(phase, unit, source))?;

            if message != ack_for(signal.as_str()) {
                debug!(%phase, unit = %unit.identifier(), %message, expected = %signal, "Unexpected ack content");
            }
            info!(%phase, unit = %unit.identifier(), ack = %message, "Acknowledgment received");

            report.acks.push(AckRecord { phase, role, message });
        }

        Ok(())
    }

    async fn await_ack(&self, unit: &Unit) -> Result<String, LinkError> {
        match self.ack_timeout {
            Some(timeout) => tokio::time::timeout(timeout, unit.link().recv())
                .await
                .map_err(|_| LinkError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })?,
            None => unit.link().recv().await,
        }
    }
}

fn abort(phase: Phase, unit: &Unit, source: LinkError) -> CycleError {
    CycleError {
        phase,
        unit: unit.identifier().to_string(),
        conn_id: unit.conn_id(),
        source,
    }
}
