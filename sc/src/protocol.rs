//! Wire protocol between the coordinator and signal units
//!
//! Unframed text over TCP. Every send corresponds to exactly one receive on the
//! peer, and no message is larger than [`MAX_MESSAGE_SIZE`] bytes.
//!
//! ```text
//! unit  -> coord   <identifier>              once, right after connecting
//! coord -> unit    GREEN | YELLOW | RED
//! unit  -> coord   OK-<command>
//! ```

use std::fmt;
use std::str::FromStr;

use tracing::debug;

/// Maximum size of a single protocol message
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Loopback address the coordinator listens on by default
pub const DEFAULT_ADDR: &str = "127.0.0.1:65432";

/// Identifier recorded for a unit that never announced itself
pub const PLACEHOLDER_ID: &str = "unknown";

/// Prefix a unit puts in front of the command it acknowledges
pub const ACK_PREFIX: &str = "OK-";

/// A phase command: the light a unit is told to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Green,
    Yellow,
    Red,
}

impl Signal {
    /// The literal token sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "GREEN",
            Self::Yellow => "YELLOW",
            Self::Red => "RED",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GREEN" => Ok(Self::Green),
            "YELLOW" => Ok(Self::Yellow),
            "RED" => Ok(Self::Red),
            _ => {
                debug!(%s, "Signal::from_str: unknown command");
                Err(format!("Unknown signal: {}. Use: GREEN, YELLOW, or RED", s))
            }
        }
    }
}

/// Build the acknowledgment a unit sends back for `command`
///
/// The command text is echoed verbatim, even when it is not a known signal.
pub fn ack_for(command: &str) -> String {
    format!("{}{}", ACK_PREFIX, command)
}

/// Decode one received message
///
/// Bytes are decoded lossily as UTF-8, and a trailing line ending is dropped so
/// that peers typing into `nc` behave like real units.
pub fn decode_message(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end_matches(['\r', '\n']).to_string()
}
