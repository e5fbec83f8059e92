mod message;
mod session;
mod transport;

use std::error::Error;
use std::fmt;
use std::time::Duration;

use crate::sim::EpisodeError;

pub use message::{TrainerRequest, TrainerResponse};
pub use session::TrainerSession;
pub use transport::JsonLinesTransport;

/// Session-fatal protocol failures. Timeout is its own variant so a
/// trainer that went quiet is distinguishable from one that sent garbage.
#[derive(Debug)]
pub enum ProtocolError {
    /// The trainer did not complete a round trip within the ceiling.
    Timeout { ceiling: Duration },
    /// The byte stream failed underneath the session.
    Io(std::io::Error),
    /// The trainer sent something that is not a valid request.
    Malformed(serde_json::Error),
    /// The simulation refused the request (spawn failure, step without a
    /// running episode).
    Episode(EpisodeError),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProtocolError::Timeout { ceiling } => write!(
                formatter,
                "trainer round trip exceeded its {:.1}s ceiling",
                ceiling.as_secs_f64()
            ),
            ProtocolError::Io(inner) => write!(formatter, "transport failed: {inner}"),
            ProtocolError::Malformed(inner) => {
                write!(formatter, "unreadable trainer message: {inner}")
            }
            ProtocolError::Episode(inner) => write!(formatter, "{inner}"),
        }
    }
}

impl Error for ProtocolError {}

impl From<std::io::Error> for ProtocolError {
    fn from(inner: std::io::Error) -> Self {
        ProtocolError::Io(inner)
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(inner: serde_json::Error) -> Self {
        ProtocolError::Malformed(inner)
    }
}

impl From<EpisodeError> for ProtocolError {
    fn from(inner: EpisodeError) -> Self {
        ProtocolError::Episode(inner)
    }
}
