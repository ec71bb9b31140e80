//! Network side of a station pull: probing, share sessions and monitoring.
//!
//! Everything here blocks the calling thread except the connection monitor,
//! which owns one background thread per open session.

mod auth;
mod command;
mod monitor;
mod probe;
mod session;

pub use auth::{Authenticator, ConnectError, MountedShareConnector, NetUseConnector, ShareConnector};
pub use monitor::{ConnectionMonitor, MonitorEvent};
pub use probe::{PingProber, Prober};
pub use session::{Credentials, Session, SessionState};

#[cfg(test)]
pub(crate) mod testing {
    pub use super::auth::testing::FakeConnector;
    pub use super::probe::testing::FakeProber;
}

use thiserror::Error;

/// Errors from opening, using or closing a session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The host did not answer the reachability probe
    #[error("{address} is unreachable")]
    Unreachable { address: String },

    /// The host rejected the credentials
    #[error("authentication to {address} failed: {cause}")]
    AuthFailed { address: String, cause: String },

    /// The connector could not run
    #[error("could not connect to {address}: {source}")]
    Connector {
        address: String,
        #[source]
        source: ConnectError,
    },

    /// Tearing down the session failed; the session is still considered closed
    #[error("closing session to {address} failed: {source}")]
    TeardownFailed {
        address: String,
        #[source]
        source: ConnectError,
    },

    /// A lifecycle step that is not allowed from the current state
    #[error("session to {address} cannot go from {from} to {to}")]
    InvalidTransition {
        address: String,
        from: SessionState,
        to: SessionState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SessionError::Unreachable {
            address: "10.0.0.5".to_string(),
        };
        assert_eq!(err.to_string(), "10.0.0.5 is unreachable");

        let err = SessionError::InvalidTransition {
            address: "h".to_string(),
            from: SessionState::Authenticating,
            to: SessionState::Probing,
        };
        assert_eq!(err.to_string(), "session to h cannot go from authenticating to probing");
    }

    #[test]
    fn test_auth_error_has_no_secret() {
        let err = SessionError::AuthFailed {
            address: "h".to_string(),
            cause: "logon failure".to_string(),
        };
        assert_eq!(err.to_string(), "authentication to h failed: logon failure");
    }
}
