//! Opening and tearing down authenticated share sessions.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::command::{run_with_timeout, CommandError};
use super::probe::{Prober, Reachability};
use super::session::{Credentials, Session, SessionState};
use super::SessionError;

/// Failure reported by a share connector.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The host refused the credentials or the share
    #[error("{0}")]
    Rejected(String),

    /// A pre-mounted share directory is missing
    #[error("share not mounted at {}", .0.display())]
    ShareMissing(PathBuf),

    /// Running the connection command failed
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Establishes and removes the authenticated link to a host's share.
pub trait ShareConnector: Send + Sync {
    fn connect(&self, address: &str, credentials: &Credentials) -> Result<(), ConnectError>;

    fn disconnect(&self, address: &str) -> Result<(), ConnectError>;

    /// Local path through which the host's files are reachable.
    fn share_root(&self, address: &str) -> PathBuf;
}

/// Windows `net use` against the station's IPC$ share.
#[derive(Debug, Clone)]
pub struct NetUseConnector {
    share_name: String,
    timeout: Duration,
}

impl NetUseConnector {
    pub fn new(share_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            share_name: share_name.into(),
            timeout,
        }
    }

    fn ipc_path(address: &str) -> String {
        format!(r"\\{}\IPC$", address)
    }
}

impl ShareConnector for NetUseConnector {
    fn connect(&self, address: &str, credentials: &Credentials) -> Result<(), ConnectError> {
        let mut cmd = Command::new("net");
        cmd.arg("use")
            .arg(Self::ipc_path(address))
            .arg(credentials.secret())
            .arg(format!("/user:{}", credentials.user));

        let output = run_with_timeout(&mut cmd, self.timeout)?;
        if output.success() {
            Ok(())
        } else {
            Err(ConnectError::Rejected(output.failure_message()))
        }
    }

    fn disconnect(&self, address: &str) -> Result<(), ConnectError> {
        let mut cmd = Command::new("net");
        cmd.args(["use", &Self::ipc_path(address), "/delete", "/y"]);

        let output = run_with_timeout(&mut cmd, self.timeout)?;
        if output.success() {
            Ok(())
        } else {
            Err(ConnectError::Rejected(output.failure_message()))
        }
    }

    fn share_root(&self, address: &str) -> PathBuf {
        PathBuf::from(format!(r"\\{}\{}", address, self.share_name))
    }
}

/// Shares already mounted on the local machine at `<root>/<address>`.
///
/// Authentication happened at mount time, so credentials are ignored.
#[derive(Debug, Clone)]
pub struct MountedShareConnector {
    root: PathBuf,
}

impl MountedShareConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ShareConnector for MountedShareConnector {
    fn connect(&self, address: &str, _credentials: &Credentials) -> Result<(), ConnectError> {
        let path = self.share_root(address);
        if path.is_dir() {
            Ok(())
        } else {
            Err(ConnectError::ShareMissing(path))
        }
    }

    fn disconnect(&self, _address: &str) -> Result<(), ConnectError> {
        Ok(())
    }

    fn share_root(&self, address: &str) -> PathBuf {
        self.root.join(address)
    }
}

/// Probes a target, then authenticates to its share.
pub struct Authenticator {
    prober: Arc<dyn Prober>,
    connector: Arc<dyn ShareConnector>,
    default_credentials: Credentials,
}

impl Authenticator {
    pub fn new(
        prober: Arc<dyn Prober>,
        connector: Arc<dyn ShareConnector>,
        default_credentials: Credentials,
    ) -> Self {
        Self {
            prober,
            connector,
            default_credentials,
        }
    }

    pub fn default_credentials(&self) -> &Credentials {
        &self.default_credentials
    }

    /// Open `session`, using `credentials` or the default account.
    ///
    /// A fresh session is probed first and fails fast when unreachable. A
    /// session left in `Authenticating` by a rejected attempt only retries
    /// the authentication step.
    pub fn open(
        &self,
        session: &mut Session,
        credentials: Option<&Credentials>,
    ) -> Result<(), SessionError> {
        let address = session.address().to_string();

        match session.state() {
            SessionState::Disconnected => {
                session.advance(SessionState::Probing)?;
                if self.prober.probe(&address) == Reachability::Unreachable {
                    session.advance(SessionState::Disconnected)?;
                    info!(address = %address, "host unreachable, not authenticating");
                    return Err(SessionError::Unreachable { address });
                }
                session.advance(SessionState::Authenticating)?;
            }
            SessionState::Authenticating => {
                session.advance(SessionState::Authenticating)?;
            }
            other => {
                return Err(SessionError::InvalidTransition {
                    address,
                    from: other,
                    to: SessionState::Authenticating,
                });
            }
        }

        let credentials = credentials.unwrap_or(&self.default_credentials).clone();
        debug!(address = %address, user = %credentials.user, "authenticating");

        match self.connector.connect(&address, &credentials) {
            Ok(()) => {
                let root = self.connector.share_root(&address);
                session.mark_connected(credentials, root)?;
                info!(address = %address, "session connected");
                Ok(())
            }
            Err(ConnectError::Rejected(cause)) => {
                warn!(address = %address, cause = %cause, "authentication rejected");
                Err(SessionError::AuthFailed { address, cause })
            }
            Err(source) => {
                session.advance(SessionState::Disconnected)?;
                Err(SessionError::Connector { address, source })
            }
        }
    }

    /// Tear the session down. Closing a disconnected session does nothing.
    ///
    /// The session always ends `Disconnected`; a failed disconnect is
    /// reported afterwards as `TeardownFailed`.
    pub fn close(&self, session: &mut Session) -> Result<(), SessionError> {
        match session.state() {
            SessionState::Disconnected => Ok(()),
            SessionState::Probing | SessionState::Authenticating => {
                session.advance(SessionState::Disconnected)
            }
            SessionState::Closing => session.advance(SessionState::Disconnected),
            SessionState::Connected | SessionState::Monitoring => {
                session.advance(SessionState::Closing)?;
                let address = session.address().to_string();
                let result = self.connector.disconnect(&address);
                session.advance(SessionState::Disconnected)?;
                match result {
                    Ok(()) => {
                        info!(address = %address, "session closed");
                        Ok(())
                    }
                    Err(source) => Err(SessionError::TeardownFailed { address, source }),
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeConnector;
    use super::*;
    use crate::net::probe::testing::FakeProber;
    use crate::targets::Target;
    use tempfile::TempDir;

    fn authenticator(prober: Arc<FakeProber>, connector: Arc<FakeConnector>) -> Authenticator {
        Authenticator::new(prober, connector, Credentials::new("NAM\\mtxuser", "default"))
    }

    #[test]
    fn test_open_and_close_twice() {
        let prober = Arc::new(FakeProber::with_online(&["10.0.0.1"]));
        let connector = Arc::new(FakeConnector::new("/shares").accept("10.0.0.1", "default"));
        let auth = authenticator(prober, connector.clone());

        let mut session = Session::new(Target::new("10.0.0.1"));
        auth.open(&mut session, None).unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.share_root(), Some(std::path::Path::new("/shares/10.0.0.1")));

        auth.close(&mut session).unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        auth.close(&mut session).unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(connector.disconnects(), 1);
    }

    #[test]
    fn test_unreachable_skips_authentication() {
        let prober = Arc::new(FakeProber::default());
        let connector = Arc::new(FakeConnector::new("/shares"));
        let auth = authenticator(prober.clone(), connector.clone());

        let mut session = Session::new(Target::new("10.0.0.5"));
        let err = auth.open(&mut session, None).unwrap_err();

        assert!(matches!(err, SessionError::Unreachable { ref address } if address == "10.0.0.5"));
        assert_eq!(connector.connects(), 0);
        assert_eq!(prober.calls(), 1);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_retry_with_explicit_credentials_does_not_reprobe() {
        let prober = Arc::new(FakeProber::with_online(&["10.0.0.2"]));
        let connector = Arc::new(FakeConnector::new("/shares").accept("10.0.0.2", "s3cret"));
        let auth = authenticator(prober.clone(), connector.clone());

        let mut session = Session::new(Target::new("10.0.0.2"));
        let err = auth.open(&mut session, None).unwrap_err();
        assert!(matches!(err, SessionError::AuthFailed { .. }));
        assert_eq!(session.state(), SessionState::Authenticating);

        let creds = Credentials::new("operator", "s3cret");
        auth.open(&mut session, Some(&creds)).unwrap();

        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.credentials().map(|c| c.user.as_str()), Some("operator"));
        assert_eq!(prober.calls(), 1);
        assert_eq!(connector.connects(), 2);
    }

    #[test]
    fn test_open_on_connected_session_is_rejected() {
        let prober = Arc::new(FakeProber::with_online(&["h"]));
        let connector = Arc::new(FakeConnector::new("/shares").accept("h", "default"));
        let auth = authenticator(prober, connector);

        let mut session = Session::new(Target::new("h"));
        auth.open(&mut session, None).unwrap();
        assert!(matches!(
            auth.open(&mut session, None),
            Err(SessionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_close_abandons_pending_authentication() {
        let prober = Arc::new(FakeProber::with_online(&["h"]));
        let connector = Arc::new(FakeConnector::new("/shares"));
        let auth = authenticator(prober, connector.clone());

        let mut session = Session::new(Target::new("h"));
        let _ = auth.open(&mut session, None);
        auth.close(&mut session).unwrap();

        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(connector.disconnects(), 0);
    }

    #[test]
    fn test_teardown_failure_still_disconnects() {
        let prober = Arc::new(FakeProber::with_online(&["h"]));
        let mut connector = FakeConnector::new("/shares").accept("h", "default");
        connector.fail_disconnect = true;
        let auth = authenticator(prober, Arc::new(connector));

        let mut session = Session::new(Target::new("h"));
        auth.open(&mut session, None).unwrap();
        let err = auth.close(&mut session).unwrap_err();

        assert!(matches!(err, SessionError::TeardownFailed { .. }));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(auth.close(&mut session).is_ok());
    }

    #[test]
    fn test_mounted_connector_requires_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("10.0.0.9")).unwrap();
        let connector = MountedShareConnector::new(dir.path());
        let creds = Credentials::new("u", "p");

        assert!(connector.connect("10.0.0.9", &creds).is_ok());
        assert!(matches!(
            connector.connect("10.0.0.10", &creds),
            Err(ConnectError::ShareMissing(_))
        ));
        assert_eq!(connector.share_root("10.0.0.9"), dir.path().join("10.0.0.9"));
    }

    #[test]
    fn test_net_use_share_root() {
        let connector = NetUseConnector::new("mtxuser", Duration::from_secs(5));
        assert_eq!(connector.share_root("10.1.2.3"), PathBuf::from(r"\\10.1.2.3\mtxuser"));
    }
}
