//! Per-target session state.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::targets::Target;

use super::SessionError;

/// Lifecycle of a share session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Probing,
    Authenticating,
    Connected,
    Monitoring,
    Closing,
}

impl SessionState {
    /// Whether `self -> next` is a legal step.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Disconnected, Probing)
                | (Probing, Authenticating)
                | (Probing, Disconnected)
                | (Authenticating, Authenticating)
                | (Authenticating, Connected)
                | (Authenticating, Disconnected)
                | (Connected, Monitoring)
                | (Connected, Closing)
                | (Monitoring, Closing)
                | (Closing, Disconnected)
        )
    }

    /// Connected or being monitored: the share is usable.
    pub fn is_open(self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Monitoring)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Probing => "probing",
            SessionState::Authenticating => "authenticating",
            SessionState::Connected => "connected",
            SessionState::Monitoring => "monitoring",
            SessionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Account used to authenticate against a station share.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    secret: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Authenticated connection to one target's share.
///
/// Owned by whoever drives the pipeline; the monitor and the extractor only
/// ever see the address or a shared reference.
#[derive(Debug)]
pub struct Session {
    target: Target,
    state: SessionState,
    credentials: Option<Credentials>,
    share_root: Option<PathBuf>,
}

impl Session {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            state: SessionState::Disconnected,
            credentials: None,
            share_root: None,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn address(&self) -> &str {
        &self.target.address
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Root of the remote tree, known once connected.
    pub fn share_root(&self) -> Option<&Path> {
        self.share_root.as_deref()
    }

    /// Move to `next`, rejecting anything outside the lifecycle.
    pub fn advance(&mut self, next: SessionState) -> Result<(), SessionError> {
        if !self.state.can_advance_to(next) {
            return Err(SessionError::InvalidTransition {
                address: self.target.address.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        if next == SessionState::Disconnected {
            self.share_root = None;
        }
        Ok(())
    }

    pub(crate) fn mark_connected(
        &mut self,
        credentials: Credentials,
        share_root: PathBuf,
    ) -> Result<(), SessionError> {
        self.advance(SessionState::Connected)?;
        self.credentials = Some(credentials);
        self.share_root = Some(share_root);
        Ok(())
    }
}
