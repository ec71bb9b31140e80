//! Runs the probe -> authenticate -> monitor -> extract pipeline over a list
//! of targets and collects what happened to each.

use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::extract::{ExtractionFilter, ExtractionJob, Extractor};
use crate::net::{
    Authenticator, ConnectionMonitor, Credentials, MonitorEvent, Prober, Session, SessionError,
    SessionState,
};
use crate::targets::Target;

/// Source of replacement credentials after the host rejects a login.
pub trait CredentialPrompt {
    /// Ask for credentials for `target`. `attempt` is the number of the
    /// attempt about to be made (2 for the first retry). `None` means give up.
    fn credentials_for(
        &mut self,
        target: &Target,
        attempt: u32,
        cause: &str,
    ) -> Option<Credentials>;
}

/// Tunables for a run.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Total authentication attempts per target, including the default one
    pub max_auth_attempts: u32,
    /// Connection monitor polling interval
    pub monitor_interval: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_auth_attempts: 3,
            monitor_interval: Duration::from_secs(5),
        }
    }
}

/// Errors that stop a run before any target is contacted.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("no file types selected")]
    NoFileTypesSelected,

    #[error("no targets to process")]
    NoTargets,
}

/// Pipeline step at which a target failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Connect,
    Authenticate,
    Extract,
}

/// What happened to one target.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetOutcome {
    /// A job was produced, possibly with per-file errors
    Extracted {
        job: ExtractionJob,
        /// The monitor saw the host disappear while the session was open
        connection_lost: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        teardown_error: Option<String>,
    },
    /// No job was produced
    Failed { stage: FailureStage, cause: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub target: Target,
    #[serde(flatten)]
    pub outcome: TargetOutcome,
}

impl TargetReport {
    pub fn job(&self) -> Option<&ExtractionJob> {
        match &self.outcome {
            TargetOutcome::Extracted { job, .. } => Some(job),
            TargetOutcome::Failed { .. } => None,
        }
    }
}

/// Aggregated results of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub targets: Vec<TargetReport>,
}

impl RunReport {
    /// True when every target produced a job.
    pub fn is_success(&self) -> bool {
        self.targets.iter().all(|t| t.job().is_some())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets.iter().filter(|t| t.job().is_none())
    }

    pub fn files_copied(&self) -> u64 {
        self.targets.iter().filter_map(|t| t.job()).map(|j| j.files_copied).sum()
    }
}

/// Drives targets through the pipeline one after another.
pub struct Orchestrator<'a> {
    authenticator: &'a Authenticator,
    extractor: &'a Extractor,
    prober: Arc<dyn Prober>,
    options: OrchestratorOptions,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        authenticator: &'a Authenticator,
        extractor: &'a Extractor,
        prober: Arc<dyn Prober>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            authenticator,
            extractor,
            prober,
            options,
        }
    }

    /// Process every target. A failing target never affects the jobs of
    /// the others.
    pub fn run(
        &self,
        targets: &[Target],
        filter: &ExtractionFilter,
        destination_root: &Path,
        prompt: &mut dyn CredentialPrompt,
    ) -> Result<RunReport, RunError> {
        if !filter.has_extensions() {
            return Err(RunError::NoFileTypesSelected);
        }
        if targets.is_empty() {
            return Err(RunError::NoTargets);
        }

        let started_at = Local::now();
        let reports = targets
            .iter()
            .map(|target| TargetReport {
                target: target.clone(),
                outcome: self.process(target, filter, destination_root, prompt),
            })
            .collect();

        Ok(RunReport {
            started_at,
            finished_at: Local::now(),
            targets: reports,
        })
    }

    fn process(
        &self,
        target: &Target,
        filter: &ExtractionFilter,
        destination_root: &Path,
        prompt: &mut dyn CredentialPrompt,
    ) -> TargetOutcome {
        info!(target = %target.display(), "processing target");
        let mut session = Session::new(target.clone());

        if let Err(outcome) = self.authenticate(&mut session, prompt) {
            if let Err(e) = self.authenticator.close(&mut session) {
                warn!(error = %e, "failed to abandon session");
            }
            return outcome;
        }

        let (events_tx, events_rx) = mpsc::channel();
        let mut monitor = ConnectionMonitor::new(
            target.address.clone(),
            Arc::clone(&self.prober),
            self.options.monitor_interval,
        );
        let lost = monitor.lost_flag();
        monitor.start(events_tx);
        if let Err(e) = session.advance(SessionState::Monitoring) {
            warn!(error = %e, "session did not enter monitoring");
        }

        let extracted = self
            .extractor
            .extract_with_abort(&session, filter, destination_root, &lost);

        monitor.stop();
        let connection_lost = events_rx
            .try_iter()
            .any(|event| matches!(event, MonitorEvent::SessionLost { .. }));

        let teardown_error = match self.authenticator.close(&mut session) {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "session teardown failed");
                Some(e.to_string())
            }
        };

        match extracted {
            Ok(job) => TargetOutcome::Extracted {
                job,
                connection_lost,
                teardown_error,
            },
            Err(e) => TargetOutcome::Failed {
                stage: FailureStage::Extract,
                cause: e.to_string(),
            },
        }
    }

    /// Bounded credential retry: the default account first, then whatever
    /// the prompt supplies, up to `max_auth_attempts` in total.
    fn authenticate(
        &self,
        session: &mut Session,
        prompt: &mut dyn CredentialPrompt,
    ) -> Result<(), TargetOutcome> {
        let max_attempts = self.options.max_auth_attempts.max(1);
        let mut credentials: Option<Credentials> = None;
        let mut attempt = 1;

        loop {
            match self.authenticator.open(session, credentials.as_ref()) {
                Ok(()) => return Ok(()),
                Err(SessionError::AuthFailed { cause, .. }) => {
                    if attempt >= max_attempts {
                        return Err(TargetOutcome::Failed {
                            stage: FailureStage::Authenticate,
                            cause: format!("{} (after {} attempts)", cause, attempt),
                        });
                    }
                    attempt += 1;
                    credentials = prompt.credentials_for(session.target(), attempt, &cause);
                    if credentials.is_none() {
                        return Err(TargetOutcome::Failed {
                            stage: FailureStage::Authenticate,
                            cause: format!("{} (no further credentials supplied)", cause),
                        });
                    }
                }
                Err(e) => {
                    return Err(TargetOutcome::Failed {
                        stage: FailureStage::Connect,
                        cause: e.to_string(),
                    })
                }
            }
        }
    }
}
