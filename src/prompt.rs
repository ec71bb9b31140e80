//! Credential prompts used when a station rejects the default account.

use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password};
use tracing::warn;

use crate::net::Credentials;
use crate::orchestrator::CredentialPrompt;
use crate::targets::Target;

/// Asks the operator on the terminal.
pub struct TerminalPrompt {
    theme: ColorfulTheme,
    /// Pre-filled user name
    default_user: String,
}

impl TerminalPrompt {
    pub fn new(default_user: impl Into<String>) -> Self {
        Self {
            theme: ColorfulTheme::default(),
            default_user: default_user.into(),
        }
    }
}

impl CredentialPrompt for TerminalPrompt {
    fn credentials_for(
        &mut self,
        target: &Target,
        attempt: u32,
        cause: &str,
    ) -> Option<Credentials> {
        eprintln!("Login to {} failed: {}", target.display(), cause);

        let retry = Confirm::with_theme(&self.theme)
            .with_prompt(format!("Enter other credentials (attempt {})?", attempt))
            .default(true)
            .interact()
            .unwrap_or(false);
        if !retry {
            return None;
        }

        let result = Input::<String>::with_theme(&self.theme)
            .with_prompt("User")
            .default(self.default_user.clone())
            .interact_text()
            .and_then(|user| {
                Password::with_theme(&self.theme)
                    .with_prompt("Password")
                    .allow_empty_password(true)
                    .interact()
                    .map(|secret| (user, secret))
            });

        match result {
            Ok((user, secret)) => {
                self.default_user = user.clone();
                Some(Credentials::new(user, secret))
            }
            Err(e) => {
                warn!(error = %e, "credential prompt failed");
                None
            }
        }
    }
}

/// Never supplies credentials; used for unattended and JSON runs.
pub struct NoPrompt;

impl CredentialPrompt for NoPrompt {
    fn credentials_for(
        &mut self,
        _target: &Target,
        _attempt: u32,
        _cause: &str,
    ) -> Option<Credentials> {
        None
    }
}
