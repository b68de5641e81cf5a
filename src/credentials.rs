//! Bearer credential providers
//!
//! Every job asks its [`CredentialProvider`] for a fresh token. Tokens are
//! short-lived, and submissions are rare enough that refreshing per job costs
//! less than the bugs a shared cache invites. The same token is then reused
//! for that job's polls and artifact downloads.

use crate::config::{CredentialConfig, TokenCommandConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::process::Command;

/// A short-lived bearer token
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wrap a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token value
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// Issues bearer tokens for provider calls
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Issue a fresh token
    async fn issue(&self) -> Result<BearerToken>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Build the provider described by `config`
///
/// A token command takes precedence over a static token.
pub fn from_config(config: &CredentialConfig) -> Result<Arc<dyn CredentialProvider>> {
    if let Some(command) = &config.token_command {
        return Ok(Arc::new(CommandCredential::new(command.clone())));
    }
    if let Some(token) = &config.static_token {
        return Ok(Arc::new(StaticCredential::new(token.clone())));
    }
    Err(Error::config(
        "credentials",
        "either static_token or token_command must be set",
    ))
}

/// Always returns the same token
pub struct StaticCredential {
    token: BearerToken,
}

impl StaticCredential {
    /// Create a provider for a fixed token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: BearerToken::new(token),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn issue(&self) -> Result<BearerToken> {
        Ok(self.token.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Runs an external command and uses its trimmed stdout as the token
///
/// # Example
///
/// ```no_run
/// use genjob::config::TokenCommandConfig;
/// use genjob::credentials::{CommandCredential, CredentialProvider};
/// use std::time::Duration;
///
/// # async fn example() -> genjob::Result<()> {
/// let provider = CommandCredential::new(TokenCommandConfig {
///     program: "gcloud".into(),
///     args: vec!["auth".into(), "print-access-token".into()],
///     timeout: Duration::from_secs(30),
/// });
/// let token = provider.issue().await?;
/// # Ok(())
/// # }
/// ```
pub struct CommandCredential {
    config: TokenCommandConfig,
}

impl CommandCredential {
    /// Create a provider for the given command
    pub fn new(config: TokenCommandConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CredentialProvider for CommandCredential {
    async fn issue(&self) -> Result<BearerToken> {
        let program = &self.config.program;
        let result = tokio::time::timeout(
            self.config.timeout,
            Command::new(program)
                .args(&self.config.args)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::Credential(format!(
                    "failed to run {}: {}",
                    program.display(),
                    e
                )));
            }
            Err(_) => {
                return Err(Error::Credential(format!(
                    "{} timed out after {:?}",
                    program.display(),
                    self.config.timeout
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(
                program = ?program,
                code = ?output.status.code(),
                "token command failed"
            );
            return Err(Error::Credential(format!(
                "{} exited with {}: {}",
                program.display(),
                output.status,
                stderr.trim()
            )));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(Error::Credential(format!(
                "{} printed an empty token",
                program.display()
            )));
        }

        tracing::debug!(program = ?program, "issued fresh bearer token");
        Ok(BearerToken::new(token))
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_bearer_token_debug_is_redacted() {
        let token = BearerToken::new("ya29.secret");

        assert_eq!(format!("{:?}", token), "BearerToken(<redacted>)");
        assert_eq!(token.secret(), "ya29.secret");
    }

    #[tokio::test]
    async fn test_static_credential_issues_token() {
        let provider = StaticCredential::new("abc");
        assert_eq!(provider.issue().await.unwrap().secret(), "abc");
        assert_eq!(provider.name(), "static");
    }

    #[test]
    fn test_from_config_prefers_command() {
        let config = CredentialConfig {
            static_token: Some("abc".into()),
            token_command: Some(TokenCommandConfig {
                program: "echo".into(),
                args: vec![],
                timeout: Duration::from_secs(5),
            }),
        };

        assert_eq!(from_config(&config).unwrap().name(), "command");
    }

    #[test]
    fn test_from_config_requires_a_source() {
        assert!(from_config(&CredentialConfig::default()).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_credential_trims_stdout() {
        let provider = CommandCredential::new(TokenCommandConfig {
            program: "echo".into(),
            args: vec!["  fresh-token  ".into()],
            timeout: Duration::from_secs(5),
        });

        assert_eq!(provider.issue().await.unwrap().secret(), "fresh-token");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_credential_reports_failure() {
        let provider = CommandCredential::new(TokenCommandConfig {
            program: "false".into(),
            args: vec![],
            timeout: Duration::from_secs(5),
        });

        assert!(matches!(provider.issue().await, Err(Error::Credential(_))));
    }

    #[tokio::test]
    async fn test_command_credential_missing_binary() {
        let provider = CommandCredential::new(TokenCommandConfig {
            program: "/nonexistent/genjob-token-helper".into(),
            args: vec![],
            timeout: Duration::from_secs(5),
        });

        assert!(matches!(provider.issue().await, Err(Error::Credential(_))));
    }
}
