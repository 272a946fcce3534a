//! Protection for destructive store operations.
//!
//! A store drop runs only after [`DropGuard::check`] approves it. Production
//! deployments require an explicit confirmation, and silencing that
//! confirmation against production is refused outright.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::warn;

use disease_core::defaults::{ENV_DEPLOY, ENV_SKIP_CONFIRMATION};
use disease_core::{Error, Result};

/// Deployment environment a store is running against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployEnv {
    Dev,
    Staging,
    Prod,
}

impl DeployEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployEnv::Dev => "Dev",
            DeployEnv::Staging => "Staging",
            DeployEnv::Prod => "Prod",
        }
    }

    /// Whether destructive operations need confirmation here.
    pub fn is_protected(&self) -> bool {
        matches!(self, DeployEnv::Prod)
    }
}

impl fmt::Display for DeployEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployEnv {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(DeployEnv::Dev),
            "staging" => Ok(DeployEnv::Staging),
            "prod" => Ok(DeployEnv::Prod),
            other => Err(Error::Config(format!(
                "{} must be one of Dev, Staging, Prod (got {:?})",
                ENV_DEPLOY, other
            ))),
        }
    }
}

/// Asks an operator to approve a destructive operation.
pub trait Confirmer: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Refuses every request. Used when no operator is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyConfirmer;

impl Confirmer for DenyConfirmer {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}

/// Decides whether a store may be dropped.
#[derive(Clone)]
pub struct DropGuard {
    env: Option<DeployEnv>,
    skip_confirmation: bool,
    confirmer: Arc<dyn Confirmer>,
}

impl fmt::Debug for DropGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DropGuard")
            .field("env", &self.env)
            .field("skip_confirmation", &self.skip_confirmation)
            .finish_non_exhaustive()
    }
}

impl Default for DropGuard {
    fn default() -> Self {
        Self::new(None, false)
    }
}

impl DropGuard {
    pub fn new(env: Option<DeployEnv>, skip_confirmation: bool) -> Self {
        Self {
            env,
            skip_confirmation,
            confirmer: Arc::new(DenyConfirmer),
        }
    }

    /// Build from `DISEASE_NORM_ENV` and `DISEASE_NORM_SKIP_CONFIRMATION`.
    pub fn from_env() -> Result<Self> {
        let env = match std::env::var(ENV_DEPLOY) {
            Ok(raw) if !raw.trim().is_empty() => Some(raw.parse::<DeployEnv>()?),
            _ => None,
        };
        let skip_confirmation = std::env::var(ENV_SKIP_CONFIRMATION)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Ok(Self::new(env, skip_confirmation))
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    pub fn env(&self) -> Option<DeployEnv> {
        self.env
    }

    /// Whether the drop may proceed.
    ///
    /// Unprotected environments always pass. A protected environment asks
    /// the confirmer, and fails with `DatabaseWrite` if confirmation has been
    /// switched off.
    pub fn check(&self) -> Result<bool> {
        match self.env {
            Some(env) if env.is_protected() => {
                if self.skip_confirmation {
                    warn!(
                        subsystem = "db",
                        component = "guard",
                        env = %env,
                        "Refusing silent drop of protected database"
                    );
                    return Err(Error::DatabaseWrite(format!(
                        "Must unset {} to delete a {} database",
                        ENV_SKIP_CONFIRMATION, env
                    )));
                }
                Ok(self
                    .confirmer
                    .confirm("Are you sure you want to delete existing data?"))
            }
            _ => Ok(true),
        }
    }
}
