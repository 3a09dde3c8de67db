//! File and environment backed collaborators for running the guard standalone.

use async_trait::async_trait;
use risk_guard_core::{
    ActionResult, ActionStatus, AuditSink, ConfigRepository, Credentials, GuardError,
    GuardResult, Network, RiskConfig, SecretsStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

// =============================================================================
// Configurations
// =============================================================================

/// Reads risk configurations from a JSON array on every call, so edits to the
/// file are picked up on the next tick.
#[derive(Debug, Clone)]
pub struct JsonFileConfigRepository {
    path: PathBuf,
}

impl JsonFileConfigRepository {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigRepository for JsonFileConfigRepository {
    async fn list_active_risk_configs(&self) -> GuardResult<Vec<RiskConfig>> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            GuardError::Configuration(format!("cannot read {}: {e}", self.path.display()))
        })?;

        serde_json::from_str(&raw).map_err(|e| {
            GuardError::Validation(format!("malformed risk configs in {}: {e}", self.path.display()))
        })
    }
}

// =============================================================================
// Credentials
// =============================================================================

type Lookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Resolves credentials from `<PREFIX>_<USER>_API_KEY`, `..._API_SECRET`,
/// `..._PASSPHRASE` and optionally `..._NETWORK` (default mainnet).
///
/// The user id is upper-cased and every non-alphanumeric character becomes
/// `_`, so `user-1` reads `RISK_GUARD_CREDS_USER_1_API_KEY`.
pub struct EnvSecretsStore {
    prefix: String,
    lookup: Arc<Lookup>,
}

impl std::fmt::Debug for EnvSecretsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvSecretsStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl EnvSecretsStore {
    /// Reads from the process environment.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_lookup(prefix, |name| std::env::var(name).ok())
    }

    /// Reads through `lookup` instead of the process environment.
    #[must_use]
    pub fn with_lookup<F>(prefix: impl Into<String>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            prefix: prefix.into(),
            lookup: Arc::new(lookup),
        }
    }

    /// Name of the variable holding `field` for `user_id`.
    #[must_use]
    pub fn variable(&self, user_id: &str, field: &str) -> String {
        let user: String = user_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}_{user}_{field}", self.prefix)
    }

    fn required(&self, user_id: &str, field: &str) -> GuardResult<String> {
        let name = self.variable(user_id, field);
        match (self.lookup)(&name) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(GuardError::credentials(user_id, format!("{name} is not set"))),
        }
    }
}

#[async_trait]
impl SecretsStore for EnvSecretsStore {
    async fn get_credentials(&self, user_id: &str) -> GuardResult<Credentials> {
        let api_key = self.required(user_id, "API_KEY")?;
        let api_secret = self.required(user_id, "API_SECRET")?;
        let passphrase = self.required(user_id, "PASSPHRASE")?;

        let network = match (self.lookup)(&self.variable(user_id, "NETWORK")) {
            Some(raw) => raw
                .parse::<Network>()
                .map_err(|e| GuardError::credentials(user_id, e.to_string()))?,
            None => Network::Mainnet,
        };

        Ok(Credentials::new(api_key, api_secret, passphrase, network))
    }
}

// =============================================================================
// Audit
// =============================================================================

/// Appends one JSON object per record to a file.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditSink {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, result: &ActionResult) -> GuardResult<()> {
        let mut line = serde_json::to_string(result)
            .map_err(|e| GuardError::Validation(format!("unserializable record: {e}")))?;
        line.push('\n');

        let io_error =
            |e: std::io::Error| GuardError::Configuration(format!("audit log {}: {e}", self.path.display()));

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_error)?;
        file.write_all(line.as_bytes()).await.map_err(io_error)?;
        file.flush().await.map_err(io_error)?;
        Ok(())
    }
}

/// Emits every record as a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, result: &ActionResult) -> GuardResult<()> {
        match result.status {
            ActionStatus::Success => tracing::info!(
                target: "risk_guard::audit",
                record_id = %result.id,
                config_id = %result.config_id,
                position_id = ?result.position_id,
                action = result.action.as_str(),
                amount_sats = ?result.amount_sats,
                "action recorded"
            ),
            ActionStatus::Error => tracing::warn!(
                target: "risk_guard::audit",
                record_id = %result.id,
                config_id = %result.config_id,
                position_id = ?result.position_id,
                action = result.action.as_str(),
                triggered = result.triggered,
                kind = ?result.error_kind,
                message = result.message.as_deref().unwrap_or_default(),
                "failure recorded"
            ),
        }
        Ok(())
    }
}

/// Forwards each record to every inner sink; reports the first failure
/// after all sinks were tried.
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl AuditSink for FanoutAuditSink {
    async fn record(&self, result: &ActionResult) -> GuardResult<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(result).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
