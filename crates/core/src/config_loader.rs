use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Environment variable prefix for overrides, e.g. `RISK_GUARD_MONITOR__INTERVAL_SECS`.
    pub const ENV_PREFIX: &'static str = "RISK_GUARD_";

    /// Loads configuration from built-in defaults, `path` (if it exists) and
    /// environment overrides, then validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or the result is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        let config: AppConfig = Self::figment(path)
            .extract()
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;

        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    /// Loads configuration with a profile file layered on top, e.g. `Config.testnet.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_with_profile(path: impl AsRef<Path>, profile: &str) -> Result<AppConfig> {
        let path = path.as_ref();
        let profile_path = path.with_extension(format!("{profile}.toml"));
        let config: AppConfig = Self::figment(path)
            .merge(Toml::file(&profile_path))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| {
                format!(
                    "failed to load configuration from {} with profile {profile}",
                    path.display()
                )
            })?;

        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetriggerPolicy;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let config = ConfigLoader::load("does/not/exist.toml").unwrap();
        assert_eq!(config.monitor.interval_secs, 20);
        assert_eq!(config.cache.market_ttl_secs, 30);
    }

    #[test]
    fn toml_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[monitor]
interval_secs = 5
max_concurrency = 2

[monitor.retrigger]
mode = "every_tick"

[cache]
market_ttl_secs = 15
"#
        )
        .unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.monitor.interval_secs, 5);
        assert_eq!(config.monitor.max_concurrency, 2);
        assert_eq!(config.monitor.retrigger, RetriggerPolicy::EveryTick);
        assert_eq!(config.cache.market_ttl_secs, 15);
        assert_eq!(config.cache.historical_ttl_secs, 600);
    }

    #[test]
    fn market_ttl_above_ceiling_fails_to_load() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[cache]\nmarket_ttl_secs = 45").unwrap();

        let err = ConfigLoader::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("ceiling"));
    }
}
