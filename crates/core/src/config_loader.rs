use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads application configuration by merging TOML, environment
    /// variables, and JSON, then validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed, or
    /// if the merged configuration fails validation.
    pub fn load() -> Result<AppConfig> {
        Self::load_from(Figment::new().merge(Toml::file("config/Config.toml")))
    }

    /// Loads configuration from an explicit TOML path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// merged configuration fails validation.
    pub fn load_path(path: &str) -> Result<AppConfig> {
        Self::load_from(Figment::new().merge(Toml::file(path)))
    }

    fn load_from(base: Figment) -> Result<AppConfig> {
        let config: AppConfig = base
            .merge(Env::prefixed("APP_").split("__"))
            .join(Json::file("config/Config.json"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }
}
