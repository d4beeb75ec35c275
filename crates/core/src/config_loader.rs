//! Profile loading: TOML file, environment overrides, optional JSON merge.

use std::path::Path;

use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};

use crate::config::ConfigProfile;
use crate::error::{Result, TradeError};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads and validates a profile by merging the TOML document,
    /// `OPTRADE_`-prefixed environment variables, and a sibling JSON file
    /// if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::InvalidConfig`] if the document cannot be
    /// parsed or fails validation.
    pub fn load(path: &Path) -> Result<ConfigProfile> {
        let profile: ConfigProfile = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("OPTRADE_").split("__"))
            .join(Json::file(path.with_extension("json")))
            .extract()
            .map_err(|e| TradeError::InvalidConfig(e.to_string()))?;

        profile.validate()?;
        tracing::debug!(path = %path.display(), version = profile.version, "profile loaded");
        Ok(profile)
    }

    /// Loads a validated default profile; used when no document is given.
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::InvalidConfig`] if environment overrides
    /// produce an invalid profile.
    pub fn load_default() -> Result<ConfigProfile> {
        let profile: ConfigProfile = Figment::from(figment::providers::Serialized::defaults(
            ConfigProfile::default(),
        ))
        .merge(Env::prefixed("OPTRADE_").split("__"))
        .extract()
        .map_err(|e| TradeError::InvalidConfig(e.to_string()))?;

        profile.validate()?;
        Ok(profile)
    }
}
