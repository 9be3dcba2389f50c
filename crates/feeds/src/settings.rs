//! The `rsign` configuration file: engine thresholds plus feed wiring.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use roadsigns_recon::config::FetchConfig;
use roadsigns_recon::{
    FixtureAdapter, ReconConfig, ReconError, ReconService, SourceAdapter, SourceId,
};

use crate::client::HttpFeed;
use crate::file::FileFeed;
use crate::store::{default_state_path, JsonStateStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedMode {
    /// Built-in demo dataset.
    #[default]
    Mock,
    /// HTTP registries under `api_base`.
    Live,
    /// JSON exports on disk.
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedSettings {
    pub mode: FeedMode,
    pub api_base: Option<String>,
    pub authority_path: String,
    pub commercial_path: String,
    pub authority_file: Option<PathBuf>,
    pub commercial_file: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
    /// Retries per HTTP request on 429 / 5xx / transport errors.
    pub max_retries: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            mode: FeedMode::Mock,
            api_base: None,
            authority_path: "/authority-signs/".into(),
            commercial_path: "/commercial-signs/".into(),
            authority_file: None,
            commercial_file: None,
            state_file: None,
            max_retries: 2,
        }
    }
}

impl FeedSettings {
    pub fn validate(&self) -> Result<(), ReconError> {
        match self.mode {
            FeedMode::Mock => {}
            FeedMode::Live => {
                let base = self.api_base.as_deref().map(str::trim).unwrap_or("");
                if base.is_empty() {
                    return Err(ReconError::ConfigValidation(
                        "feeds.api_base is required when feeds.mode = \"live\"".into(),
                    ));
                }
                if !(base.starts_with("http://") || base.starts_with("https://")) {
                    return Err(ReconError::ConfigValidation(format!(
                        "feeds.api_base must be an http(s) URL, got '{base}'"
                    )));
                }
            }
            FeedMode::File => {
                if self.authority_file.is_none() || self.commercial_file.is_none() {
                    return Err(ReconError::ConfigValidation(
                        "feeds.authority_file and feeds.commercial_file are required when feeds.mode = \"file\"".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Make relative file paths relative to `base` (the config file's directory).
    pub fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.authority_file,
            &mut self.commercial_file,
            &mut self.state_file,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn state_path(&self) -> Result<PathBuf, ReconError> {
        self.state_file
            .clone()
            .or_else(default_state_path)
            .ok_or_else(|| {
                ReconError::ConfigValidation(
                    "no data directory on this platform; set feeds.state_file".into(),
                )
            })
    }

    /// Authority and commercial adapters for the configured mode.
    pub fn build_adapters(
        &self,
        fetch: &FetchConfig,
    ) -> Result<(Arc<dyn SourceAdapter>, Arc<dyn SourceAdapter>), ReconError> {
        self.validate()?;
        let pair: (Arc<dyn SourceAdapter>, Arc<dyn SourceAdapter>) = match self.mode {
            FeedMode::Mock => (
                Arc::new(FixtureAdapter::mock(SourceId::Authority)),
                Arc::new(FixtureAdapter::mock(SourceId::Commercial)),
            ),
            FeedMode::Live => {
                let base = self.api_base.as_deref().unwrap_or_default();
                let http = |source: SourceId, path: &str| {
                    HttpFeed::new(source, base, path, fetch.timeout())
                        .map(|feed| feed.with_retry(self.max_retries, std::time::Duration::from_millis(500)))
                        .map_err(|error| ReconError::Fetch { feed: source, error })
                };
                (
                    Arc::new(http(SourceId::Authority, &self.authority_path)?),
                    Arc::new(http(SourceId::Commercial, &self.commercial_path)?),
                )
            }
            FeedMode::File => {
                let file = |source: SourceId, path: &Option<PathBuf>| {
                    path.clone().map(|p| FileFeed::new(source, p)).ok_or_else(|| {
                        ReconError::ConfigValidation(format!("feeds.{source}_file is not set"))
                    })
                };
                (
                    Arc::new(file(SourceId::Authority, &self.authority_file)?),
                    Arc::new(file(SourceId::Commercial, &self.commercial_file)?),
                )
            }
        };
        Ok(pair)
    }
}

/// Whole configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub engine: ReconConfig,
    pub feeds: FeedSettings,
}

impl AppConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: AppConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file; relative paths inside it
    /// resolve against its directory.
    pub fn load(path: &Path) -> Result<Self, ReconError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ReconError::ConfigParse(format!("cannot read {}: {e}", path.display())))?;
        let mut config = Self::from_toml(&text)?;
        if let Some(dir) = path.parent() {
            config.feeds.resolve_paths(dir);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        self.engine.validate()?;
        self.feeds.validate()
    }

    /// Wire adapters and the JSON state store into a service.
    pub fn open_service(&self) -> Result<ReconService, ReconError> {
        let (authority, commercial) = self.feeds.build_adapters(&self.engine.fetch)?;
        let store = JsonStateStore::new(self.feeds.state_path()?);
        log::debug!(
            "opening service: {:?} feeds, state at {}",
            self.feeds.mode,
            store.path().display()
        );
        ReconService::new(self.engine.clone(), authority, commercial, Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_mock() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.feeds.mode, FeedMode::Mock);
        assert_eq!(config.feeds.authority_path, "/authority-signs/");
        assert_eq!(config.engine, ReconConfig::default());
    }

    #[test]
    fn full_document() {
        let config = AppConfig::from_toml(
            r#"
[engine.matching]
link_distance_m = 20.0

[engine.fetch]
timeout_secs = 4

[feeds]
mode = "live"
api_base = "http://localhost:8000/api"
"#,
        )
        .unwrap();
        assert_eq!(config.engine.matching.link_distance_m, 20.0);
        assert_eq!(config.engine.fetch.timeout_secs, 4);
        assert_eq!(config.feeds.mode, FeedMode::Live);
    }

    #[test]
    fn live_requires_api_base() {
        let err = AppConfig::from_toml("[feeds]\nmode = \"live\"\n").unwrap_err();
        assert!(err.to_string().contains("api_base"));
        let err = AppConfig::from_toml("[feeds]\nmode = \"live\"\napi_base = \"localhost\"\n").unwrap_err();
        assert!(err.to_string().contains("http(s)"));
    }

    #[test]
    fn file_mode_requires_both_files() {
        let err = AppConfig::from_toml("[feeds]\nmode = \"file\"\nauthority_file = \"a.json\"\n")
            .unwrap_err();
        assert!(matches!(err, ReconError::ConfigValidation(_)));
    }

    #[test]
    fn engine_errors_surface() {
        let err = AppConfig::from_toml("[engine.conflict]\nposition_tolerance_m = -1\n").unwrap_err();
        assert!(err.to_string().contains("position_tolerance_m"));
        let err = AppConfig::from_toml("[feeds]\nmode = \"ftp\"\n").unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }

    #[test]
    fn relative_paths_follow_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rsign.toml");
        std::fs::write(
            &path,
            "[feeds]\nmode = \"file\"\nauthority_file = \"a.json\"\ncommercial_file = \"/abs/c.json\"\nstate_file = \"state.json\"\n",
        )
        .unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.feeds.authority_file, Some(dir.path().join("a.json")));
        assert_eq!(config.feeds.commercial_file, Some(PathBuf::from("/abs/c.json")));
        assert_eq!(config.feeds.state_path().unwrap(), dir.path().join("state.json"));
    }

    #[test]
    fn builds_adapters_per_mode() {
        let config = AppConfig::default();
        let (a, c) = config.feeds.build_adapters(&config.engine.fetch).unwrap();
        assert_eq!(a.source(), SourceId::Authority);
        assert_eq!(c.source(), SourceId::Commercial);
        assert_eq!(a.fetch_records().unwrap().len(), 7);
    }
}
