//! Optional config from .comporc or ~/.comporc (JSON). Env and CLI flags override it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::package::SourceRegistry;
use crate::pubgrub::SolveOptions;
use crate::version::Version;

pub const CONFIG_FILE: &str = ".comporc";

/// Registry URL recorded as the description of hosted packages.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory of packuments served as the hosted registry.
    pub registry: Option<PathBuf>,
    pub registry_url: Option<String>,
    pub downgrade: Option<bool>,
    pub prefetch_depth: Option<usize>,
    /// Log filter, as accepted by `COMPO_LOG`.
    pub log: Option<String>,
    /// Pinned versions by package name.
    #[serde(default)]
    pub locked: BTreeMap<String, String>,
}

impl Config {
    /// Load `.comporc` from `dir`, else from the home directory. No file means defaults.
    pub fn load(dir: &Path) -> Result<Config, ConfigError> {
        let mut candidates = vec![dir.join(CONFIG_FILE)];
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(CONFIG_FILE));
        }
        match candidates.iter().find(|path| path.is_file()) {
            Some(path) => Self::from_file(path),
            None => Ok(Config::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let body = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&body).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply `COMPO_REGISTRY`, `COMPO_DOWNGRADE` and `COMPO_LOG` from the process environment.
    pub fn with_env(self) -> Config {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`; blank values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Config {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(registry) = get("COMPO_REGISTRY") {
            self.registry = Some(PathBuf::from(registry));
        }
        if let Some(downgrade) = get("COMPO_DOWNGRADE") {
            self.downgrade = Some(matches!(downgrade.to_lowercase().as_str(), "1" | "true" | "yes"));
        }
        if let Some(log) = get("COMPO_LOG") {
            self.log = Some(log);
        }
        self
    }

    pub fn registry_url(&self) -> String {
        self.registry_url
            .as_deref()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string())
    }

    /// Solver options from this config, with pins parsed against the default source.
    pub fn solve_options(&self, sources: &SourceRegistry) -> Result<SolveOptions, ConfigError> {
        let mut options = SolveOptions {
            downgrade: self.downgrade.unwrap_or(false),
            ..SolveOptions::default()
        };
        let source = sources.default_source();
        for (name, version) in &self.locked {
            let pin_error = |reason: String| ConfigError::Pin {
                name: name.clone(),
                version: version.clone(),
                reason,
            };
            let version = Version::parse(version).map_err(|e| pin_error(e.to_string()))?;
            let id = source
                .parse_id(name, version, None)
                .map_err(|e| pin_error(e.to_string()))?;
            options = options.lock(id);
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::package::MemoryRegistry;

    fn sources() -> SourceRegistry {
        SourceRegistry::hosted(DEFAULT_REGISTRY_URL, Arc::new(MemoryRegistry::new()))
    }

    #[test]
    fn test_load_from_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"registryUrl": "https://npm.example/", "downgrade": true, "prefetchDepth": 3,
                "locked": {"o-grid": "5.0.0"}}"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.registry_url(), "https://npm.example");
        assert_eq!(config.downgrade, Some(true));
        assert_eq!(config.prefetch_depth, Some(3));
        assert_eq!(config.locked.get("o-grid").map(String::as_str), Some("5.0.0"));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();
        assert!(matches!(Config::load(dir.path()), Err(ConfigError::Json { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("COMPO_REGISTRY", "/srv/packuments"),
            ("COMPO_DOWNGRADE", "1"),
            ("COMPO_LOG", " "),
        ]);
        let config = Config {
            log: Some("debug".to_string()),
            ..Config::default()
        }
        .with_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.registry, Some(PathBuf::from("/srv/packuments")));
        assert_eq!(config.downgrade, Some(true));
        assert_eq!(config.log.as_deref(), Some("debug"));
    }

    #[test]
    fn test_solve_options_pins() {
        let config = Config {
            downgrade: Some(true),
            locked: BTreeMap::from([("o-grid".to_string(), "5.0.0".to_string())]),
            ..Config::default()
        };
        let options = config.solve_options(&sources()).unwrap();
        assert!(options.downgrade);
        let pin = &options.locked["o-grid"];
        assert_eq!(pin.version, Version::new(5, 0, 0));
        assert_eq!(pin.package.description, DEFAULT_REGISTRY_URL);

        let bad = Config {
            locked: BTreeMap::from([("o-grid".to_string(), "five".to_string())]),
            ..Config::default()
        };
        assert!(matches!(bad.solve_options(&sources()), Err(ConfigError::Pin { .. })));
    }
}
