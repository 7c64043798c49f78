use crate::backup::catalog::KNOWN_APPLICATIONS;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::selector::{DataCategories, DataCategory};
use getset::{CopyGetters, Getters, MutGetters, Setters};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::{error, info, warn};
use validator::{Validate, ValidationError};

pub static DEFAULT_CONFIG_PATH: &str = "config/browser_backup_config.json";
static DEFAULT_MAX_WORKERS: usize = 4;
static DEFAULT_RETENTION_DAYS: u32 = 30;
static DEFAULT_EXCLUDED_FILES: [&str; 4] = [".lock", "Cache", "GPUCache", "CacheDictionary"];

/// Options for one backup run.
///
/// Every field has a default, so a partial file on disk is completed with the
/// built-in values. Keys this struct does not know are ignored.
#[derive(
    Clone,
    Serialize,
    Deserialize,
    Debug,
    PartialEq,
    Validate,
    Getters,
    CopyGetters,
    MutGetters,
    Setters,
)]
#[serde(default)]
pub struct BackupConfig {
    #[validate(range(min = 1))]
    #[getset(get_copy = "pub", set = "pub")]
    max_workers: usize,
    #[getset(get_copy = "pub", set = "pub")]
    verify_copies: bool,
    #[getset(get_copy = "pub", set = "pub")]
    retention_days: u32,
    #[validate(custom(function = validate_excluded_files))]
    #[getset(get = "pub", get_mut = "pub")]
    excluded_files: Vec<String>,
    #[getset(get = "pub")]
    browsers: BTreeMap<String, bool>,
    #[getset(get = "pub")]
    backup_options: DataCategories,
}

fn validate_excluded_files(excluded: &[String]) -> std::result::Result<(), ValidationError> {
    // An empty pattern is a substring of every path and would exclude everything.
    if excluded.iter().any(String::is_empty) {
        return Err(ValidationError::new("EmptyExcludedPattern")
            .with_message("excluded_files must not contain an empty string".into()));
    }

    Ok(())
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            verify_copies: true,
            retention_days: DEFAULT_RETENTION_DAYS,
            excluded_files: DEFAULT_EXCLUDED_FILES.iter().map(|s| s.to_string()).collect(),
            browsers: KNOWN_APPLICATIONS
                .iter()
                .map(|id| (id.to_string(), true))
                .collect(),
            backup_options: DataCategories::default(),
        }
    }
}

impl BackupConfig {
    /// Loads the config at `path`, never failing.
    ///
    /// A missing file is created with the defaults. A malformed or invalid file
    /// is reported and replaced in memory by the defaults, the file itself is
    /// left untouched.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            let config = Self::default();
            match config.save(path) {
                Ok(()) => info!("Wrote default config to {path:?}"),
                Err(e) => warn!("Could not write default config: {e}"),
            }
            return config;
        }

        match Self::load(path) {
            Ok(config) => {
                info!("Loaded config from {path:?}");
                config
            }
            Err(e) => {
                error!("Error loading config, using defaults: {e}");
                Self::default()
            }
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        std::fs::read_to_string(path)
            .map_err(Error::from)
            .and_then(|text| Self::from_json(&text))
            .with_msg(format!("Load config failed: {path:?}"))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config
            .validate()
            .map_err(Error::from)
            .with_msg("Config validation failed")?;
        Ok(config)
    }

    /// Atomic write: the file is either the old or the new content.
    ///
    /// An invalid config is refused so the file never holds something
    /// [`Self::load`] would reject.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.validate()
            .map_err(Error::from)
            .with_msg(format!("Refusing to save invalid config to {path:?}"))?;
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n")?;
        tmp.persist(path)?;
        Ok(())
    }

    /// Applications absent from `browsers` count as enabled.
    pub fn is_application_enabled(&self, application_id: &str) -> bool {
        self.browsers.get(application_id).copied().unwrap_or(true)
    }

    pub fn set_application_enabled(&mut self, application_id: &str, enabled: bool) {
        self.browsers.insert(application_id.to_string(), enabled);
    }

    pub fn set_category_enabled(&mut self, category: DataCategory, enabled: bool) {
        self.backup_options.set(category, enabled);
    }

    pub fn select_all_categories(&mut self) {
        self.backup_options = DataCategories::all(true);
    }

    /// Returns false when `pattern` was already excluded.
    pub fn add_excluded(&mut self, pattern: &str) -> bool {
        if self.excluded_files.iter().any(|p| p == pattern) {
            return false;
        }
        self.excluded_files.push(pattern.to_string());
        true
    }

    /// Returns false when `pattern` was not excluded.
    pub fn remove_excluded(&mut self, pattern: &str) -> bool {
        let before = self.excluded_files.len();
        self.excluded_files.retain(|p| p != pattern);
        self.excluded_files.len() != before
    }

    pub fn select_categories<I: IntoIterator<Item = DataCategory>>(&mut self, categories: I) {
        self.backup_options = DataCategories::only(categories);
    }
}
