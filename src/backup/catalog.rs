//! Per-platform table of browser profile locations.

use crate::backup::backup_config::BackupConfig;
use bon::Builder;
use derive_more::Display;
use getset::Getters;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Platform {
    #[display("Windows")]
    Windows,
    #[display("Linux")]
    Linux,
    #[display("Darwin")]
    MacOs,
    #[display("{_0}")]
    Other(&'static str),
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &'static str) -> Self {
        match os {
            "windows" => Platform::Windows,
            "linux" => Platform::Linux,
            "macos" => Platform::MacOs,
            other => Platform::Other(other),
        }
    }
}

/// Base directories the catalog joins its relative entries onto.
#[derive(Clone, Debug, Default, Builder, Getters)]
#[getset(get = "pub")]
pub struct CatalogEnv {
    #[builder(into)]
    home: Option<PathBuf>,
    /// `%LOCALAPPDATA%` on Windows.
    #[builder(into)]
    local_app_data: Option<PathBuf>,
    /// `%APPDATA%` on Windows.
    #[builder(into)]
    roaming_app_data: Option<PathBuf>,
}

impl CatalogEnv {
    pub fn from_system() -> Self {
        Self {
            home: dirs::home_dir(),
            local_app_data: dirs::data_local_dir(),
            roaming_app_data: dirs::data_dir(),
        }
    }
}

#[derive(Clone, Copy)]
enum Base {
    Home,
    LocalAppData,
    RoamingAppData,
}

type Entry = (&'static str, &'static [(Base, &'static str)]);

static WINDOWS: &[Entry] = &[
    ("chrome", &[(Base::LocalAppData, "Google/Chrome/User Data")]),
    ("firefox", &[(Base::RoamingAppData, "Mozilla/Firefox/Profiles")]),
    ("edge", &[(Base::LocalAppData, "Microsoft/Edge/User Data")]),
    ("brave", &[(Base::LocalAppData, "BraveSoftware/Brave-Browser/User Data")]),
    ("opera", &[(Base::RoamingAppData, "Opera Software/Opera Stable")]),
    ("operagx", &[(Base::RoamingAppData, "Opera Software/Opera GX Stable")]),
    ("vivaldi", &[(Base::LocalAppData, "Vivaldi/User Data")]),
];

static LINUX: &[Entry] = &[
    ("chrome", &[(Base::Home, ".config/google-chrome"), (Base::Home, ".config/chromium")]),
    ("firefox", &[(Base::Home, ".mozilla/firefox")]),
    ("brave", &[(Base::Home, ".config/BraveSoftware/Brave-Browser")]),
    ("opera", &[(Base::Home, ".config/opera")]),
    ("operagx", &[(Base::Home, ".config/opera-gx")]),
    ("vivaldi", &[(Base::Home, ".config/vivaldi")]),
];

static MACOS: &[Entry] = &[
    ("chrome", &[(Base::Home, "Library/Application Support/Google/Chrome")]),
    ("firefox", &[(Base::Home, "Library/Application Support/Firefox/Profiles")]),
    ("edge", &[(Base::Home, "Library/Application Support/Microsoft Edge")]),
    ("brave", &[(Base::Home, "Library/Application Support/BraveSoftware/Brave-Browser")]),
    ("opera", &[(Base::Home, "Library/Application Support/com.operasoftware.Opera")]),
    ("operagx", &[(Base::Home, "Library/Application Support/com.operasoftware.OperaGX")]),
    ("vivaldi", &[(Base::Home, "Library/Application Support/Vivaldi")]),
];

/// Browser ids the catalog knows on at least one platform.
pub static KNOWN_APPLICATIONS: &[&str] =
    &["chrome", "firefox", "edge", "brave", "opera", "operagx", "vivaldi"];

#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct PathCatalog {
    platform: Platform,
    #[builder(default)]
    env: CatalogEnv,
}

impl PathCatalog {
    fn table(&self) -> &'static [Entry] {
        match self.platform {
            Platform::Windows => WINDOWS,
            Platform::Linux => LINUX,
            Platform::MacOs => MACOS,
            Platform::Other(_) => &[],
        }
    }

    fn base(&self, base: Base) -> Option<&Path> {
        match base {
            Base::Home => self.env.home.as_deref(),
            Base::LocalAppData => self.env.local_app_data.as_deref(),
            Base::RoamingAppData => self.env.roaming_app_data.as_deref(),
        }
    }

    /// Every candidate location for `application_id`, existing or not.
    pub fn candidates(&self, application_id: &str) -> Vec<PathBuf> {
        self.table()
            .iter()
            .filter(|(id, _)| *id == application_id)
            .flat_map(|(_, entries)| entries.iter())
            .filter_map(|(base, rel)| self.base(*base).map(|b| b.join(rel)))
            .collect()
    }

    /// Existing, enabled and not excluded profile directories per application.
    ///
    /// An unknown platform yields an empty map. Applications left without any
    /// directory are dropped rather than reported as failures.
    pub fn resolve(&self, config: &BackupConfig) -> BTreeMap<String, Vec<PathBuf>> {
        if let Platform::Other(os) = self.platform {
            tracing::warn!("Unsupported platform {os:?}, no browser locations known");
        }

        self.table()
            .iter()
            .filter(|(id, _)| {
                let enabled = config.is_application_enabled(id);
                if !enabled {
                    tracing::debug!("Skipping disabled application {id}");
                }
                enabled
            })
            .filter_map(|(id, _)| {
                let dirs = self
                    .candidates(id)
                    .into_iter()
                    .filter(|p| p.is_dir())
                    .filter(|p| {
                        let text = p.to_string_lossy();
                        !config.excluded_files().iter().any(|ex| text.contains(ex.as_str()))
                    })
                    .inspect(|p| tracing::info!("Found {id} profile directory {p:?}"))
                    .collect::<Vec<_>>();
                (!dirs.is_empty()).then(|| (id.to_string(), dirs))
            })
            .collect()
    }

    /// Live destination for a backed-up profile directory named `dir_name`.
    pub fn restore_target(&self, application_id: &str, dir_name: &str) -> Option<PathBuf> {
        self.candidates(application_id)
            .into_iter()
            .find(|p| p.file_name().is_some_and(|n| n == dir_name))
    }
}
