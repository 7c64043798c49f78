//! # browser-backup
//!
//! Backs up and restores web browser profiles (bookmarks, history, passwords,
//! extensions, cookies, preferences).
//!
//! ## Features
//!
//! - **Discovery**: Per-platform table of Chromium, Firefox and Opera family profile locations
//! - **Selection**: Data categories mapped to per-family file patterns, plus substring exclusions
//! - **Parallel Copy**: One task per browser on a bounded worker pool
//! - **Verification**: Optional SHA-256 comparison of every copied file
//! - **Retention**: Timestamped backup instances swept after a configurable number of days
//! - **Restore**: Copies a backup instance back into the live profile directories
//!
//! ## Quick Start
//!
//! ```no_run
//! use browser_backup::backup::backup_config::BackupConfig;
//! use browser_backup::backup::catalog::{CatalogEnv, PathCatalog, Platform};
//! use browser_backup::backup::run::BackupRun;
//!
//! let config = BackupConfig::load_or_default("config/browser_backup_config.json");
//! let catalog = PathCatalog::builder()
//!     .platform(Platform::current())
//!     .env(CatalogEnv::from_system())
//!     .build();
//! let report = BackupRun::builder()
//!     .config(config)
//!     .catalog(catalog)
//!     .backup_root("backups")
//!     .build()
//!     .execute()?;
//! println!("{report}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
