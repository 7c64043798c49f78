//! Copies a previous backup instance back into the live browser directories.

use crate::backup::catalog::PathCatalog;
use crate::backup::copy_engine::{CopyEngine, CopyOutcome};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::retention::RetentionSweeper;
use crate::backup::scheduler::{CopyResult, ScheduledTask};
use getset::Getters;
use itertools::Itertools;
use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

static IGNORED_DIRS: [&str; 2] = [".git", "__pycache__"];

/// Backup instances under `root`, newest first. A missing root has none.
pub fn list_instances<P: AsRef<Path>>(root: P) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    Ok(RetentionSweeper::instances(root)?
        .into_iter()
        .sorted_by_key(|i| Reverse(i.date_time))
        .map(|i| i.item)
        .collect())
}

/// Application ids stored in one backup instance.
pub fn instance_applications<P: AsRef<Path>>(instance: P) -> Result<Vec<String>> {
    let mut apps = Vec::new();
    for entry in std::fs::read_dir(instance.as_ref())? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !IGNORED_DIRS.contains(&name.as_str()) {
            apps.push(name);
        }
    }
    apps.sort();
    Ok(apps)
}

/// Restore of one application: each backed-up profile directory and its live target.
#[derive(Clone, Debug, Getters)]
pub struct RestoreTask {
    application_id: String,
    #[getset(get = "pub")]
    pairs: Vec<(PathBuf, PathBuf)>,
}

impl RestoreTask {
    pub fn new<S: Into<String>>(application_id: S, pairs: Vec<(PathBuf, PathBuf)>) -> Self {
        Self {
            application_id: application_id.into(),
            pairs,
        }
    }
}

impl ScheduledTask for RestoreTask {
    fn application_id(&self) -> &str {
        &self.application_id
    }
}

/// Builds one task per application found in `instance`.
///
/// `selected` narrows the applications; `None` restores all of them. Each
/// `<instance>/<app>/<dir name>` is paired with the catalog location of the
/// same name.
pub fn plan_restore<P: AsRef<Path>>(
    instance: P,
    selected: Option<&[String]>,
    catalog: &PathCatalog,
) -> Result<Vec<RestoreTask>> {
    let instance = instance.as_ref();
    let mut tasks = Vec::new();
    for app in instance_applications(instance)? {
        if selected.is_some_and(|s| !s.contains(&app)) {
            continue;
        }
        let app_dir = instance.join(&app);
        let mut pairs = Vec::new();
        for entry in std::fs::read_dir(&app_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().into_owned();
            match catalog.restore_target(&app, &dir_name) {
                Some(target) => pairs.push((entry.path(), target)),
                None => warn!(
                    "No {} location named {dir_name:?} for {app}, skipping",
                    catalog.platform()
                ),
            }
        }
        tasks.push(RestoreTask::new(app, pairs));
    }
    Ok(tasks)
}

pub struct RestoreEngine {
    engine: CopyEngine,
}

impl RestoreEngine {
    pub fn new(verify: bool) -> Self {
        Self {
            engine: CopyEngine::builder().verify(verify).build(),
        }
    }

    /// Copies every file under `source_backup_path` into `destination_path`.
    ///
    /// Per-file failures are counted but do not fail the restore; only an
    /// unusable backup source does.
    pub fn restore(
        &self,
        application_id: &str,
        source_backup_path: &Path,
        destination_path: &Path,
    ) -> CopyResult {
        if !source_backup_path.is_dir() {
            let e = Error::MissingBackupSource(source_backup_path.to_path_buf());
            error!("Failed to restore {application_id}: {e}");
            return CopyResult::failed(application_id, &e);
        }
        info!("Restoring {application_id}: {source_backup_path:?} -> {destination_path:?}");
        let outcome = self.engine.copy_dir(source_backup_path, destination_path);
        CopyResult::with_success(application_id, true, outcome)
    }

    pub fn restore_task(&self, task: &RestoreTask) -> CopyResult {
        if task.pairs.is_empty() {
            let e = Error::NoRestoreTarget(task.application_id.clone());
            error!("{e}");
            return CopyResult::failed(task.application_id.clone(), &e);
        }

        let mut outcome = CopyOutcome::default();
        let mut usable = true;
        for (src, dst) in &task.pairs {
            if !src.is_dir() {
                let e = Error::MissingBackupSource(src.clone());
                error!("Failed to restore {}: {e}", task.application_id);
                usable = false;
                continue;
            }
            info!("Restoring {}: {src:?} -> {dst:?}", task.application_id);
            outcome.merge(self.engine.copy_dir(src, dst));
        }
        CopyResult::with_success(task.application_id.clone(), usable, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::catalog::{CatalogEnv, Platform};
    use tempfile::TempDir;

    fn linux_catalog(home: &Path) -> PathCatalog {
        PathCatalog::builder()
            .platform(Platform::Linux)
            .env(CatalogEnv::builder().home(home.to_path_buf()).build())
            .build()
    }

    #[test]
    fn test_restore_copies_everything_without_filtering() {
        let backup = TempDir::new().unwrap();
        let live = TempDir::new().unwrap();
        std::fs::create_dir_all(backup.path().join("Default/Cache")).unwrap();
        std::fs::write(backup.path().join("Default/Cache/data_0"), "x").unwrap();
        std::fs::write(backup.path().join("Default/Bookmarks"), "b").unwrap();

        let result = RestoreEngine::new(true).restore("chrome", backup.path(), live.path());
        assert!(result.success());
        assert_eq!(result.files_copied(), 2);
        assert!(live.path().join("Default/Cache/data_0").is_file());
    }

    #[test]
    fn test_restore_missing_source_fails() {
        let live = TempDir::new().unwrap();
        let result = RestoreEngine::new(false).restore(
            "chrome",
            Path::new("/nonexistent/backup"),
            live.path(),
        );
        assert!(!result.success());
        assert_eq!(result.errors().len(), 1);
    }

    #[test]
    fn test_list_instances_newest_first() {
        let root = TempDir::new().unwrap();
        let old = root.path().join("20240101_000000");
        let new = root.path().join("20240202_000000");
        std::fs::create_dir_all(&old).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        std::fs::create_dir_all(&new).unwrap();
        std::fs::write(root.path().join("stray.json"), "{}").unwrap();

        assert_eq!(list_instances(root.path()).unwrap(), vec![new, old]);
        assert!(list_instances("/nonexistent/root").unwrap().is_empty());
    }

    #[test]
    fn test_instance_applications_skips_noise() {
        let instance = TempDir::new().unwrap();
        for d in ["firefox", "chrome", ".git", "__pycache__"] {
            std::fs::create_dir_all(instance.path().join(d)).unwrap();
        }
        std::fs::write(instance.path().join("backup_report.json"), "{}").unwrap();
        assert_eq!(instance_applications(instance.path()).unwrap(), vec!["chrome", "firefox"]);
    }

    #[test]
    fn test_plan_restore_pairs_with_catalog_targets() {
        let instance = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        std::fs::create_dir_all(instance.path().join("chrome/chromium/Default")).unwrap();
        std::fs::create_dir_all(instance.path().join("chrome/unknown-dir")).unwrap();
        std::fs::create_dir_all(instance.path().join("firefox/firefox")).unwrap();
        std::fs::create_dir_all(instance.path().join("vivaldi/nothing-known")).unwrap();

        let catalog = linux_catalog(home.path());
        let tasks = plan_restore(instance.path(), None, &catalog).unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(
            tasks[0].pairs(),
            &vec![(instance.path().join("chrome/chromium"), home.path().join(".config/chromium"))]
        );
        assert_eq!(tasks[1].pairs()[0].1, home.path().join(".mozilla/firefox"));
        assert!(tasks[2].pairs().is_empty());

        let selected = vec!["firefox".to_string()];
        let only = plan_restore(instance.path(), Some(&selected), &catalog).unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].application_id(), "firefox");
    }

    #[test]
    fn test_restore_task_without_target_fails() {
        let result = RestoreEngine::new(false).restore_task(&RestoreTask::new("vivaldi", vec![]));
        assert!(!result.success());
    }
}
