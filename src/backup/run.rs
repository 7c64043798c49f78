//! Backup and restore runs.
//!
//! A run owns everything one invocation needs (configuration, catalog,
//! destination, start time) so that no component reaches for global state.

use crate::backup::backup_config::BackupConfig;
use crate::backup::catalog::PathCatalog;
use crate::backup::copy_engine::CopyEngine;
use crate::backup::report::RunReport;
use crate::backup::restore::{list_instances, plan_restore, RestoreEngine};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::retention::RetentionSweeper;
use crate::backup::scheduler::{CopyResult, CopyTask, ScheduledTask, TaskScheduler};
use crate::backup::selector::FileSelector;
use crate::backup::validate::{validate_dir_exist, validate_writable_dir};
use bon::Builder;
use chrono::{DateTime, Local};
use getset::Getters;
use std::path::PathBuf;
use tracing::{info, warn};

/// Name of a backup instance directory.
pub static RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct BackupRun {
    config: BackupConfig,
    catalog: PathCatalog,
    #[builder(into)]
    backup_root: PathBuf,
    #[builder(default = Local::now())]
    started: DateTime<Local>,
    #[builder(into)]
    log_file: Option<PathBuf>,
}

impl BackupRun {
    pub fn instance_dir(&self) -> PathBuf {
        self.backup_root
            .join(self.started.format(RUN_TIMESTAMP_FORMAT).to_string())
    }

    /// Creates the instance directory. Fails if it already exists, so two runs
    /// never share one.
    pub fn create_instance(&self) -> Result<PathBuf> {
        validate_writable_dir(&self.backup_root)
            .map_err(Error::from)
            .with_msg(format!("Backup root unusable: {:?}", self.backup_root))?;
        let instance = self.instance_dir();
        std::fs::create_dir(&instance)
            .map_err(Error::from)
            .with_msg(format!("Create backup instance failed: {instance:?}"))?;
        Ok(instance)
    }

    /// One task per discovered application, each writing only under `<instance>/<id>`.
    pub fn tasks(&self) -> Vec<CopyTask> {
        let instance = self.instance_dir();
        self.catalog
            .resolve(&self.config)
            .into_iter()
            .map(|(id, sources)| {
                let destination = instance.join(&id);
                CopyTask::new(id, sources, destination)
            })
            .collect()
    }

    fn backup_task(&self, task: &CopyTask) -> CopyResult {
        let engine = CopyEngine::builder()
            .selector(FileSelector::new(task.application_id(), *self.config.backup_options()))
            .excluded(self.config.excluded_files().clone())
            .verify(self.config.verify_copies())
            .build();
        info!("Backing up {}", task.application_id());
        let outcome = engine.copy_tree(task.sources(), task.destination());
        CopyResult::from_outcome(task.application_id(), outcome)
    }

    /// Discovery, concurrent copy, retention sweep, report.
    ///
    /// Only a missing instance directory, a worker pool that cannot start or
    /// an unwritable report make this return an error; failing applications
    /// are reported inside the [`RunReport`].
    pub fn execute(&self) -> Result<RunReport> {
        info!("Starting browser backup process");
        let instance = self.create_instance()?;

        let tasks = self.tasks();
        if tasks.is_empty() {
            warn!("No browser profiles found");
        }

        let scheduler = TaskScheduler::new(self.config.max_workers())?;
        let results = scheduler.run_all(tasks, |task| self.backup_task(task));

        let removed = RetentionSweeper::builder()
            .retention_days(self.config.retention_days())
            .protected(vec![instance.clone()])
            .build()
            .sweep(&self.backup_root, self.started.to_utc());
        if !removed.is_empty() {
            info!("Removed {} old backup(s)", removed.len());
        }

        let report =
            RunReport::new(self.started, &instance, results).with_log_file(self.log_file.clone());
        report.write_to(&instance)?;
        Ok(report)
    }
}

#[derive(Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct RestoreRun {
    catalog: PathCatalog,
    #[builder(into)]
    backup_root: PathBuf,
    /// Newest instance under `backup_root` when not given.
    #[builder(into)]
    instance: Option<PathBuf>,
    applications: Option<Vec<String>>,
    #[builder(default = true)]
    verify: bool,
    #[builder(default = 4)]
    max_workers: usize,
    #[builder(default = Local::now())]
    started: DateTime<Local>,
    #[builder(into)]
    log_file: Option<PathBuf>,
}

impl RestoreRun {
    pub fn source_instance(&self) -> Result<PathBuf> {
        match &self.instance {
            Some(instance) => {
                validate_dir_exist(instance)
                    .map_err(Error::from)
                    .with_msg(format!("Backup instance unusable: {instance:?}"))?;
                Ok(instance.clone())
            }
            None => list_instances(&self.backup_root)?
                .into_iter()
                .next()
                .ok_or_else(|| Error::NoBackupInstance(self.backup_root.clone())),
        }
    }

    /// Fails when no application of the instance is selected, be it an empty
    /// instance or a filter matching none of its applications.
    pub fn execute(&self) -> Result<RunReport> {
        info!("Starting browser restore process");
        let instance = self.source_instance()?;
        let tasks = plan_restore(&instance, self.applications.as_deref(), &self.catalog)?;
        if tasks.is_empty() {
            return Err(Error::NothingToRestore {
                requested: match &self.applications {
                    Some(apps) => apps.join(", "),
                    None => "all".to_string(),
                },
                instance,
            });
        }

        let engine = RestoreEngine::new(self.verify);
        let scheduler = TaskScheduler::new(self.max_workers)?;
        let results = scheduler.run_all(tasks, |task| engine.restore_task(task));
        Ok(RunReport::new(self.started, &instance, results)
            .with_log_file(self.log_file.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::catalog::{CatalogEnv, Platform};
    use crate::backup::report::REPORT_FILE_NAME;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn catalog(home: &std::path::Path) -> PathCatalog {
        PathCatalog::builder()
            .platform(Platform::Linux)
            .env(CatalogEnv::builder().home(home.to_path_buf()).build())
            .build()
    }

    fn chrome_profile(home: &std::path::Path) {
        let profile = home.join(".config/google-chrome/Default");
        std::fs::create_dir_all(profile.join("Cache")).unwrap();
        std::fs::write(profile.join("Bookmarks"), "{}").unwrap();
        std::fs::write(profile.join("Cache/index"), "x").unwrap();
    }

    #[test]
    fn test_instance_dir_layout() {
        let started = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let run = BackupRun::builder()
            .config(BackupConfig::default())
            .catalog(catalog(std::path::Path::new("/home/u")))
            .backup_root("/backups")
            .started(started)
            .build();
        assert_eq!(run.instance_dir(), PathBuf::from("/backups/20240102_030405"));
    }

    #[test]
    fn test_execute_writes_report_and_layout() {
        let home = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        chrome_profile(home.path());

        let run = BackupRun::builder()
            .config(BackupConfig::default())
            .catalog(catalog(home.path()))
            .backup_root(root.path())
            .build();
        let report = run.execute().unwrap();

        let instance = run.instance_dir();
        assert!(instance.join("chrome/google-chrome/Default/Bookmarks").is_file());
        assert!(!instance.join("chrome/google-chrome/Default/Cache").exists());
        assert!(instance.join(REPORT_FILE_NAME).is_file());
        assert_eq!(report.results().len(), 1);
        assert!(report.is_complete_success());
    }

    #[test]
    fn test_same_timestamp_twice_is_fatal() {
        let home = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let started = Local::now();
        let build = || {
            BackupRun::builder()
                .config(BackupConfig::default())
                .catalog(catalog(home.path()))
                .backup_root(root.path())
                .started(started)
                .build()
        };
        assert!(build().execute().is_ok());
        assert!(build().execute().is_err());
    }

    #[test]
    fn test_execute_sweeps_old_instances_but_not_current() {
        let home = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("20000101_000000")).unwrap();

        let mut config = BackupConfig::default();
        config.set_retention_days(0);
        // Started in the future so the pre-existing instance counts as older than zero days.
        let run = BackupRun::builder()
            .config(config)
            .catalog(catalog(home.path()))
            .backup_root(root.path())
            .started(Local::now() + Duration::days(1))
            .build();
        run.execute().unwrap();

        assert!(!root.path().join("20000101_000000").exists());
        assert!(run.instance_dir().is_dir());
    }

    #[test]
    fn test_restore_without_instances_fails() {
        let root = TempDir::new().unwrap();
        let run = RestoreRun::builder()
            .catalog(catalog(root.path()))
            .backup_root(root.path())
            .build();
        assert!(matches!(run.execute(), Err(Error::NoBackupInstance(_))));
    }

    #[test]
    fn test_restore_unknown_application_fails() {
        let home = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        chrome_profile(home.path());
        BackupRun::builder()
            .config(BackupConfig::default())
            .catalog(catalog(home.path()))
            .backup_root(root.path())
            .build()
            .execute()
            .unwrap();

        let fresh = TempDir::new().unwrap();
        let run = RestoreRun::builder()
            .catalog(catalog(fresh.path()))
            .backup_root(root.path())
            .applications(vec!["chrmoe".to_string()])
            .build();
        match run.execute() {
            Err(Error::NothingToRestore { requested, .. }) => assert_eq!(requested, "chrmoe"),
            other => panic!("Expected NothingToRestore, got {other:?}"),
        }
        assert!(!fresh.path().join(".config").exists());
    }

    #[test]
    fn test_restore_missing_instance_dir_fails() {
        let root = TempDir::new().unwrap();
        let run = RestoreRun::builder()
            .catalog(catalog(root.path()))
            .backup_root(root.path())
            .instance(root.path().join("20240101_000000"))
            .build();
        assert!(run.execute().is_err());
    }
}
