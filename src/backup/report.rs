//! Per-run summary: which applications succeeded, with their counters, saved
//! as JSON inside the backup instance.

use crate::backup::result_error::result::Result;
use crate::backup::scheduler::CopyResult;
use chrono::{DateTime, TimeZone};
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::path::{Path, PathBuf};

pub static REPORT_FILE_NAME: &str = "backup_report.json";

/// Outcome of one backup or restore run, written once at the end of the run.
#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Getters)]
#[getset(get = "pub")]
pub struct RunReport {
    timestamp: String,
    backup_location: PathBuf,
    results: BTreeMap<String, bool>,
    #[serde(default)]
    details: BTreeMap<String, CopyResult>,
    log_file: Option<PathBuf>,
}

impl RunReport {
    pub fn new<T: TimeZone, P: Into<PathBuf>>(
        timestamp: DateTime<T>,
        backup_location: P,
        details: BTreeMap<String, CopyResult>,
    ) -> Self
    where
        T::Offset: Display,
    {
        Self {
            timestamp: timestamp.to_rfc3339(),
            backup_location: backup_location.into(),
            results: details.iter().map(|(id, r)| (id.clone(), r.success())).collect(),
            details,
            log_file: None,
        }
    }

    pub fn with_log_file<P: Into<PathBuf>>(mut self, log_file: Option<P>) -> Self {
        self.log_file = log_file.map(Into::into);
        self
    }

    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|ok| **ok).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed() == 0
    }

    /// Writes the report as `backup_report.json` inside `dir`.
    pub fn write_to<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let dir = dir.as_ref();
        let path = dir.join(REPORT_FILE_NAME);
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n")?;
        tmp.persist(&path)?;
        tracing::info!("Saved run report to {path:?}");
        Ok(path)
    }

    pub fn read_from<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let text = std::fs::read_to_string(dir.as_ref().join(REPORT_FILE_NAME))?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for result in self.details.values() {
            let status = if result.success() { "OK" } else { "FAILED" };
            write!(
                f,
                "  {:<10} {:<6} {} file(s), {} byte(s)",
                result.application_id(),
                status,
                result.files_copied(),
                result.bytes_copied()
            )?;
            if result.files_failed() > 0 {
                write!(f, ", {} file error(s)", result.files_failed())?;
            }
            writeln!(f)?;
        }

        let verdict = match (self.succeeded(), self.failed()) {
            (_, 0) => "all succeeded",
            (0, _) => "all failed",
            _ => "partial success",
        };
        writeln!(
            f,
            "{} of {} application(s) succeeded ({verdict})",
            self.succeeded(),
            self.results.len()
        )?;
        write!(f, "Location: {}", self.backup_location.display())?;
        if let Some(log_file) = &self.log_file {
            write!(f, "\nDetailed log: {}", log_file.display())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::copy_engine::CopyOutcome;
    use crate::backup::result_error::error::Error;
    use chrono::Utc;
    use tempfile::TempDir;

    fn details() -> BTreeMap<String, CopyResult> {
        BTreeMap::from([
            ("chrome".to_string(), CopyResult::failed("chrome", &Error::LoggingInit("x".into()))),
            (
                "firefox".to_string(),
                CopyResult::with_success("firefox", true, CopyOutcome::default()),
            ),
        ])
    }

    #[test]
    fn test_results_mirror_details() {
        let report = RunReport::new(Utc::now(), "/backups/20240101_000000", details());
        assert_eq!(report.results().len(), 2);
        assert_eq!(report.results()["firefox"], true);
        assert_eq!(report.results()["chrome"], false);
        assert_eq!(report.succeeded(), 1);
        assert!(!report.is_complete_success());
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let report = RunReport::new(Utc::now(), dir.path(), details())
            .with_log_file(Some("logs/run.log"));
        let path = report.write_to(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), REPORT_FILE_NAME);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["results"]["chrome"], serde_json::Value::Bool(false));
        assert!(json["timestamp"].is_string());
        assert!(json["backup_location"].is_string());

        assert_eq!(RunReport::read_from(dir.path()).unwrap(), report);
    }

    #[test]
    fn test_summary_reports_partial_success() {
        let report = RunReport::new(Utc::now(), "/b", details()).with_log_file(Some("/logs/x.log"));
        let text = report.to_string();
        assert!(text.contains("partial success"));
        assert!(text.contains("FAILED"));
        assert!(text.contains("/logs/x.log"));
    }

    #[test]
    fn test_log_file_omitted_when_absent() {
        let report = RunReport::new(Utc::now(), "/b", BTreeMap::new());
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("log_file").is_none());
        assert!(report.is_complete_success());
    }
}
