//! Deletes backup instances older than the retention period.

use bon::Builder;
use chrono::{DateTime, Duration, TimeZone, Utc};
use itertools::Itertools;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

static SECONDS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Clone, Debug, Builder)]
pub struct RetentionSweeper {
    retention_days: u32,
    /// Never removed, whatever their age. Used for the instance being written.
    #[builder(default)]
    protected: Vec<PathBuf>,
}

impl RetentionSweeper {
    pub fn new(retention_days: u32) -> Self {
        Self::builder().retention_days(retention_days).build()
    }

    pub fn retention(&self) -> Duration {
        Duration::seconds(i64::from(self.retention_days) * SECONDS_PER_DAY)
    }

    /// Strictly older than the retention period. Exactly at the limit is kept.
    pub fn is_expired<T: TimeZone>(&self, modified: &DateTime<T>, now: &DateTime<T>) -> bool {
        now.clone().signed_duration_since(modified.clone()) > self.retention()
    }

    /// Immediate subdirectories of `root` with their modification time.
    ///
    /// Only an unreadable `root` is an error. An entry that cannot be
    /// inspected, for example one removed meanwhile, is logged and skipped.
    pub fn instances<P: AsRef<Path>>(
        root: P,
    ) -> std::io::Result<Vec<ItemWithDateTime<PathBuf, Utc>>> {
        let paths = std::fs::read_dir(root.as_ref())?.filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                warn!("Skipping unreadable entry in {:?}: {e}", root.as_ref());
                None
            }
        });
        Ok(Self::dated_dirs(paths))
    }

    /// Directories among `paths` with their modification time.
    pub fn dated_dirs<I: IntoIterator<Item = PathBuf>>(
        paths: I,
    ) -> Vec<ItemWithDateTime<PathBuf, Utc>> {
        paths
            .into_iter()
            .filter_map(|path| {
                let dated = std::fs::symlink_metadata(&path).and_then(|md| {
                    if !md.is_dir() {
                        return Ok(None);
                    }
                    Ok(Some(DateTime::<Utc>::from(md.modified()?)))
                });
                match dated {
                    Ok(Some(date_time)) => Some(ItemWithDateTime::from((path, date_time))),
                    Ok(None) => None,
                    Err(e) => {
                        warn!("Skipping {path:?}, cannot read its metadata: {e}");
                        None
                    }
                }
            })
            .collect()
    }

    /// Removes expired subdirectories of `root` and returns what was removed.
    ///
    /// Every failure is logged and skipped; a missing root removes nothing.
    pub fn sweep<P: AsRef<Path>>(&self, root: P, now: DateTime<Utc>) -> Vec<PathBuf> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Vec::new();
        }

        let instances = match Self::instances(root) {
            Ok(i) => i,
            Err(e) => {
                error!("Error cleaning up old backups in {root:?}: {e}");
                return Vec::new();
            }
        };

        instances
            .into_iter()
            .sorted_unstable_by_key(|i| i.date_time)
            .filter(|i| !self.protected.iter().any(|p| p == &i.item))
            .filter(|i| self.is_expired(&i.date_time, &now))
            .filter_map(|i| match std::fs::remove_dir_all(&i.item) {
                Ok(()) => {
                    info!("Removed old backup: {:?} ({:?})", i.item, i);
                    Some(i.item)
                }
                Err(e) => {
                    warn!("Removing out of retention backup {:?} failed: {e}", i.item);
                    None
                }
            })
            .collect()
    }
}

/// One-shot sweep of `root` with no protected directory.
pub fn sweep<P: AsRef<Path>>(root: P, retention_days: u32, now: DateTime<Utc>) -> Vec<PathBuf> {
    RetentionSweeper::new(retention_days).sweep(root, now)
}

#[derive(Clone, Hash, Eq, PartialEq)]
pub struct ItemWithDateTime<R, T: TimeZone> {
    pub item: R,
    pub date_time: DateTime<T>,
}

impl<R, T: TimeZone> From<(R, DateTime<T>)> for ItemWithDateTime<R, T> {
    fn from(value: (R, DateTime<T>)) -> Self {
        Self {
            item: value.0,
            date_time: value.1,
        }
    }
}

impl<R, T: TimeZone> Debug for ItemWithDateTime<R, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.date_time.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn days(n: i64) -> Duration {
        Duration::days(n)
    }

    #[test]
    fn test_boundary_is_retained() {
        let sweeper = RetentionSweeper::new(30);
        let now = Utc::now();
        assert!(!sweeper.is_expired(&(now - days(30)), &now));
        assert!(sweeper.is_expired(&(now - days(30) - Duration::seconds(1)), &now));
        assert!(!sweeper.is_expired(&(now - days(29)), &now));
        assert!(sweeper.is_expired(&(now - days(31)), &now));
    }

    #[test]
    fn test_zero_days_expires_anything_older_than_now() {
        let sweeper = RetentionSweeper::new(0);
        let now = Utc::now();
        assert!(!sweeper.is_expired(&now, &now));
        assert!(sweeper.is_expired(&(now - Duration::seconds(1)), &now));
    }

    #[test]
    fn test_sweep_31_days_removed_29_days_retained() {
        let root = TempDir::new().unwrap();
        let instance = root.path().join("20240101_000000");
        std::fs::create_dir_all(instance.join("chrome")).unwrap();
        let created = Utc::now();

        assert!(sweep(root.path(), 30, created + days(29)).is_empty());
        assert!(instance.is_dir());

        let removed = sweep(root.path(), 30, created + days(31));
        assert_eq!(removed, vec![instance.clone()]);
        assert!(!instance.exists());
    }

    #[test]
    fn test_sweep_ignores_files_and_protected() {
        let root = TempDir::new().unwrap();
        let keep = root.path().join("current");
        let old = root.path().join("old");
        std::fs::create_dir_all(&keep).unwrap();
        std::fs::create_dir_all(&old).unwrap();
        std::fs::write(root.path().join("notes.txt"), "x").unwrap();

        let sweeper = RetentionSweeper::builder()
            .retention_days(1)
            .protected(vec![keep.clone()])
            .build();
        let removed = sweeper.sweep(root.path(), Utc::now() + days(5));

        assert_eq!(removed, vec![old]);
        assert!(keep.is_dir());
        assert!(root.path().join("notes.txt").is_file());
    }

    #[test]
    fn test_vanished_entry_is_skipped() {
        let root = TempDir::new().unwrap();
        let kept = root.path().join("20240101_000000");
        std::fs::create_dir_all(&kept).unwrap();

        let vanished = root.path().join("20230101_000000");
        let dated = RetentionSweeper::dated_dirs([vanished, kept.clone()]);
        assert_eq!(dated.into_iter().map(|i| i.item).collect::<Vec<_>>(), vec![kept]);
    }

    #[test]
    fn test_missing_root_removes_nothing() {
        assert!(sweep("/nonexistent/backups/root", 0, Utc::now()).is_empty());
    }
}
