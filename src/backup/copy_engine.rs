//! Mirrors profile directories into a backup destination.
//!
//! Files are enumerated with `walkdir`, filtered by the configured exclusion
//! substrings and the [`FileSelector`], copied one by one and optionally
//! verified with SHA-256. A failing file is logged and counted; it never stops
//! the rest of the tree from being copied.

use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use crate::backup::selector::FileSelector;

use bon::Builder;
use dyn_iter::{DynIter, IntoDynIterator};
use function_name::named;
use getset::{CopyGetters, Getters};
use sha2::{Digest, Sha256};
use walkdir::{DirEntry, WalkDir};

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Primitive used to copy one file, returning the number of bytes written.
pub type CopyFn = fn(&Path, &Path) -> std::io::Result<u64>;

fn fs_copy(src: &Path, dst: &Path) -> std::io::Result<u64> {
    std::fs::copy(src, dst)
}

/// One regular file found under a source root and where it lands.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub src: Arc<Path>,
    pub dst: Arc<Path>,
}

#[derive(Clone, Debug, Builder, Getters, CopyGetters)]
pub struct CopyEngine {
    /// `None` copies every file, which is what restore wants.
    #[getset(get_copy = "pub")]
    selector: Option<FileSelector>,
    #[builder(default, into)]
    #[getset(get = "pub")]
    excluded: Vec<String>,
    #[builder(default)]
    #[getset(get_copy = "pub")]
    verify: bool,
    #[builder(default = fs_copy as CopyFn)]
    copier: CopyFn,
}

/// Counters and per-file errors of one [`CopyEngine`] invocation.
#[derive(Debug, Default, Getters, CopyGetters)]
pub struct CopyOutcome {
    #[getset(get_copy = "pub")]
    files_copied: u64,
    #[getset(get_copy = "pub")]
    files_failed: u64,
    #[getset(get_copy = "pub")]
    bytes_copied: u64,
    #[getset(get = "pub")]
    errors: Vec<Error>,
}

impl CopyOutcome {
    /// At least one file made it. Partial failure still counts as success,
    /// look at `files_failed` for the finer picture.
    pub fn success(&self) -> bool {
        self.files_copied > 0
    }

    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }

    fn record(&mut self, res: Result<u64>) {
        match res {
            Ok(bytes) => {
                self.files_copied += 1;
                self.bytes_copied += bytes;
            }
            Err(e) => {
                tracing::error!("{e}");
                self.files_failed += 1;
                self.errors.push(e);
            }
        }
    }

    pub fn merge(&mut self, other: CopyOutcome) {
        self.files_copied += other.files_copied;
        self.files_failed += other.files_failed;
        self.bytes_copied += other.bytes_copied;
        self.errors.extend(other.errors);
    }
}

impl CopyEngine {
    /// Copies every source root to `destination_root/<root dir name>/...`.
    ///
    /// Roots that do not exist are skipped silently.
    pub fn copy_tree<P: AsRef<Path>>(
        &self,
        source_roots: &[P],
        destination_root: &Path,
    ) -> CopyOutcome {
        let mut outcome = CopyOutcome::default();
        for src_root in source_roots {
            let src_root = src_root.as_ref();
            if !src_root.is_dir() {
                tracing::debug!("Skipping missing source directory {src_root:?}");
                continue;
            }
            let dst_root = match src_root.file_name() {
                Some(name) => destination_root.join(name),
                None => destination_root.to_path_buf(),
            };
            outcome.merge(self.copy_dir(src_root, &dst_root));
        }
        outcome
    }

    /// Copies the content of `src_root` directly under `dst_root`.
    pub fn copy_dir(&self, src_root: &Path, dst_root: &Path) -> CopyOutcome {
        tracing::info!("Copying {src_root:?} -> {dst_root:?}");
        let mut outcome = CopyOutcome::default();
        for entry in self.file_entries(src_root, dst_root) {
            let res = entry.and_then(|entry| {
                self.copy_file(&entry)
                    .with_msg(format!("Error copying {:?}", entry.src))
            });
            outcome.record(res);
        }
        tracing::info!(
            "Finished {src_root:?}: {} copied, {} failed, {} bytes",
            outcome.files_copied,
            outcome.files_failed,
            outcome.bytes_copied
        );
        outcome
    }

    /// Regular files under `src_root` that pass exclusion and selection.
    ///
    /// Excluded directories are pruned from the walk, so nothing beneath them
    /// is visited.
    #[named]
    pub fn file_entries<'a>(
        &'a self,
        src_root: &Path,
        dst_root: &Path,
    ) -> DynIter<'a, Result<FileEntry>> {
        let prune_root = src_root.to_path_buf();
        let src_root = src_root.to_path_buf();
        let dst_root = dst_root.to_path_buf();

        WalkDir::new(&src_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(move |de| !self.is_excluded(de, &prune_root))
            .filter_map(move |res| match res {
                Ok(de) => self.process_dir_entry(de, &src_root, &dst_root),
                Err(e) => Some(Err(Error::from(e)
                    .with_debug_object_and_fn_name(src_root.clone(), function_path!()))),
            })
            .into_dyn_iter()
    }

    fn is_excluded(&self, de: &DirEntry, src_root: &Path) -> bool {
        if de.depth() == 0 {
            return false;
        }
        let relative = de.path().strip_prefix(src_root).unwrap_or(de.path());
        let text = relative.to_string_lossy();
        let excluded = self.excluded.iter().any(|ex| text.contains(ex.as_str()));
        if excluded {
            tracing::trace!("Skipping {:?}, excluded", de.path());
        }
        excluded
    }

    fn process_dir_entry(
        &self,
        de: DirEntry,
        src_root: &Path,
        dst_root: &Path,
    ) -> Option<Result<FileEntry>> {
        if !de.file_type().is_file() {
            tracing::trace!("Skipping {:?} not a regular file", de.path());
            return None;
        }

        let p = de.into_path();
        let relative = match p.strip_prefix(src_root) {
            Ok(r) => r.to_path_buf(),
            Err(e) => {
                return Some(Err(Error::from(e)
                    .with_msg(format!("Stripping {src_root:?} from {p:?} failed"))))
            }
        };

        if let Some(selector) = &self.selector {
            if !selector.should_include(&relative) {
                tracing::trace!("Skipping {p:?}, no enabled category matches");
                return None;
            }
        }

        let entry = FileEntry {
            dst: dst_root.join(&relative).into(),
            src: p.into(),
        };
        tracing::trace!("Including file: {:?} -> {:?}", entry.src, entry.dst);
        Some(Ok(entry))
    }

    fn copy_file(&self, entry: &FileEntry) -> Result<u64> {
        if let Some(parent) = entry.dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = (self.copier)(&entry.src, &entry.dst)?;
        preserve_modified_time(&entry.src, &entry.dst);
        if self.verify {
            verify_copy(&entry.src, &entry.dst)?;
        }
        Ok(bytes)
    }
}

fn preserve_modified_time(src: &Path, dst: &Path) {
    let res = std::fs::metadata(src)
        .and_then(|md| md.modified())
        .and_then(|mtime| File::options().write(true).open(dst)?.set_modified(mtime));
    if let Err(e) = res {
        tracing::debug!("Could not preserve modification time of {dst:?}: {e}");
    }
}

pub fn sha256_file<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut reader = BufReader::new(File::open(path.as_ref())?);
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

pub fn verify_copy(src: &Path, dst: &Path) -> Result<()> {
    let src_digest = sha256_file(src)?;
    let dst_digest = sha256_file(dst)?;
    if src_digest != dst_digest {
        return Err(Error::VerifyMismatch {
            src: PathBuf::from(src),
            dst: PathBuf::from(dst),
            src_digest,
            dst_digest,
        });
    }
    Ok(())
}
