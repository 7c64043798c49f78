use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use itertools::Itertools;
use std::fmt::Debug;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    InvalidValue(#[from] validator::ValidationError),
    #[error(transparent)]
    ThreadPoolBuildError(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    StripPrefix(#[from] std::path::StripPrefixError),
    #[error(transparent)]
    Persist(#[from] tempfile::PersistError),
    #[error("Copy verification failed for {src:?} -> {dst:?}: sha256 {src_digest} != {dst_digest}")]
    VerifyMismatch {
        src: PathBuf,
        dst: PathBuf,
        src_digest: String,
        dst_digest: String,
    },
    #[error("Worker for {0:?} panicked: {1}")]
    TaskPanicked(String, String),
    #[error("No known destination to restore {0:?} into")]
    NoRestoreTarget(String),
    #[error("Backup source {0:?} is not a directory")]
    MissingBackupSource(PathBuf),
    #[error("No backup instance found under {0:?}")]
    NoBackupInstance(PathBuf),
    #[error("No applications selected for restore from {instance:?} (requested: {requested})")]
    NothingToRestore { instance: PathBuf, requested: String },
    #[error("Logging initialisation failed: {0}")]
    LoggingInit(String),
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error(
        "{:?} {} failed:\n{}",
        obj_debug,
        fn_name,
        indent::indent_all_with("  ", error.to_string())
    )]
    WithDebugObjAndFnName {
        error: Box<Error>,
        obj_debug: Box<dyn Debug + Send>,
        fn_name: String,
    },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>, O: Debug + Send + 'static> WithDebugObjectAndFnName<S, O> for Error {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        Error::WithDebugObjAndFnName {
            error: Box::new(self),
            obj_debug: Box::new(obj),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl From<Vec<Error>> for Error {
    fn from(errors: Vec<Error>) -> Self {
        if errors.is_empty() {
            panic!("Should not create lots of errors when error is empty")
        }
        Self::LotsOfError(errors.into_iter().flat_map(|e| e.into_iter()).collect_vec())
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(|e| e.into_iter())),
            e => Box::new(std::iter::once(e)),
        }
    }

    /// True for a verification mismatch, also when wrapped in context.
    pub fn is_verify_mismatch(&self) -> bool {
        match self {
            Error::VerifyMismatch { .. } => true,
            Error::WithMsg { error, .. } | Error::WithDebugObjAndFnName { error, .. } => {
                error.is_verify_mismatch()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found(msg: &str) -> Error {
        Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, msg.to_string()))
    }

    #[test]
    fn test_error_from_io_error() {
        match not_found("file not found") {
            Error::Io(_) => (),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_with_msg() {
        match not_found("file not found").with_msg("Custom message") {
            Error::WithMsg { msg, .. } => assert_eq!(msg, "Custom message"),
            _ => panic!("Expected WithMsg error"),
        }
    }

    #[test]
    fn test_error_with_debug_object_and_fn_name() {
        let error =
            not_found("file not found").with_debug_object_and_fn_name("chrome", "copy_tree");
        match error {
            Error::WithDebugObjAndFnName { fn_name, .. } => assert_eq!(fn_name, "copy_tree"),
            _ => panic!("Expected WithDebugObjAndFnName error"),
        }
    }

    #[test]
    fn test_error_from_vec_flattens() {
        let nested = Error::from(vec![not_found("a"), not_found("b")]);
        let combined = Error::from(vec![nested, not_found("c")]);
        match combined {
            Error::LotsOfError(errors) => assert_eq!(errors.len(), 3),
            _ => panic!("Expected LotsOfError"),
        }
    }

    #[test]
    #[should_panic(expected = "Should not create lots of errors when error is empty")]
    fn test_error_from_empty_vec_panics() {
        let _error = Error::from(Vec::<Error>::new());
    }

    #[test]
    fn test_verify_mismatch_display_and_detection() {
        let error = Error::VerifyMismatch {
            src: PathBuf::from("/src/Bookmarks"),
            dst: PathBuf::from("/dst/Bookmarks"),
            src_digest: "aa".into(),
            dst_digest: "bb".into(),
        };
        let wrapped = error.with_msg("Copying chrome");
        assert!(wrapped.is_verify_mismatch());
        let text = wrapped.to_string();
        assert!(text.contains("Copying chrome"));
        assert!(text.contains("aa != bb"));
        assert!(!not_found("x").is_verify_mismatch());
    }

    #[test]
    fn test_error_with_msg_display_is_indented() {
        let text = not_found("file not found").with_msg("Operation failed").to_string();
        assert!(text.starts_with("Operation failed:\n  "));
        assert!(text.contains("file not found"));
    }
}
