//! Validation functions for user supplied paths and identifiers.

use sanitize_filename::{is_sanitized, sanitize};
use validator::ValidationError;

use std::path::Path;

/// Application ids become directory names inside a backup instance.
pub fn validate_application_id<S: AsRef<str>>(id: S) -> Result<(), ValidationError> {
    let id = id.as_ref();
    if id.is_empty() || !is_sanitized(id) || id.starts_with('.') {
        return Err(ValidationError::new("InvalidApplicationId").with_message(
            format!("Invalid application id {id:?}, try sanitizing like {:?}", sanitize(id)).into(),
        ));
    }

    Ok(())
}

pub fn validate_dir_exist<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("{:?} not found", dir).into()));
    }

    Ok(())
}

pub fn validate_dir_exist_or_created<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        return validate_dir_exist(dir);
    }
    std::fs::create_dir_all(dir).map_err(|e| {
        ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot create or access directory {:?}: {}", dir, e).into())
    })
}

pub fn validate_writable_dir<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    validate_dir_exist_or_created(dir)?;
    let md = std::fs::metadata(dir).map_err(|e| {
        ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot access metadata for {:?}: {}", dir, e).into())
    })?;
    if md.permissions().readonly() {
        Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot write to dir {:?}", dir).into()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_application_id() {
        assert!(validate_application_id("chrome").is_ok());
        assert!(validate_application_id("opera-gx").is_ok());
        assert!(validate_application_id("").is_err());
        assert!(validate_application_id("../etc").is_err());
        assert!(validate_application_id("a/b").is_err());
        assert!(validate_application_id(".git").is_err());
    }

    #[test]
    fn test_dir_exist() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, "x").unwrap();
        assert!(validate_dir_exist(dir.path()).is_ok());
        assert!(validate_dir_exist(&file).is_err());
        assert!(validate_dir_exist(dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_dir_created() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b/c");
        assert!(validate_writable_dir(&nested).is_ok());
        assert!(nested.is_dir());

        let file = dir.path().join("file");
        std::fs::write(&file, "x").unwrap();
        assert!(validate_dir_exist_or_created(&file).is_err());
    }
}
