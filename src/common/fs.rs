//! File system helpers

use std::fs;
use std::path::{Path, PathBuf};

use super::error::{Result, TcConfigError};

/// Check that a path exists and is a regular file
pub fn check_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(TcConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("File not found: {}", path.display()),
        )));
    }

    if !path.is_file() {
        return Err(TcConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Path is not a file: {}", path.display()),
        )));
    }

    Ok(())
}

/// Read a whole file into memory
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    check_file_exists(path)?;

    Ok(fs::read(path)?)
}

/// Directory a document was loaded from, used to resolve relative paths
pub fn source_directory(path: &Path) -> Option<PathBuf> {
    match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Some(PathBuf::from(".")),
        Some(parent) => Some(parent.to_path_buf()),
        None => None,
    }
}

/// Resolve `path` against `base` unless it is already absolute
///
/// A relative `base` is itself resolved against the current directory, so the
/// result is always absolute.
pub fn absolute_path(path: &str, base: &Path) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        return candidate.to_path_buf();
    }

    let mut joined = base.join(candidate);
    if !joined.is_absolute() {
        if let Ok(cwd) = std::env::current_dir() {
            joined = cwd.join(joined);
        }
    }

    // Drops interior `.` components.
    joined.components().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_file_exists() {
        let path = PathBuf::from("Cargo.toml");
        assert!(check_file_exists(&path).is_ok());

        let path = PathBuf::from("non_existent_file.txt");
        assert!(check_file_exists(&path).is_err());
    }

    #[test]
    fn test_read_file() {
        let content = read_file(Path::new("Cargo.toml")).expect("Cargo.toml should be readable");
        assert!(!content.is_empty());

        assert!(read_file(Path::new("non_existent_file.txt")).is_err());
    }

    #[test]
    fn test_source_directory() {
        assert_eq!(source_directory(Path::new("tc-config.xml")), Some(PathBuf::from(".")));
        assert_eq!(
            source_directory(Path::new("/etc/tc/tc-config.xml")),
            Some(PathBuf::from("/etc/tc"))
        );
    }

    #[test]
    fn test_absolute_path() {
        assert_eq!(absolute_path("/var/log/tc", Path::new("/etc")), PathBuf::from("/var/log/tc"));
        assert_eq!(absolute_path("logs", Path::new("/etc/tc")), PathBuf::from("/etc/tc/logs"));

        let relative = absolute_path("logs", Path::new("."));
        assert!(relative.is_absolute());
        assert!(relative.ends_with("logs"));
    }
}
