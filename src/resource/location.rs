use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::archive::BundleArchive;

/// Where an identifier points. Resolving never checks existence; ask the
/// location itself.
#[derive(Clone)]
pub struct Location {
    kind: LocationKind,
}

#[derive(Clone)]
enum LocationKind {
    Filesystem(PathBuf),
    Archive {
        archive: Arc<BundleArchive>,
        entry: String,
    },
}

impl Location {
    pub fn filesystem(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: LocationKind::Filesystem(path.into()),
        }
    }

    pub(crate) fn archive(archive: Arc<BundleArchive>, entry: String) -> Self {
        Self {
            kind: LocationKind::Archive { archive, entry },
        }
    }

    pub fn exists(&self) -> bool {
        match &self.kind {
            LocationKind::Filesystem(path) => path.exists(),
            LocationKind::Archive { archive, entry } => archive.exists(entry),
        }
    }

    pub fn is_file(&self) -> bool {
        match &self.kind {
            LocationKind::Filesystem(path) => path.is_file(),
            LocationKind::Archive { archive, entry } => archive.is_file(entry),
        }
    }

    pub fn is_dir(&self) -> bool {
        match &self.kind {
            LocationKind::Filesystem(path) => path.is_dir(),
            LocationKind::Archive { archive, entry } => archive.is_dir(entry),
        }
    }

    pub fn read(&self) -> io::Result<Vec<u8>> {
        match &self.kind {
            LocationKind::Filesystem(path) => std::fs::read(path),
            LocationKind::Archive { archive, entry } => archive.read(entry),
        }
    }

    pub fn read_to_string(&self) -> io::Result<String> {
        String::from_utf8(self.read()?).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// The on-disk path, for filesystem-backed locations.
    pub fn as_path(&self) -> Option<&Path> {
        match &self.kind {
            LocationKind::Filesystem(path) => Some(path),
            LocationKind::Archive { .. } => None,
        }
    }

    /// The archive path and entry name, for archive-backed locations.
    pub fn archive_entry(&self) -> Option<(&Path, &str)> {
        match &self.kind {
            LocationKind::Filesystem(_) => None,
            LocationKind::Archive { archive, entry } => Some((archive.path(), entry)),
        }
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (LocationKind::Filesystem(a), LocationKind::Filesystem(b)) => a == b,
            (
                LocationKind::Archive {
                    archive: a,
                    entry: ea,
                },
                LocationKind::Archive {
                    archive: b,
                    entry: eb,
                },
            ) => a.path() == b.path() && ea == eb,
            _ => false,
        }
    }
}

impl Eq for Location {}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LocationKind::Filesystem(path) => write!(f, "{}", path.display()),
            LocationKind::Archive { archive, entry } => {
                write!(f, "{}!/{}", archive.path().display(), entry)
            }
        }
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Location").field(&self.to_string()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::helpers::write_archive;
    use tempfile::tempdir;

    #[test]
    fn test_filesystem_location() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("motd.txt");
        std::fs::write(&file, "hi").unwrap();

        let location = Location::filesystem(&file);
        assert!(location.exists());
        assert!(location.is_file());
        assert!(!location.is_dir());
        assert_eq!(location.read_to_string().unwrap(), "hi");
        assert_eq!(location.as_path(), Some(file.as_path()));
        assert!(location.archive_entry().is_none());

        assert!(Location::filesystem(dir.path()).is_dir());
        assert!(!Location::filesystem(dir.path().join("nope")).exists());
    }

    #[test]
    fn test_archive_location() {
        let dir = tempdir().unwrap();
        let path = write_archive(
            &dir.path().join("b.zip"),
            &[("res/demo/motd.txt", b"hello".as_slice())],
        );
        let archive = Arc::new(BundleArchive::open(&path).unwrap());

        let location = Location::archive(Arc::clone(&archive), "res/demo/motd.txt".into());
        assert!(location.is_file());
        assert_eq!(location.read().unwrap(), b"hello");
        assert!(location.as_path().is_none());
        assert!(location.to_string().ends_with("b.zip!/res/demo/motd.txt"));

        let same = Location::archive(archive, "res/demo/motd.txt".into());
        assert_eq!(location, same);
        assert_ne!(location, Location::filesystem("res/demo/motd.txt"));
    }

    #[test]
    fn test_read_to_string_rejects_invalid_utf8() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("blob.bin");
        std::fs::write(&file, [0xff, 0xfe, 0xfd]).unwrap();

        let err = Location::filesystem(&file).read_to_string().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
