//! Single-file bundle archives and the provider that serves their `res/` tree.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use zip::ZipArchive;
use zip::result::ZipError;

use super::{Location, ResourceError, ResourceProvider};
use crate::identifier::Identifier;

pub const RESOURCE_ROOT: &str = "res";

/// Upper bound on the buffer reserved from an entry's declared size.
const MAX_PREALLOC: u64 = 1024 * 1024;

/// A read-only view of a zip archive.
///
/// Entry names are indexed once when the archive is opened; existence checks
/// never touch the file again. Directories are derived from entry prefixes, so
/// archives written without explicit directory entries still answer `is_dir`.
pub struct BundleArchive {
    path: PathBuf,
    files: BTreeSet<String>,
    dirs: BTreeSet<String>,
    reader: Mutex<ZipArchive<File>>,
}

impl BundleArchive {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ResourceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let archive = ZipArchive::new(file).map_err(|e| ResourceError::Archive {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let mut files = BTreeSet::new();
        let mut dirs = BTreeSet::new();
        for name in archive.file_names() {
            let trimmed = name.trim_end_matches('/');
            if trimmed.is_empty() {
                continue;
            }
            if name.ends_with('/') {
                dirs.insert(trimmed.to_string());
            } else {
                files.insert(trimmed.to_string());
            }
            let mut parent = trimmed;
            while let Some((prefix, _)) = parent.rsplit_once('/') {
                dirs.insert(prefix.to_string());
                parent = prefix;
            }
        }

        Ok(Self {
            path,
            files,
            dirs,
            reader: Mutex::new(archive),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_file(&self, entry: &str) -> bool {
        self.files.contains(entry.trim_end_matches('/'))
    }

    pub fn is_dir(&self, entry: &str) -> bool {
        self.dirs.contains(entry.trim_end_matches('/'))
    }

    pub fn exists(&self, entry: &str) -> bool {
        self.is_file(entry) || self.is_dir(entry)
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }

    pub fn read(&self, entry: &str) -> io::Result<Vec<u8>> {
        let mut archive = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = archive.by_name(entry).map_err(|e| match e {
            ZipError::FileNotFound => io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} has no entry '{}'", self.path.display(), entry),
            ),
            ZipError::Io(err) => err,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        })?;
        let mut buf = Vec::with_capacity(file.size().min(MAX_PREALLOC) as usize);
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl fmt::Debug for BundleArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleArchive")
            .field("path", &self.path)
            .field("files", &self.files.len())
            .finish()
    }
}

/// Serves one namespace out of an archive's `res/` subtree.
#[derive(Debug, Clone)]
pub struct ArchiveResourceProvider {
    namespace: String,
    archive: Arc<BundleArchive>,
}

impl ArchiveResourceProvider {
    pub fn new(namespace: impl Into<String>, archive: Arc<BundleArchive>) -> Self {
        Self {
            namespace: namespace.into(),
            archive,
        }
    }

    /// Builds a provider from the location the calling code was loaded from.
    ///
    /// Only single-file archives are supported; an unpacked directory tree
    /// yields [`ResourceError::UnsupportedLayout`].
    pub fn of(
        namespace: impl Into<String>,
        code_source: impl AsRef<Path>,
    ) -> Result<Self, ResourceError> {
        let code_source = code_source.as_ref();
        let metadata = std::fs::metadata(code_source)?;
        if !metadata.is_file() {
            return Err(ResourceError::UnsupportedLayout {
                path: code_source.to_path_buf(),
            });
        }
        let archive = BundleArchive::open(code_source)?;
        Ok(Self::new(namespace, Arc::new(archive)))
    }

    pub fn archive(&self) -> &Arc<BundleArchive> {
        &self.archive
    }
}

impl ResourceProvider for ArchiveResourceProvider {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn resolve(&self, identifier: &Identifier) -> Location {
        let entry = format!(
            "{}/{}/{}",
            RESOURCE_ROOT,
            identifier.namespace(),
            identifier.path()
        );
        Location::archive(Arc::clone(&self.archive), entry)
    }
}
