//! Project filesystem abstraction.
//!
//! Every path handed to a [`FileSystem`] is project-relative and is
//! normalized through [`paths::normalize`], so no implementation can be
//! tricked into touching anything outside the project root.

use crate::error::{BlueprintError, Result};
use crate::paths;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

pub trait FileSystem {
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Write `data` to `path`, creating parent directories. Implementations
    /// write atomically where the backing store allows it.
    fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    fn create_dir_all(&self, path: &str) -> Result<()>;

    fn exists(&self, path: &str) -> bool;

    fn is_dir(&self, path: &str) -> bool;

    fn remove_file(&self, path: &str) -> Result<()>;

    /// All regular files under `dir`, project-relative and sorted.
    fn walk(&self, dir: &str) -> Result<Vec<String>>;

    /// Read a file, mapping "not found" to `None`.
    fn read_optional(&self, path: &str) -> Result<Option<Vec<u8>>> {
        if !self.exists(path) || self.is_dir(path) {
            return Ok(None);
        }
        self.read(path).map(Some)
    }

    fn read_to_string(&self, path: &str) -> Result<String> {
        let data = self.read(path)?;
        String::from_utf8(data).map_err(|e| {
            BlueprintError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })
    }
}

fn not_found(path: &str) -> BlueprintError {
    BlueprintError::io(
        path,
        std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
    )
}

// ---------------------------------------------------------------------------
// OsFs
// ---------------------------------------------------------------------------

/// The real filesystem, rooted at the project directory.
#[derive(Debug, Clone)]
pub struct OsFs {
    root: PathBuf,
}

impl OsFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = paths::normalize(path)?;
        if rel.is_empty() {
            return Ok(self.root.clone());
        }
        Ok(self.root.join(rel))
    }
}

impl FileSystem for OsFs {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        std::fs::read(&full).map_err(|e| BlueprintError::io(full, e))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(BlueprintError::PathEscape(path.to_string()));
        }
        let dir = full.parent().unwrap_or(&self.root).to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| BlueprintError::io(&dir, e))?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| BlueprintError::io(&dir, e))?;
        tmp.write_all(data)
            .map_err(|e| BlueprintError::io(&full, e))?;
        tmp.persist(&full)
            .map_err(|e| BlueprintError::io(&full, e.error))?;
        Ok(())
    }

    fn create_dir_all(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        std::fs::create_dir_all(&full).map_err(|e| BlueprintError::io(full, e))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.exists()).unwrap_or(false)
    }

    fn is_dir(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_dir()).unwrap_or(false)
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        std::fs::remove_file(&full).map_err(|e| BlueprintError::io(full, e))
    }

    fn walk(&self, dir: &str) -> Result<Vec<String>> {
        let base = self.resolve(dir)?;
        if !base.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&base) {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| base.clone());
                BlueprintError::io(path, std::io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                let parts: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                files.push(parts.join("/"));
            }
        }
        files.sort();
        Ok(files)
    }
}

// ---------------------------------------------------------------------------
// MemFs
// ---------------------------------------------------------------------------

/// In-memory filesystem for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemFs {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    dirs: Mutex<BTreeSet<String>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for test setup: write a file, panicking on a bad path.
    pub fn with_file(self, path: &str, data: impl AsRef<[u8]>) -> Self {
        if let Err(e) = self.write(path, data.as_ref()) {
            panic!("MemFs::with_file({path}): {e}");
        }
        self
    }

    pub fn with_dir(self, path: &str) -> Self {
        if let Err(e) = self.create_dir_all(path) {
            panic!("MemFs::with_dir({path}): {e}");
        }
        self
    }

    /// Every file currently stored, sorted by path.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.files.lock().map(|f| f.clone()).unwrap_or_default()
    }

    fn add_ancestors(&self, rel: &str) {
        if let Ok(mut dirs) = self.dirs.lock() {
            let mut current = String::new();
            let segments: Vec<&str> = rel.split('/').collect();
            for seg in &segments[..segments.len().saturating_sub(1)] {
                if !current.is_empty() {
                    current.push('/');
                }
                current.push_str(seg);
                dirs.insert(current.clone());
            }
        }
    }
}

impl FileSystem for MemFs {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let rel = paths::normalize(path)?;
        self.files
            .lock()
            .ok()
            .and_then(|f| f.get(&rel).cloned())
            .ok_or_else(|| not_found(path))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let rel = paths::normalize(path)?;
        if rel.is_empty() {
            return Err(BlueprintError::PathEscape(path.to_string()));
        }
        self.add_ancestors(&rel);
        let mut files = self
            .files
            .lock()
            .map_err(|_| BlueprintError::Internal("MemFs lock poisoned".into()))?;
        files.insert(rel, data.to_vec());
        Ok(())
    }

    fn create_dir_all(&self, path: &str) -> Result<()> {
        let rel = paths::normalize(path)?;
        if rel.is_empty() {
            return Ok(());
        }
        self.add_ancestors(&rel);
        if let Ok(mut dirs) = self.dirs.lock() {
            dirs.insert(rel);
        }
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        let Ok(rel) = paths::normalize(path) else {
            return false;
        };
        self.files.lock().map(|f| f.contains_key(&rel)).unwrap_or(false) || self.is_dir(path)
    }

    fn is_dir(&self, path: &str) -> bool {
        let Ok(rel) = paths::normalize(path) else {
            return false;
        };
        if rel.is_empty() {
            return true;
        }
        self.dirs.lock().map(|d| d.contains(&rel)).unwrap_or(false)
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        let rel = paths::normalize(path)?;
        let mut files = self
            .files
            .lock()
            .map_err(|_| BlueprintError::Internal("MemFs lock poisoned".into()))?;
        files.remove(&rel).map(|_| ()).ok_or_else(|| not_found(path))
    }

    fn walk(&self, dir: &str) -> Result<Vec<String>> {
        let rel = paths::normalize(dir)?;
        let prefix = if rel.is_empty() {
            String::new()
        } else {
            format!("{rel}/")
        };
        let files = self
            .files
            .lock()
            .map_err(|_| BlueprintError::Internal("MemFs lock poisoned".into()))?;
        Ok(files
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn os_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let fs = OsFs::new(dir.path());
        fs.write("a/b/c/test.yaml", b"data").unwrap();
        assert!(dir.path().join("a/b/c/test.yaml").exists());
        assert_eq!(fs.read("a/b/c/test.yaml").unwrap(), b"data");
    }

    #[test]
    fn os_write_overwrites() {
        let dir = TempDir::new().unwrap();
        let fs = OsFs::new(dir.path());
        fs.write("x.txt", b"one").unwrap();
        fs.write("x.txt", b"two").unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("x.txt")).unwrap(), "two");
    }

    #[test]
    fn os_rejects_escape() {
        let dir = TempDir::new().unwrap();
        let fs = OsFs::new(dir.path().join("project"));
        let err = fs.write("../evil.txt", b"x").unwrap_err();
        assert!(matches!(err, BlueprintError::PathEscape(_)));
        assert!(!dir.path().join("evil.txt").exists());
    }

    #[test]
    fn os_walk_lists_relative_sorted() {
        let dir = TempDir::new().unwrap();
        let fs = OsFs::new(dir.path());
        fs.write("b/two.txt", b"2").unwrap();
        fs.write("a/one.txt", b"1").unwrap();
        assert_eq!(fs.walk(".").unwrap(), vec!["a/one.txt", "b/two.txt"]);
        assert_eq!(fs.walk("b").unwrap(), vec!["b/two.txt"]);
    }

    #[test]
    fn os_read_optional_missing() {
        let dir = TempDir::new().unwrap();
        let fs = OsFs::new(dir.path());
        assert!(fs.read_optional("missing.json").unwrap().is_none());
    }

    #[test]
    fn mem_tracks_directories() {
        let fs = MemFs::new().with_file("apps/web/package.json", "{}");
        assert!(fs.is_dir("apps"));
        assert!(fs.is_dir("apps/web"));
        assert!(!fs.is_dir("apps/web/package.json"));
        assert!(fs.exists("apps/web/package.json"));
        assert!(fs.is_dir("."));
    }

    #[test]
    fn mem_remove_and_walk() {
        let fs = MemFs::new()
            .with_file("a.txt", "a")
            .with_file("dir/b.txt", "b");
        assert_eq!(fs.walk("").unwrap(), vec!["a.txt", "dir/b.txt"]);
        fs.remove_file("a.txt").unwrap();
        assert!(!fs.exists("a.txt"));
        assert!(fs.remove_file("a.txt").is_err());
    }

    #[test]
    fn mem_rejects_escape() {
        let fs = MemFs::new();
        assert!(matches!(
            fs.write("../x", b"x"),
            Err(BlueprintError::PathEscape(_))
        ));
    }
}
