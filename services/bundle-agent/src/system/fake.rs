//! In-memory filesystem for tests.
//!
//! Paths are stored as absolute keys in a sorted map. Each entry carries the
//! mode and owner applied to it so tests can assert on them. Any operation
//! can be made to fail with [`FakeFileSystem::fail`], or only below one path
//! with [`FakeFileSystem::fail_at`]. A failing copy leaves the destination
//! directory behind, as an interrupted copy would.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{FileKind, FileSystem, Ownership};

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    CreateDirAll,
    Rename,
    CopyDirRecursive,
    RemoveAll,
    SetPermissions,
    Chown,
    Symlink,
}

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
    Symlink(PathBuf),
}

#[derive(Debug, Clone)]
struct Entry {
    node: Node,
    mode: u32,
    owner: Option<Ownership>,
}

impl Entry {
    fn dir() -> Self {
        Self {
            node: Node::Dir,
            mode: 0o755,
            owner: None,
        }
    }

    fn kind(&self) -> FileKind {
        match self.node {
            Node::Dir => FileKind::Dir,
            Node::File(_) => FileKind::File,
            Node::Symlink(_) => FileKind::Symlink,
        }
    }
}

/// Snapshot of an entry's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeStat {
    pub kind: FileKind,
    pub mode: u32,
    pub owner: Option<Ownership>,
}

#[derive(Debug)]
struct Failure {
    message: String,
    path: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<PathBuf, Entry>,
    failures: HashMap<FakeOp, Failure>,
    calls: HashMap<FakeOp, usize>,
}

impl State {
    fn record(&mut self, op: FakeOp, path: &Path) -> io::Result<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        match self.failures.get(&op) {
            Some(failure) if failure.path.as_ref().is_none_or(|p| path.starts_with(p)) => {
                Err(io::Error::other(failure.message.clone()))
            }
            _ => Ok(()),
        }
    }

    fn get(&self, path: &Path) -> Option<&Entry> {
        self.entries.get(path)
    }

    fn require_dir(&self, path: &Path) -> io::Result<()> {
        match self.get(path) {
            Some(entry) if matches!(entry.node, Node::Dir) => Ok(()),
            Some(_) => Err(not_a_directory(path)),
            None => Err(not_found(path)),
        }
    }

    fn require_parent(&self, path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self.require_dir(parent),
            _ => Ok(()),
        }
    }

    fn mkdir_p(&mut self, path: &Path) -> io::Result<()> {
        for ancestor in path.ancestors().collect::<Vec<_>>().into_iter().rev() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            match self.get(ancestor) {
                Some(entry) if matches!(entry.node, Node::Dir) => {}
                Some(_) => return Err(not_a_directory(ancestor)),
                None => {
                    self.entries.insert(ancestor.to_path_buf(), Entry::dir());
                }
            }
        }
        Ok(())
    }

    fn has_children(&self, path: &Path) -> bool {
        self.entries
            .keys()
            .any(|key| key != path && key.starts_with(path))
    }

    /// The entry at `path` and everything below it, keyed relative to `path`.
    fn subtree(&self, path: &Path) -> Vec<(PathBuf, Entry)> {
        self.entries
            .iter()
            .filter_map(|(key, entry)| {
                key.strip_prefix(path)
                    .ok()
                    .map(|rel| (rel.to_path_buf(), entry.clone()))
            })
            .collect()
    }

    fn remove_subtree(&mut self, path: &Path) {
        self.entries.retain(|key, _| !key.starts_with(path));
    }
}

/// In-memory [`FileSystem`] for tests.
#[derive(Debug, Default)]
pub struct FakeFileSystem {
    state: Mutex<State>,
}

impl FakeFileSystem {
    /// Create an empty filesystem containing only `/`.
    pub fn new() -> Self {
        let fs = Self::default();
        fs.lock().entries.insert(PathBuf::from("/"), Entry::dir());
        fs
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every later call to `op` fail with `message`.
    pub fn fail(&self, op: FakeOp, message: &str) {
        self.lock().failures.insert(
            op,
            Failure {
                message: message.to_string(),
                path: None,
            },
        );
    }

    /// Make later calls to `op` fail with `message` when they act on `path`
    /// or anything below it. For `rename` and copies this is the source path.
    pub fn fail_at(&self, op: FakeOp, path: impl AsRef<Path>, message: &str) {
        self.lock().failures.insert(
            op,
            Failure {
                message: message.to_string(),
                path: Some(path.as_ref().to_path_buf()),
            },
        );
    }

    pub fn clear_failure(&self, op: FakeOp) {
        self.lock().failures.remove(&op);
    }

    /// Number of times `op` has been called, including failed calls.
    pub fn calls(&self, op: FakeOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Write a file, creating parent directories.
    pub fn write_file(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> io::Result<()> {
        let path = path.as_ref();
        let mut state = self.lock();
        if let Some(parent) = path.parent() {
            state.mkdir_p(parent)?;
        }
        if let Some(Entry {
            node: Node::Dir, ..
        }) = state.get(path)
        {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{} is a directory", path.display()),
            ));
        }
        state.entries.insert(
            path.to_path_buf(),
            Entry {
                node: Node::File(contents.as_ref().to_vec()),
                mode: 0o644,
                owner: None,
            },
        );
        Ok(())
    }

    pub fn read_file(&self, path: impl AsRef<Path>) -> io::Result<Vec<u8>> {
        let path = path.as_ref();
        match self.lock().get(path) {
            Some(Entry {
                node: Node::File(contents),
                ..
            }) => Ok(contents.clone()),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a file", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    pub fn read_file_string(&self, path: impl AsRef<Path>) -> io::Result<String> {
        let bytes = self.read_file(path)?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn stat(&self, path: impl AsRef<Path>) -> Option<FakeStat> {
        self.lock().get(path.as_ref()).map(|entry| FakeStat {
            kind: entry.kind(),
            mode: entry.mode,
            owner: entry.owner.clone(),
        })
    }
}

impl FileSystem for FakeFileSystem {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        state.record(FakeOp::CreateDirAll, path)?;
        state.mkdir_p(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.lock();
        state.record(FakeOp::Rename, from)?;

        let source_kind = state.get(from).ok_or_else(|| not_found(from))?.kind();
        state.require_parent(to)?;

        if let Some(existing) = state.get(to) {
            match (source_kind, existing.kind()) {
                (FileKind::Dir, FileKind::Dir) if state.has_children(to) => {
                    return Err(io::Error::new(
                        io::ErrorKind::DirectoryNotEmpty,
                        format!("{} is not empty", to.display()),
                    ));
                }
                (FileKind::Dir, FileKind::Dir) => {}
                (FileKind::Dir, _) => return Err(not_a_directory(to)),
                (_, FileKind::Dir) => {
                    return Err(io::Error::new(
                        io::ErrorKind::IsADirectory,
                        format!("{} is a directory", to.display()),
                    ));
                }
                _ => {}
            }
            state.remove_subtree(to);
        }

        let moved = state.subtree(from);
        state.remove_subtree(from);
        for (rel, entry) in moved {
            state.entries.insert(join_rel(to, &rel), entry);
        }
        Ok(())
    }

    fn copy_dir_recursive(&self, src: &Path, dst: &Path) -> io::Result<()> {
        let mut state = self.lock();
        let injected = state.record(FakeOp::CopyDirRecursive, src);

        state.require_dir(src)?;
        state.mkdir_p(dst)?;
        injected?;

        for (rel, entry) in state.subtree(src) {
            state.entries.insert(join_rel(dst, &rel), entry);
        }
        Ok(())
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        state.record(FakeOp::RemoveAll, path)?;
        state.remove_subtree(path);
        Ok(())
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut state = self.lock();
        state.record(FakeOp::SetPermissions, path)?;
        let entry = state
            .entries
            .get_mut(path)
            .ok_or_else(|| not_found(path))?;
        entry.mode = mode;
        Ok(())
    }

    fn chown(&self, path: &Path, owner: &Ownership) -> io::Result<()> {
        let mut state = self.lock();
        state.record(FakeOp::Chown, path)?;
        let entry = state
            .entries
            .get_mut(path)
            .ok_or_else(|| not_found(path))?;
        entry.owner = Some(owner.clone());
        Ok(())
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        let mut state = self.lock();
        state.record(FakeOp::Symlink, link)?;
        state.require_parent(link)?;
        if state.get(link).is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", link.display()),
            ));
        }
        state.entries.insert(
            link.to_path_buf(),
            Entry {
                node: Node::Symlink(target.to_path_buf()),
                mode: 0o777,
                owner: None,
            },
        );
        Ok(())
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        match self.lock().get(path) {
            Some(Entry {
                node: Node::Symlink(target),
                ..
            }) => Ok(target.clone()),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a symlink", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn read_dir_names(&self, path: &Path) -> io::Result<Vec<String>> {
        let state = self.lock();
        state.require_dir(path)?;
        Ok(state
            .entries
            .keys()
            .filter(|key| key.parent() == Some(path))
            .filter_map(|key| key.file_name().and_then(|n| n.to_str()))
            .map(str::to_string)
            .collect())
    }

    fn file_kind(&self, path: &Path) -> io::Result<Option<FileKind>> {
        Ok(self.lock().get(path).map(Entry::kind))
    }
}

fn join_rel(base: &Path, rel: &Path) -> PathBuf {
    if rel.as_os_str().is_empty() {
        base.to_path_buf()
    } else {
        base.join(rel)
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} does not exist", path.display()),
    )
}

fn not_a_directory(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotADirectory,
        format!("{} is not a directory", path.display()),
    )
}
