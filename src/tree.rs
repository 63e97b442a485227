use super::{
    git_object::{commit::Commit, GitObject, Mode, ObjectKind, ObjectStore, TreeNode, TreeRecords},
    Error, Result, Sha1Hash, GIT_DIR,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Moves a working directory in and out of the object store.
#[derive(Debug)]
pub struct FileTree<'a> {
    root_dir: PathBuf,
    store: &'a ObjectStore,
}

impl<'a> FileTree<'a> {
    pub fn new<P: AsRef<Path>>(root_dir: P, store: &'a ObjectStore) -> Self {
        Self {
            root_dir: root_dir.as_ref().into(),
            store,
        }
    }

    /// Checks out `commit` and returns the number of files written.
    pub fn checkout(&self, commit: &Sha1Hash) -> Result<usize> {
        let object = self.store.load(commit)?;
        let commit = Commit::try_from(&object)?;
        debug!(tree = %commit.tree(), "checking out tree");
        self.checkout_tree(&commit.tree(), &self.root_dir)
    }

    fn checkout_tree(&self, hash: &Sha1Hash, dir: &Path) -> Result<usize> {
        let tree = self.load_kind(hash, ObjectKind::Tree)?;
        fs::create_dir_all(dir)?;

        let mut written = 0;
        for node in TreeRecords::new(tree.content()) {
            let node = node?;
            let path = dir.join(safe_name(node.name())?);

            match node.mode() {
                Mode::Directory => written += self.checkout_tree(&node.hash(), &path)?,
                Mode::File | Mode::Executable => {
                    let blob = self.load_kind(&node.hash(), ObjectKind::Blob)?;
                    fs::write(&path, blob.content())?;
                    if node.mode() == Mode::Executable {
                        set_executable(&path)?;
                    }
                    written += 1;
                }
                Mode::Symlink => {
                    let blob = self.load_kind(&node.hash(), ObjectKind::Blob)?;
                    write_symlink(blob.content(), &path)?;
                    written += 1;
                }
                Mode::Submodule => {
                    warn!(path = %path.display(), "submodule left empty");
                    fs::create_dir_all(&path)?;
                }
            }
        }

        Ok(written)
    }

    /// Stores the working directory as blobs and trees, skipping `.git`, and
    /// returns the root tree's hash. Empty directories are left out.
    pub fn write_tree(&self) -> Result<Sha1Hash> {
        match self.snapshot_dir(&self.root_dir)? {
            Some(hash) => Ok(hash),
            None => self
                .store
                .persist(&GitObject::new(ObjectKind::Tree, Vec::new())),
        }
    }

    fn snapshot_dir(&self, dir: &Path) -> Result<Option<Sha1Hash>> {
        let mut nodes = vec![];

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().into_string().map_err(|name| {
                Error::format(format!("file name {name:?} is not valid UTF-8"))
            })?;
            if name == GIT_DIR {
                continue;
            }

            let path = entry.path();
            let file_type = entry.file_type()?;
            let (mode, hash) = if file_type.is_dir() {
                match self.snapshot_dir(&path)? {
                    Some(hash) => (Mode::Directory, hash),
                    None => continue,
                }
            } else if file_type.is_symlink() {
                let target = fs::read_link(&path)?;
                let blob = GitObject::new(
                    ObjectKind::Blob,
                    target.to_string_lossy().into_owned().into_bytes(),
                );
                (Mode::Symlink, self.store.persist(&blob)?)
            } else {
                let blob = GitObject::new_blob(fs::File::open(&path)?)?;
                (file_mode(&entry.metadata()?), self.store.persist(&blob)?)
            };
            nodes.push(TreeNode::from_parts(mode, name, hash));
        }

        if nodes.is_empty() {
            return Ok(None);
        }

        nodes.sort_by_key(TreeNode::sort_key);
        let content: Vec<u8> = nodes.iter().flat_map(TreeNode::to_bytes).collect();
        let hash = self
            .store
            .persist(&GitObject::new(ObjectKind::Tree, content))?;
        debug!(dir = %dir.display(), entries = nodes.len(), %hash, "wrote tree");
        Ok(Some(hash))
    }

    fn load_kind(&self, hash: &Sha1Hash, kind: ObjectKind) -> Result<GitObject> {
        let object = self.store.load(hash)?;
        if object.kind() != kind {
            return Err(Error::format(format!(
                "{hash} is a {}, expected a {kind}",
                object.kind()
            )));
        }
        Ok(object)
    }
}

/// Tree entry names must stay inside their directory.
fn safe_name(name: &str) -> Result<&str> {
    let unsafe_name = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.eq_ignore_ascii_case(GIT_DIR);
    if unsafe_name {
        Err(Error::format(format!("refusing to check out entry {name:?}")))
    } else {
        Ok(name)
    }
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> Mode {
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o111 != 0 {
        Mode::Executable
    } else {
        Mode::File
    }
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> Mode {
    Mode::File
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn write_symlink(target: &[u8], path: &Path) -> Result<()> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    std::os::unix::fs::symlink(OsStr::from_bytes(target), path)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_symlink(target: &[u8], path: &Path) -> Result<()> {
    fs::write(path, target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_entry(mode: &str, name: &str, hash: &Sha1Hash) -> Vec<u8> {
        [
            format!("{mode} {name}\0").as_bytes(),
            hash.as_bytes(),
        ]
        .concat()
    }

    fn persist(store: &ObjectStore, kind: ObjectKind, content: Vec<u8>) -> Sha1Hash {
        store.persist(&GitObject::new(kind, content)).unwrap()
    }

    fn commit_of(store: &ObjectStore, tree: &Sha1Hash) -> Sha1Hash {
        let content = format!("tree {tree}\nauthor A <a@b> 0 +0000\n\ninitial\n");
        persist(store, ObjectKind::Commit, content.into_bytes())
    }

    #[test]
    fn it_checks_out_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path().join(".git/objects"));

        let readme = persist(&store, ObjectKind::Blob, b"hello\n".to_vec());
        let script = persist(&store, ObjectKind::Blob, b"#!/bin/sh\necho hi\n".to_vec());
        let inner = persist(&store, ObjectKind::Tree, tree_entry("100755", "run.sh", &script));
        let root = persist(
            &store,
            ObjectKind::Tree,
            [
                tree_entry("100644", "README", &readme),
                tree_entry("40000", "bin", &inner),
            ]
            .concat(),
        );
        let commit = commit_of(&store, &root);

        let written = FileTree::new(dir.path(), &store).checkout(&commit).unwrap();

        assert_eq!(written, 2);
        assert_eq!(fs::read(dir.path().join("README")).unwrap(), b"hello\n");
        assert_eq!(
            fs::read(dir.path().join("bin/run.sh")).unwrap(),
            b"#!/bin/sh\necho hi\n"
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dir.path().join("bin/run.sh"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[cfg(unix)]
    #[test]
    fn it_checks_out_symlinks_and_submodules() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path().join(".git/objects"));

        let target = persist(&store, ObjectKind::Blob, b"README".to_vec());
        let gitlink = Sha1Hash::from([3; 20]);
        let root = persist(
            &store,
            ObjectKind::Tree,
            [
                tree_entry("120000", "link", &target),
                tree_entry("160000", "vendor", &gitlink),
            ]
            .concat(),
        );
        let commit = commit_of(&store, &root);

        FileTree::new(dir.path(), &store).checkout(&commit).unwrap();

        assert_eq!(
            fs::read_link(dir.path().join("link")).unwrap(),
            PathBuf::from("README")
        );
        assert!(dir.path().join("vendor").is_dir());
    }

    #[test]
    fn it_rejects_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path().join(".git/objects"));
        let blob = persist(&store, ObjectKind::Blob, b"x".to_vec());

        for name in ["..", ".git", ".GIT"] {
            let root = persist(&store, ObjectKind::Tree, tree_entry("100644", name, &blob));
            let commit = commit_of(&store, &root);
            let result = FileTree::new(dir.path(), &store).checkout(&commit);
            assert!(matches!(result, Err(Error::Format(_))), "{name}");
        }
    }

    #[test]
    fn it_fails_on_missing_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path().join(".git/objects"));
        let root = persist(
            &store,
            ObjectKind::Tree,
            tree_entry("100644", "gone", &Sha1Hash::from([9; 20])),
        );
        let commit = commit_of(&store, &root);

        let result = FileTree::new(dir.path(), &store).checkout(&commit);
        assert!(matches!(result, Err(Error::ObjectNotFound(_))));
    }

    #[test]
    fn it_rejects_non_commit_target() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path().join(".git/objects"));
        let blob = persist(&store, ObjectKind::Blob, b"x".to_vec());
        assert!(FileTree::new(dir.path(), &store).checkout(&blob).is_err());
    }

    #[test]
    fn it_writes_tree_of_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path().join(".git/objects"));
        fs::write(dir.path().join("README"), b"hello\n").unwrap();
        fs::create_dir_all(dir.path().join("src/empty")).unwrap();
        fs::write(dir.path().join("src/main.rs"), b"fn main() {}\n").unwrap();

        let tree = FileTree::new(dir.path(), &store);
        let hash = tree.write_tree().unwrap();

        let root = store.load(&hash).unwrap();
        let nodes: Vec<TreeNode> = TreeRecords::new(root.content())
            .collect::<Result<_>>()
            .unwrap();
        let names: Vec<&str> = nodes.iter().map(TreeNode::name).collect();
        assert_eq!(names, ["README", "src"]);
        assert_eq!(nodes[1].mode(), Mode::Directory);

        let readme = GitObject::new(ObjectKind::Blob, b"hello\n".to_vec());
        assert_eq!(nodes[0].hash(), readme.hash());

        // same content, same hash
        assert_eq!(tree.write_tree().unwrap(), hash);
    }

    #[test]
    fn it_round_trips_checkout_and_write_tree() {
        let src = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(src.path().join(".git/objects"));
        fs::create_dir_all(src.path().join("a/b")).unwrap();
        fs::write(src.path().join("a/b/c.txt"), b"deep").unwrap();
        fs::write(src.path().join("top"), b"top").unwrap();

        let tree = FileTree::new(src.path(), &store).write_tree().unwrap();
        let commit = commit_of(&store, &tree);

        let dest = tempfile::tempdir().unwrap();
        FileTree::new(dest.path(), &store).checkout(&commit).unwrap();
        assert_eq!(fs::read(dest.path().join("a/b/c.txt")).unwrap(), b"deep");
        assert_eq!(
            FileTree::new(dest.path(), &store).write_tree().unwrap(),
            tree
        );
    }
}
