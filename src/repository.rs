use super::{
    git_object::ObjectStore, Error, Result, Sha1Hash, DEFAULT_BRANCH, GIT_DIR, GIT_HEADS_DIR,
    GIT_HEAD_FILE, GIT_OBJ_DIR, GIT_TAGS_DIR,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A working directory with a `.git` directory inside.
#[derive(Debug, Clone)]
pub struct Repository {
    root: PathBuf,
}

impl Repository {
    /// Creates the `.git` skeleton under `root`. Existing files are kept, so
    /// running it twice is harmless.
    pub fn init<P: AsRef<Path>>(root: P) -> Result<Self> {
        let repo = Self::open(root);
        for dir in [GIT_OBJ_DIR, GIT_HEADS_DIR, GIT_TAGS_DIR] {
            fs::create_dir_all(repo.root.join(dir))?;
        }

        let head = repo.root.join(GIT_HEAD_FILE);
        if !head.try_exists()? {
            fs::write(&head, format!("ref: refs/heads/{DEFAULT_BRANCH}\n"))?;
        }

        info!(path = %repo.git_dir().display(), "Initialized git directory");
        Ok(repo)
    }

    pub fn open<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git_dir(&self) -> PathBuf {
        self.root.join(GIT_DIR)
    }

    pub fn objects(&self) -> ObjectStore {
        ObjectStore::new(self.root.join(GIT_OBJ_DIR))
    }

    /// Points `refs/heads/<branch>` at `hash` and `HEAD` at the branch.
    pub fn update_head(&self, branch: &str, hash: &Sha1Hash) -> Result<()> {
        if !is_valid_ref_name(branch) {
            return Err(Error::format(format!("invalid branch name {branch:?}")));
        }

        let ref_path = self.root.join(GIT_HEADS_DIR).join(branch);
        if let Some(dir) = ref_path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&ref_path, format!("{hash}\n"))?;
        fs::write(
            self.root.join(GIT_HEAD_FILE),
            format!("ref: refs/heads/{branch}\n"),
        )?;

        debug!(branch, %hash, "updated HEAD");
        Ok(())
    }
}

/// A subset of `git check-ref-format`. Components are non-empty, never start
/// with `.` and never end in `.lock`. Control characters, `..`, `@{` and the
/// characters in `FORBIDDEN` are rejected anywhere in the name.
pub(crate) fn is_valid_ref_name(name: &str) -> bool {
    const FORBIDDEN: &[char] = &[' ', '~', '^', ':', '?', '*', '[', '\\'];

    if name.is_empty()
        || name == "@"
        || name.ends_with('.')
        || name.contains("..")
        || name.contains("@{")
        || name.contains(|c: char| c.is_ascii_control() || FORBIDDEN.contains(&c))
    {
        return false;
    }

    name.split('/').all(|component| {
        !component.is_empty() && !component.starts_with('.') && !component.ends_with(".lock")
    })
}
