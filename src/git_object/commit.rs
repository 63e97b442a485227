use super::{Error, GitObject, ObjectKind, Result, Sha1Hash};
use std::fmt;

/// A commit's tree and parents. Author lines and message are not kept.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    tree: Sha1Hash,
    parents: Vec<Sha1Hash>,
}

/// `Name <email>` plus a unix timestamp, as found on author and committer lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub timestamp: u64,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> {} +0000", self.name, self.email, self.timestamp)
    }
}

impl Commit {
    pub fn new(tree: Sha1Hash, parents: Vec<Sha1Hash>) -> Self {
        Self { tree, parents }
    }

    /// Serializes the commit with `author` as both author and committer.
    pub fn to_object(&self, author: &Signature, message: &str) -> GitObject {
        let mut content = format!("tree {}\n", self.tree);
        for parent in &self.parents {
            content.push_str(&format!("parent {parent}\n"));
        }
        content.push_str(&format!("author {author}\ncommitter {author}\n\n{message}"));
        if !message.ends_with('\n') {
            content.push('\n');
        }
        GitObject::new(ObjectKind::Commit, content.into_bytes())
    }

    pub fn tree(&self) -> Sha1Hash {
        self.tree
    }

    pub fn parents(&self) -> &[Sha1Hash] {
        &self.parents
    }
}

impl TryFrom<&GitObject> for Commit {
    type Error = Error;

    fn try_from(object: &GitObject) -> Result<Self> {
        if object.kind() != ObjectKind::Commit {
            return Err(Error::format(format!(
                "expected a commit, found a {}",
                object.kind()
            )));
        }

        let text = String::from_utf8_lossy(object.content());
        let mut tree = None;
        let mut parents = vec![];

        // Headers end at the first blank line.
        for line in text.lines().take_while(|line| !line.is_empty()) {
            if let Some(hash) = line.strip_prefix("tree ") {
                tree = Some(hash.trim().parse()?);
            } else if let Some(hash) = line.strip_prefix("parent ") {
                parents.push(hash.trim().parse()?);
            }
        }

        let tree = tree.ok_or(Error::format("commit without a tree line"))?;
        Ok(Self { tree, parents })
    }
}
