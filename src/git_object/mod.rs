pub(crate) mod commit;
mod store;
pub(crate) mod tree;

use super::{Error, Result, Sha1Hash};
use bytes::Bytes;
use sha1::Digest;
use std::fmt;
use std::io::Read;
use std::str::FromStr;

pub use store::ObjectStore;
pub use tree::{Mode, TreeNode, TreeRecords};

/// The four concrete object kinds a repository stores.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }
}

impl FromStr for ObjectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "commit" => Ok(Self::Commit),
            "tree" => Ok(Self::Tree),
            "blob" => Ok(Self::Blob),
            "tag" => Ok(Self::Tag),
            _ => Err(Error::format(format!("unknown object type: {s}"))),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GitObject {
    kind: ObjectKind,
    content: Bytes,
}

impl GitObject {
    pub fn new(kind: ObjectKind, content: impl Into<Bytes>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn new_blob<R: Read>(mut content: R) -> Result<Self> {
        let mut buf = vec![];
        content.read_to_end(&mut buf)?;
        Ok(Self::new(ObjectKind::Blob, buf))
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn hash(&self) -> Sha1Hash {
        let hasher = Sha1Hash::hasher()
            .chain_update(self.header())
            .chain_update(&self.content);
        Sha1Hash::new(hasher)
    }

    /// Loose-object form: `"<type> <size>\0<content>"`, before compression.
    pub fn serialize(&self) -> Vec<u8> {
        [self.header().as_bytes(), &self.content].concat()
    }

    /// Parses the loose-object form produced by [`GitObject::serialize`].
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let zero_pos =
            zero_position(data).ok_or(Error::format("Not found \\0 in git object file"))?;
        let header = std::str::from_utf8(&data[..zero_pos])
            .map_err(|err| Error::format(format!("Cannot stringify git object header. {err}")))?;
        let (kind, size) = header
            .split_once(' ')
            .ok_or_else(|| Error::format(format!("invalid git object header: {header}")))?;
        let kind: ObjectKind = kind.parse()?;
        let size = size
            .parse::<usize>()
            .map_err(|err| Error::format(format!("invalid size in git object header. {err}")))?;

        let content = &data[(zero_pos + 1)..];
        if content.len() != size {
            return Err(Error::format(format!(
                "{kind} object declares {size} bytes but holds {}",
                content.len()
            )));
        }

        Ok(Self::new(kind, Bytes::copy_from_slice(content)))
    }

    fn header(&self) -> String {
        format!("{} {}\0", self.kind, self.content.len())
    }
}

/// `cat-file -p` rendering.
impl fmt::Display for GitObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ObjectKind::Tree => {
                for node in TreeRecords::new(&self.content) {
                    match node {
                        Ok(node) => writeln!(f, "{node}")?,
                        Err(_) => return Err(fmt::Error),
                    }
                }
                Ok(())
            }
            ObjectKind::Blob | ObjectKind::Commit | ObjectKind::Tag => {
                write!(f, "{}", String::from_utf8_lossy(&self.content))
            }
        }
    }
}

fn position(bytes: &[u8], byte: u8) -> Option<usize> {
    bytes.iter().position(|&b| b == byte)
}

fn zero_position(bytes: &[u8]) -> Option<usize> {
    position(bytes, b'\0')
}

fn space_position(bytes: &[u8]) -> Option<usize> {
    position(bytes, b' ')
}
