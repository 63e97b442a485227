use super::{space_position, zero_position, Error, Result, Sha1Hash};
use crate::SHA1_HASH_SIZE;
use std::fmt;

const MODE_DIR: isize = 40000;
const MODE_FILE: isize = 100644;
const MODE_EXEC: isize = 100755;
const MODE_SYML: isize = 120000;
const MODE_GITLINK: isize = 160000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    mode: Mode,
    name: String,
    hash: Sha1Hash,
}

impl TreeNode {
    /// Parses one `<mode> <name>\0<20-byte hash>` record.
    fn new(buf: &[u8]) -> Result<Self> {
        let sp_pos = space_position(buf).ok_or(Error::format("tree entry without mode"))?;
        let zero_pos = zero_position(buf).ok_or(Error::format("tree entry without \\0"))?;
        if sp_pos > zero_pos {
            return Err(Error::format("tree entry mode runs into the name terminator"));
        }

        let mode_str = String::from_utf8_lossy(&buf[..sp_pos]);
        let mode = match mode_str.parse::<isize>() {
            Ok(MODE_FILE) => Mode::File,
            Ok(MODE_EXEC) => Mode::Executable,
            Ok(MODE_DIR) => Mode::Directory,
            Ok(MODE_SYML) => Mode::Symlink,
            Ok(MODE_GITLINK) => Mode::Submodule,
            _ => return Err(Error::format(format!("Unknown mode: {mode_str}"))),
        };

        let name = String::from_utf8_lossy(&buf[(sp_pos + 1)..zero_pos]).to_string();
        let hash = Sha1Hash::try_from(&buf[(zero_pos + 1)..])?;

        Ok(Self { mode, name, hash })
    }

    pub fn from_parts(mode: Mode, name: impl Into<String>, hash: Sha1Hash) -> Self {
        Self {
            mode,
            name: name.into(),
            hash,
        }
    }

    /// The raw `<mode> <name>\0<hash>` record.
    pub fn to_bytes(&self) -> Vec<u8> {
        [
            format!("{} {}\0", self.mode as isize, self.name).as_bytes(),
            self.hash.as_bytes(),
        ]
        .concat()
    }

    /// Git orders tree entries as if directory names ended in `/`.
    pub fn sort_key(&self) -> String {
        match self.mode {
            Mode::Directory => format!("{}/", self.name),
            _ => self.name.clone(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn hash(&self) -> Sha1Hash {
        self.hash
    }
}

impl fmt::Display for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:06} {} {}    {}",
            self.mode as isize,
            self.mode.object_type(),
            self.hash.hex(),
            self.name,
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    File = MODE_FILE,
    Executable = MODE_EXEC,
    Directory = MODE_DIR,
    Symlink = MODE_SYML,
    Submodule = MODE_GITLINK,
}

impl Mode {
    fn object_type(&self) -> &'static str {
        match self {
            Self::Directory => "tree",
            Self::Submodule => "commit",
            Self::File | Self::Executable | Self::Symlink => "blob",
        }
    }
}

#[derive(Debug)]
pub struct TreeRecords<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> TreeRecords<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }
}

impl Iterator for TreeRecords<'_> {
    type Item = Result<TreeNode>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.bytes[self.pos..];
        if rest.is_empty() {
            return None;
        }

        // \0 position from the current position
        let Some(zero_pos) = zero_position(rest) else {
            self.pos = self.bytes.len();
            return Some(Err(Error::format("truncated tree entry")));
        };
        let record_size = zero_pos + 1 + SHA1_HASH_SIZE;
        if rest.len() < record_size {
            self.pos = self.bytes.len();
            return Some(Err(Error::format("tree entry hash is truncated")));
        }

        self.pos += record_size;
        Some(TreeNode::new(&rest[..record_size]))
    }
}
