use super::Error;
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

pub const SHA1_HASH_SIZE: usize = 20;
pub const SHA1_HEX_SIZE: usize = SHA1_HASH_SIZE * 2;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sha1Hash([u8; SHA1_HASH_SIZE]);

impl Sha1Hash {
    pub fn hasher() -> Sha1 {
        Sha1::new()
    }

    pub fn new(hasher: Sha1) -> Self {
        Self(hasher.finalize().into())
    }

    pub fn digest(bytes: &[u8]) -> Self {
        Self::new(Self::hasher().chain_update(bytes))
    }

    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Sha1Hash {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Ok(Self(bytes.try_into()?))
    }
}

impl From<[u8; SHA1_HASH_SIZE]> for Sha1Hash {
    fn from(value: [u8; SHA1_HASH_SIZE]) -> Self {
        Self(value)
    }
}

impl FromStr for Sha1Hash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != SHA1_HEX_SIZE {
            return Err(Error::protocol(format!(
                "SHA-1 hash must be {SHA1_HEX_SIZE} hex characters, got {s:?}"
            )));
        }
        let mut buf = [0u8; SHA1_HASH_SIZE];
        hex::decode_to_slice(s, &mut buf)
            .map_err(|err| Error::protocol(format!("invalid SHA-1 hash {s:?}. {err}")))?;
        Ok(Self(buf))
    }
}

impl fmt::Display for Sha1Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex())
    }
}
