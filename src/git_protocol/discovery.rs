use super::{
    pkt_line::{PktLine, PktLines},
    Error, Result,
};
use crate::{repository::is_valid_ref_name, Sha1Hash};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// `<hash> <name>` optionally followed by `\0<capabilities>` on the first ref.
static REF_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?<hash>[0-9a-f]{40}) (?<name>[^\x00]+)(?:\x00(?<caps>.*))?$")
        .expect("ref advertisement pattern is valid")
});

/// Advertised by servers that have no refs to offer.
const NO_REFS_PLACEHOLDER: &str = "capabilities^{}";

const SYMREF_HEAD: &str = "symref=HEAD:";

/// Marks the peeled commit of an annotated tag, e.g. `refs/tags/v1^{}`.
const PEELED_SUFFIX: &str = "^{}";

/// The remote's advertised references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct References {
    refs: BTreeMap<String, Sha1Hash>,
    capabilities: Vec<String>,
}

impl References {
    /// Parses the body of `info/refs?service=git-upload-pack`.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let mut references = Self::default();

        for line in PktLines::new(body) {
            let PktLine::Data(bytes) = line? else {
                continue;
            };

            let text = std::str::from_utf8(&bytes)
                .map_err(|err| Error::protocol(format!("ref advertisement is not UTF-8. {err}")))?;
            let text = text.trim_end_matches('\n');
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            let caps = REF_LINE
                .captures(text)
                .ok_or_else(|| Error::protocol(format!("malformed ref line: {text:?}")))?;

            if let Some(capabilities) = caps.name("caps") {
                references.capabilities = capabilities
                    .as_str()
                    .split_whitespace()
                    .map(String::from)
                    .collect();
            }

            let name = &caps["name"];
            if name == NO_REFS_PLACEHOLDER {
                continue;
            }
            if !is_valid_ref_name(name.strip_suffix(PEELED_SUFFIX).unwrap_or(name)) {
                return Err(Error::protocol(format!("invalid ref name {name:?}")));
            }
            let hash: Sha1Hash = caps["hash"].parse()?;
            references.refs.insert(name.to_string(), hash);
        }

        Ok(references)
    }

    pub fn get(&self, name: &str) -> Option<Sha1Hash> {
        self.refs.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Sha1Hash)> {
        self.refs.iter().map(|(name, hash)| (name.as_str(), hash))
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// The branch the remote `HEAD` points at, if the server says so.
    pub fn head_symref(&self) -> Option<&str> {
        self.capabilities
            .iter()
            .find_map(|cap| cap.strip_prefix(SYMREF_HEAD))
    }

    /// Short name of the branch to check out for `hash`: the advertised
    /// `HEAD` symref when it matches, else the first branch at that commit.
    pub fn branch_for(&self, hash: &Sha1Hash) -> Option<&str> {
        self.head_symref()
            .filter(|name| self.get(name).as_ref() == Some(hash))
            .or_else(|| {
                self.iter()
                    .find(|(name, h)| *h == hash && name.starts_with("refs/heads/"))
                    .map(|(name, _)| name)
            })
            .and_then(|name| name.strip_prefix("refs/heads/"))
    }
}
