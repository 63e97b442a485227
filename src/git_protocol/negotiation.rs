use super::{pkt_line::PktLine, Error, References, Result};
use crate::Sha1Hash;
use tracing::debug;

/// Refs tried in order when choosing what to fetch.
pub const WANT_PREFERENCE: [&str; 3] = ["HEAD", "refs/heads/main", "refs/heads/master"];

const CAPABILITIES: &str = "side-band-64k";

/// Picks the commit to request from the advertised refs.
pub fn select_want(refs: &References) -> Result<Sha1Hash> {
    WANT_PREFERENCE
        .iter()
        .find_map(|name| refs.get(name).map(|hash| (*name, hash)))
        .map(|(name, hash)| {
            debug!(reference = name, %hash, "selected want");
            hash
        })
        .ok_or(Error::NoSuitableReference)
}

/// Body of the upload-pack POST: one want line, a flush, then `done`.
pub fn upload_request(want: &Sha1Hash) -> Vec<u8> {
    [
        PktLine::new(format!("want {want} {CAPABILITIES}\n").into_bytes()),
        PktLine::flush(),
        PktLine::new(b"done\n".to_vec()),
    ]
    .iter()
    .flat_map(PktLine::encode)
    .collect()
}
