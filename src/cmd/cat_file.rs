use super::super::{Repository, Sha1Hash};
use super::Result;
use std::path::Path;

pub(crate) fn run(root: &Path, hash: &str) -> Result<()> {
    let hash: Sha1Hash = hash.parse()?;
    let obj = Repository::open(root).objects().load(&hash)?;
    print!("{obj}");
    Ok(())
}
