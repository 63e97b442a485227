use super::super::{git_object::TreeRecords, Error, ObjectKind, Repository, Sha1Hash};
use super::Result;
use std::path::Path;

pub(crate) fn run(root: &Path, hash: &str, name_only: bool) -> Result<()> {
    let hash: Sha1Hash = hash.parse()?;
    let obj = Repository::open(root).objects().load(&hash)?;
    if obj.kind() != ObjectKind::Tree {
        return Err(Error::format(format!("{hash} is not a tree object")));
    }

    for node in TreeRecords::new(obj.content()) {
        let node = node?;
        if name_only {
            println!("{}", node.name());
        } else {
            println!("{node}");
        }
    }
    Ok(())
}
