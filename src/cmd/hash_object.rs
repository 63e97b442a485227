use super::super::{GitObject, Repository};
use super::Result;
use std::fs::File;
use std::path::Path;

pub(crate) fn run(root: &Path, file: &Path, write: bool) -> Result<()> {
    let obj = GitObject::new_blob(File::open(file)?)?;
    let hash = if write {
        Repository::open(root).objects().persist(&obj)?
    } else {
        obj.hash()
    };
    println!("{hash}");
    Ok(())
}
