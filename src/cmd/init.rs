use super::super::Repository;
use super::Result;
use std::path::Path;

pub(crate) fn run(root: &Path) -> Result<()> {
    let repo = Repository::init(root)?;
    println!("Initialized git directory in {}", repo.git_dir().display());
    Ok(())
}
