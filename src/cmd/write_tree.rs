use super::super::{FileTree, Repository};
use super::Result;
use std::path::Path;

pub(crate) fn run(root: &Path) -> Result<()> {
    let repo = Repository::open(root);
    let store = repo.objects();
    let hash = FileTree::new(repo.root(), &store).write_tree()?;
    println!("{hash}");
    Ok(())
}
