use super::super::{
    git_object::commit::{Commit, Signature},
    Error, ObjectKind, Repository, Sha1Hash,
};
use super::Result;
use std::env;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const DEFAULT_NAME: &str = "smartgit";
const DEFAULT_EMAIL: &str = "smartgit@localhost";

pub(crate) fn run(root: &Path, tree: &str, parents: &[String], message: &str) -> Result<()> {
    let tree: Sha1Hash = tree.parse()?;
    let parents = parents
        .iter()
        .map(|parent| parent.parse())
        .collect::<Result<Vec<Sha1Hash>>>()?;

    let store = Repository::open(root).objects();
    if store.load(&tree)?.kind() != ObjectKind::Tree {
        return Err(Error::format(format!("{tree} is not a tree object")));
    }

    let object = Commit::new(tree, parents).to_object(&signature()?, message);
    let hash = store.persist(&object)?;
    println!("{hash}");
    Ok(())
}

fn signature() -> Result<Signature> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(anyhow::Error::from)?
        .as_secs();
    Ok(Signature {
        name: env::var("GIT_AUTHOR_NAME").unwrap_or_else(|_| DEFAULT_NAME.to_string()),
        email: env::var("GIT_AUTHOR_EMAIL").unwrap_or_else(|_| DEFAULT_EMAIL.to_string()),
        timestamp,
    })
}
