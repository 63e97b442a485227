use super::super::{
    git_protocol::{select_want, PackFile, Remote, RemoteConfig},
    tree::FileTree,
    Error, Repository, Result, Sha1Hash, DEFAULT_BRANCH,
};
use std::fs;
use std::path::Path;
use tracing::info;

pub(crate) async fn run(url: &str, dest: &Path, config: &RemoteConfig) -> Result<()> {
    let head = clone(url, dest, config).await?;
    println!("Cloned into {} at {head}", dest.display());
    Ok(())
}

/// Clones `url` into `dest` and checks out the fetched commit, returning its
/// hash.
pub async fn clone(url: &str, dest: &Path, config: &RemoteConfig) -> Result<Sha1Hash> {
    if dest.try_exists()? && fs::read_dir(dest)?.next().is_some() {
        return Err(Error::from(anyhow::anyhow!(
            "destination path {} already exists and is not empty",
            dest.display()
        )));
    }

    let remote = Remote::new(url, config)?;
    info!(url = remote.url(), dest = %dest.display(), "Cloning");

    let repo = Repository::init(dest)?;
    let refs = remote.discover_refs().await?;
    let want = select_want(&refs)?;

    let pack = remote.fetch_pack(&want).await?;
    let store = repo.objects();
    PackFile::unpack(&pack, &store)?;

    let branch = refs.branch_for(&want).unwrap_or(DEFAULT_BRANCH);
    repo.update_head(branch, &want)?;

    let files = FileTree::new(repo.root(), &store).checkout(&want)?;
    info!(%want, branch, files, "Checked out");
    Ok(want)
}

/// The directory `git clone` would pick: the last path segment of the URL
/// without its `.git` suffix.
pub fn default_dir(url: &str) -> Result<String> {
    let name = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(|segment| segment.trim_end_matches(".git"))
        .filter(|name| !name.is_empty() && !name.contains(':'))
        .ok_or_else(|| Error::from(anyhow::anyhow!("cannot derive a directory name from {url}")))?;
    Ok(name.to_string())
}
