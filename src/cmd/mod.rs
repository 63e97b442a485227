mod cat_file;
mod clone;
mod commit_tree;
mod hash_object;
mod init;
mod ls_tree;
mod write_tree;

use super::{git_protocol::RemoteConfig, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use clone::{clone, default_dir};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty repository
    Init,

    /// Clone a repository over smart HTTP
    Clone {
        /// Remote repository URL
        url: String,
        /// Destination directory (default: derived from the URL)
        dir: Option<PathBuf>,
        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Print an object's content
    CatFile {
        /// Pretty-print the object (the only supported mode)
        #[arg(short = 'p')]
        pretty: bool,
        hash: String,
    },

    /// Compute the object hash of a file
    HashObject {
        /// Write the object into the object store
        #[arg(short = 'w')]
        write: bool,
        file: PathBuf,
    },

    /// List the entries of a tree object
    LsTree {
        #[arg(long)]
        name_only: bool,
        hash: String,
    },

    /// Store the working directory as a tree object
    WriteTree,

    /// Create a commit object for a tree
    CommitTree {
        tree: String,
        /// Parent commit, may be repeated
        #[arg(short = 'p')]
        parent: Vec<String>,
        /// Commit message
        #[arg(short = 'm', required = true)]
        message: String,
    },
}

impl Command {
    /// Runs the command against the repository rooted at `root`.
    pub async fn run(self, root: &Path) -> Result<()> {
        match self {
            Self::Init => init::run(root),
            Self::Clone { url, dir, timeout } => {
                let config = RemoteConfig {
                    timeout: timeout.map(Duration::from_secs),
                    ..RemoteConfig::default()
                };
                let dest = match dir {
                    Some(dir) => root.join(dir),
                    None => root.join(default_dir(&url)?),
                };
                clone::run(&url, &dest, &config).await
            }
            Self::CatFile { pretty: _, hash } => cat_file::run(root, &hash),
            Self::HashObject { write, file } => hash_object::run(root, &root.join(file), write),
            Self::LsTree { name_only, hash } => ls_tree::run(root, &hash, name_only),
            Self::WriteTree => write_tree::run(root),
            Self::CommitTree {
                tree,
                parent,
                message,
            } => commit_tree::run(root, &tree, &parent, &message),
        }
    }
}
