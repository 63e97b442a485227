mod cmd;
mod error;
mod git_object;
mod git_protocol;
mod hash;
mod repository;
mod tree;

const GIT_DIR: &str = ".git";
const GIT_OBJ_DIR: &str = ".git/objects";
const GIT_HEADS_DIR: &str = ".git/refs/heads";
const GIT_TAGS_DIR: &str = ".git/refs/tags";
const GIT_HEAD_FILE: &str = ".git/HEAD";
const DEFAULT_BRANCH: &str = "main";

pub use cmd::{clone, default_dir, Command};
pub use error::Error;
pub use git_object::{GitObject, Mode, ObjectKind, ObjectStore, TreeNode, TreeRecords};
pub use git_protocol::{
    demultiplex, select_want, upload_request, Channel, Delta, DeltaBase, Instruction, ObjectType,
    PackFile, PackFileObject, PackHeader, PackObjectHeader, PackReceiver, PktLine, PktLineDecoder, PktLines,
    References, Remote, RemoteConfig, SideBandDemuxer, SideBandFrame, MAX_PKT_PAYLOAD,
    USER_AGENT, WANT_PREFERENCE,
};
pub use hash::{Sha1Hash, SHA1_HASH_SIZE, SHA1_HEX_SIZE};
pub use repository::Repository;
pub use tree::FileTree;

pub type Result<T> = std::result::Result<T, Error>;
