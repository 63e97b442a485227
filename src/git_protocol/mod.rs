mod delta;
mod discovery;
mod negotiation;
pub(crate) mod pack_file;
pub(crate) mod pkt_line;
mod remote;
mod side_band;

pub use delta::{Delta, Instruction};
pub use discovery::References;
pub use negotiation::{select_want, upload_request, WANT_PREFERENCE};
pub use pack_file::{DeltaBase, ObjectType, PackFile, PackFileObject, PackHeader, PackObjectHeader};
pub use pkt_line::{PktLine, PktLineDecoder, PktLines, MAX_PKT_PAYLOAD};
pub use remote::{Remote, RemoteConfig, USER_AGENT};
pub use side_band::{demultiplex, Channel, PackReceiver, SideBandDemuxer, SideBandFrame};

use super::{Error, Result};

fn msb_is_1(byte: u8) -> bool {
    byte & 0b10000000 == 0b10000000
}
