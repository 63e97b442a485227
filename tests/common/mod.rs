#![allow(dead_code)]

use flate2::{write::ZlibEncoder, Compression};
use smartgit::{GitObject, ObjectKind, PktLine, Sha1Hash};
use std::io::Write;

pub const README: &[u8] = b"hello world\n";
pub const NOTES: &[u8] = b"hello world\nagain\n";

pub const OBJ_COMMIT: u8 = 1;
pub const OBJ_TREE: u8 = 2;
pub const OBJ_BLOB: u8 = 3;
pub const OBJ_REF_DELTA: u8 = 7;

pub fn pkt(payload: &[u8]) -> Vec<u8> {
    PktLine::new(payload.to_vec()).encode()
}

pub fn flush() -> Vec<u8> {
    PktLine::flush().encode()
}

pub fn advertisement(lines: &[String]) -> Vec<u8> {
    let mut body = pkt(b"# service=git-upload-pack\n");
    body.extend(flush());
    for line in lines {
        body.extend(pkt(line.as_bytes()));
    }
    body.extend(flush());
    body
}

fn entry_header(obj_type: u8, size: usize) -> Vec<u8> {
    let mut first = (obj_type << 4) | (size as u8 & 0x0f);
    let mut remaining = size >> 4;
    if remaining > 0 {
        first |= 0x80;
    }
    let mut out = vec![first];
    while remaining > 0 {
        let mut byte = (remaining & 0x7f) as u8;
        remaining >>= 7;
        if remaining > 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
    out
}

fn compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// A small repository: a commit whose tree holds `README` and `notes.txt`,
/// the latter sent as a ref-delta against `README`.
pub struct Fixture {
    pub commit: Sha1Hash,
    pub tree: Sha1Hash,
    pub readme: Sha1Hash,
    pub notes: Sha1Hash,
    pub pack: Vec<u8>,
}

impl Fixture {
    pub fn new() -> Self {
        let readme = GitObject::new(ObjectKind::Blob, README.to_vec());
        let notes = GitObject::new(ObjectKind::Blob, NOTES.to_vec());

        let tree_content = [
            b"100644 README\0".as_slice(),
            readme.hash().as_bytes(),
            b"100644 notes.txt\0",
            notes.hash().as_bytes(),
        ]
        .concat();
        let tree = GitObject::new(ObjectKind::Tree, tree_content);

        let commit_content = format!(
            "tree {}\nauthor Test <test@example.com> 1700000000 +0000\ncommitter Test <test@example.com> 1700000000 +0000\n\ninitial\n",
            tree.hash()
        );
        let commit = GitObject::new(ObjectKind::Commit, commit_content.into_bytes());

        // copy README whole, then insert "again\n"
        let delta = [
            &[README.len() as u8, NOTES.len() as u8, 0x90, README.len() as u8, 0x06][..],
            b"again\n",
        ]
        .concat();

        let entries = vec![
            entry(OBJ_COMMIT, commit.content()),
            entry(OBJ_TREE, tree.content()),
            entry(OBJ_BLOB, readme.content()),
            [
                entry_header(OBJ_REF_DELTA, delta.len()),
                readme.hash().as_bytes().to_vec(),
                compress(&delta),
            ]
            .concat(),
        ];

        Self {
            commit: commit.hash(),
            tree: tree.hash(),
            readme: readme.hash(),
            notes: notes.hash(),
            pack: build_pack(&entries),
        }
    }

    /// The refs a server for this fixture would advertise.
    pub fn advertisement(&self) -> Vec<u8> {
        advertisement(&[
            format!(
                "{} HEAD\0multi_ack side-band-64k ofs-delta symref=HEAD:refs/heads/main agent=git/2.43.0\n",
                self.commit
            ),
            format!("{} refs/heads/main\n", self.commit),
        ])
    }
}

fn entry(obj_type: u8, content: &[u8]) -> Vec<u8> {
    [entry_header(obj_type, content.len()), compress(content)].concat()
}

pub fn build_pack(entries: &[Vec<u8>]) -> Vec<u8> {
    let mut pack = b"PACK".to_vec();
    pack.extend_from_slice(&2u32.to_be_bytes());
    pack.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for entry in entries {
        pack.extend_from_slice(entry);
    }
    let trailer = Sha1Hash::digest(&pack);
    pack.extend_from_slice(trailer.as_bytes());
    pack
}

/// Wraps `pack` in a side-band-64k response with interleaved progress.
pub fn side_band_response(pack: &[u8], chunk_size: usize) -> Vec<u8> {
    let mut body = pkt(b"NAK\n");
    body.extend(pkt(b"\x02Enumerating objects: 4, done.\n"));
    for chunk in pack.chunks(chunk_size) {
        body.extend(pkt(&[&[1u8][..], chunk].concat()));
        body.extend(pkt(b"\x02Receiving objects\r"));
    }
    body.extend(flush());
    body
}
