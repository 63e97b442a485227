use super::{msb_is_1, Delta, Error, Result};
use crate::git_object::{GitObject, ObjectKind, ObjectStore};
use crate::{Sha1Hash, SHA1_HASH_SIZE};
use flate2::{Decompress, FlushDecompress, Status};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;
const PACK_HEADER_SIZE: usize = 12;

/// Output reserved per inflate step.
const INFLATE_CHUNK: usize = 64 * 1024;

const MASK_LAST_4: u8 = 0b00001111;
const MASK_LAST_7: u8 = 0b01111111;
const MASK_OBJECT_TYPE: u8 = 0b01110000;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PackHeader {
    version: u32,
    num_objects: u32,
}

impl PackHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PACK_HEADER_SIZE {
            return Err(Error::format(format!(
                "packfile too short: {} bytes",
                bytes.len()
            )));
        }

        if &bytes[..4] != PACK_SIGNATURE {
            return Err(Error::format(format!(
                "invalid packfile signature {:?}",
                String::from_utf8_lossy(&bytes[..4])
            )));
        }

        let version = u32::from_be_bytes(bytes[4..8].try_into()?);
        if version != PACK_VERSION {
            return Err(Error::format(format!(
                "unsupported packfile version: {version}"
            )));
        }

        let num_objects = u32::from_be_bytes(bytes[8..12].try_into()?);
        Ok(Self {
            version,
            num_objects,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ObjectType {
    Commit,
    Tree,
    Blob,
    Tag,
    OfsDelta,
    RefDelta,
}

impl ObjectType {
    fn new(byte: u8) -> Result<Self> {
        match (byte & MASK_OBJECT_TYPE) >> 4 {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            6 => Ok(Self::OfsDelta),
            7 => Ok(Self::RefDelta),
            code => Err(Error::format(format!("invalid pack object type {code}"))),
        }
    }

    /// The stored kind of an undeltified entry.
    fn object_kind(&self) -> Option<ObjectKind> {
        match self {
            Self::Commit => Some(ObjectKind::Commit),
            Self::Tree => Some(ObjectKind::Tree),
            Self::Blob => Some(ObjectKind::Blob),
            Self::Tag => Some(ObjectKind::Tag),
            Self::OfsDelta | Self::RefDelta => None,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
            Self::OfsDelta => "ofsdelta",
            Self::RefDelta => "refdelta",
        };
        write!(f, "{value}")
    }
}

/// Where a delta finds its base, as written in the entry header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeltaBase {
    /// Distance back from the delta entry's own offset.
    Offset(u64),
    Hash(Sha1Hash),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackObjectHeader {
    obj_type: ObjectType,
    size: u64,
    base: Option<DeltaBase>,
}

impl PackObjectHeader {
    /// Decodes an entry header from the start of `bytes`, returning it with
    /// the number of bytes it occupies.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut pos = 0;
        let mut next = || -> Result<u8> {
            let byte = *bytes
                .get(pos)
                .ok_or_else(|| Error::format("packfile ends inside an object header"))?;
            pos += 1;
            Ok(byte)
        };

        let mut byte = next()?;
        let obj_type = ObjectType::new(byte)?;
        let mut size = (byte & MASK_LAST_4) as u64;
        let mut shift = 4;

        while msb_is_1(byte) {
            byte = next()?;
            if shift > u64::BITS - 7 {
                return Err(Error::format("object size overflows"));
            }
            size |= ((byte & MASK_LAST_7) as u64) << shift;
            shift += 7;
        }

        let base = match obj_type {
            ObjectType::OfsDelta => {
                // Big-endian groups; each continuation adds one before the shift.
                let mut byte = next()?;
                let mut distance = (byte & MASK_LAST_7) as u64;
                while msb_is_1(byte) {
                    byte = next()?;
                    distance = distance
                        .checked_add(1)
                        .and_then(|d| d.checked_mul(1 << 7))
                        .ok_or_else(|| Error::format("ofs-delta offset overflows"))?
                        | (byte & MASK_LAST_7) as u64;
                }
                Some(DeltaBase::Offset(distance))
            }
            ObjectType::RefDelta => {
                let mut hash = [0u8; SHA1_HASH_SIZE];
                for b in hash.iter_mut() {
                    *b = next()?;
                }
                Some(DeltaBase::Hash(Sha1Hash::from(hash)))
            }
            _ => None,
        };

        Ok((
            Self {
                obj_type,
                size,
                base,
            },
            pos,
        ))
    }

    pub fn obj_type(&self) -> ObjectType {
        self.obj_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn base(&self) -> Option<DeltaBase> {
        self.base
    }
}

/// A delta's base, resolved to an absolute pack offset where possible.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum BaseLocation {
    Offset(usize),
    Hash(Sha1Hash),
}

#[derive(Debug)]
enum Entry {
    Undeltified(GitObject),
    Deltified { base: BaseLocation, delta: Delta },
}

/// One entry of the first pass, keyed by where it starts in the pack.
#[derive(Debug)]
pub struct PackFileObject {
    offset: usize,
    entry: Entry,
}

impl PackFileObject {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_delta(&self) -> bool {
        matches!(self.entry, Entry::Deltified { .. })
    }
}

/// Iterates the entries of an in-memory packfile.
#[derive(Debug)]
pub struct PackFile<'a> {
    data: &'a [u8],
    header: PackHeader,
    num_objects: u32,
    pos: usize,
}

impl<'a> PackFile<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let header = PackHeader::parse(data)?;
        Ok(Self {
            data,
            header,
            num_objects: header.num_objects(),
            pos: PACK_HEADER_SIZE,
        })
    }

    pub fn header(&self) -> PackHeader {
        self.header
    }

    /// Parses the whole pack, resolves every delta and persists the results
    /// into `store`. Returns the hashes of the stored objects in pack order.
    pub fn unpack(data: &[u8], store: &ObjectStore) -> Result<Vec<Sha1Hash>> {
        let mut pack = PackFile::new(data)?;
        info!(
            objects = pack.header.num_objects(),
            bytes = data.len(),
            "Parsing packfile"
        );

        let entries = pack.by_ref().collect::<Result<Vec<_>>>()?;
        pack.verify_trailer()?;

        let num_deltas = entries.iter().filter(|e| e.is_delta()).count();
        debug!(entries = entries.len(), deltas = num_deltas, "first pass done");

        let objects = DeltaResolver::new(entries, store).resolve()?;

        let hashes = objects
            .iter()
            .map(|object| store.persist(object))
            .collect::<Result<Vec<_>>>()?;
        info!(objects = hashes.len(), deltas = num_deltas, "Unpacked objects");
        Ok(hashes)
    }

    fn read_entry(&mut self) -> Result<PackFileObject> {
        let offset = self.pos;
        if offset >= self.data.len() {
            return Err(Error::format(format!(
                "packfile ends before object {} of {}",
                self.header.num_objects - self.num_objects + 1,
                self.header.num_objects
            )));
        }

        let (header, header_len) = PackObjectHeader::parse(&self.data[offset..])?;
        self.pos += header_len;

        let size = usize::try_from(header.size)
            .map_err(|_| Error::format(format!("object at {offset} is too large")))?;
        let buf = self.read_zlib(size)?;

        let entry = match (header.obj_type.object_kind(), header.base) {
            (Some(kind), _) => Entry::Undeltified(GitObject::new(kind, buf)),
            (None, Some(DeltaBase::Offset(distance))) => {
                let base = usize::try_from(distance)
                    .ok()
                    .filter(|d| *d > 0)
                    .and_then(|d| offset.checked_sub(d))
                    .filter(|base| *base >= PACK_HEADER_SIZE)
                    .ok_or_else(|| {
                        Error::format(format!(
                            "ofs-delta at {offset} points {distance} bytes back, outside the pack"
                        ))
                    })?;
                Entry::Deltified {
                    base: BaseLocation::Offset(base),
                    delta: Delta::parse(&buf)?,
                }
            }
            (None, Some(DeltaBase::Hash(hash))) => Entry::Deltified {
                base: BaseLocation::Hash(hash),
                delta: Delta::parse(&buf)?,
            },
            (None, None) => {
                return Err(Error::format(format!(
                    "{} entry at {offset} has no base",
                    header.obj_type
                )))
            }
        };

        Ok(PackFileObject { offset, entry })
    }

    /// Inflates one self-terminating zlib stream starting at the cursor and
    /// advances past exactly the compressed bytes it used, as counted by the
    /// decompressor itself.
    fn read_zlib(&mut self, size: usize) -> Result<Vec<u8>> {
        let current = self.pos;
        let input = &self.data[current..];
        let mut inflater = Decompress::new(true);
        // One spare byte of room exposes streams longer than announced.
        let limit = size.saturating_add(1);
        let mut buf = Vec::with_capacity(limit.min(INFLATE_CHUNK));

        loop {
            // `size` is untrusted: grow in steps.
            if buf.len() == buf.capacity() {
                let room = (limit - buf.len()).min(INFLATE_CHUNK.max(buf.len()));
                buf.reserve_exact(room);
            }

            let (in_before, out_before) = (inflater.total_in(), inflater.total_out());
            let status = inflater
                .decompress_vec(&input[in_before as usize..], &mut buf, FlushDecompress::None)
                .map_err(|err| {
                    Error::format(format!(
                        "Cannot decompress data from the pack file at {current}. {err}"
                    ))
                })?;

            if status == Status::StreamEnd {
                break;
            }
            if buf.len() > size {
                return Err(Error::format(format!(
                    "object at {current} inflates past its declared {size} bytes"
                )));
            }
            if inflater.total_in() == in_before && inflater.total_out() == out_before {
                return Err(Error::format(format!(
                    "compressed stream at {current} is truncated"
                )));
            }
        }

        if buf.len() != size {
            return Err(Error::format(format!(
                "object at {current} inflates to {} bytes, header says {size}",
                buf.len()
            )));
        }

        self.pos = current + inflater.total_in() as usize;
        Ok(buf)
    }

    /// An absent trailer is tolerated; a present one must match.
    fn verify_trailer(&self) -> Result<()> {
        let rest = &self.data[self.pos..];
        match rest.len() {
            0 => {
                debug!("packfile has no trailing checksum");
                Ok(())
            }
            SHA1_HASH_SIZE => {
                let computed = Sha1Hash::digest(&self.data[..self.pos]);
                if computed.as_bytes() == rest {
                    Ok(())
                } else {
                    Err(Error::format(format!(
                        "packfile checksum mismatch: computed {computed}, trailer {}",
                        hex::encode(rest)
                    )))
                }
            }
            n => Err(Error::format(format!(
                "{n} unexpected bytes after the last packfile object"
            ))),
        }
    }
}

impl Iterator for PackFile<'_> {
    type Item = Result<PackFileObject>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_objects == 0 {
            return None;
        }

        let entry = self.read_entry();
        // A failed entry leaves the cursor in an unknown state.
        self.num_objects = if entry.is_ok() {
            self.num_objects - 1
        } else {
            0
        };
        Some(entry)
    }
}

/// Second pass: rebuilds every deltified entry from its fully resolved base.
struct DeltaResolver<'a> {
    entries: Vec<PackFileObject>,
    resolved: Vec<Option<GitObject>>,
    by_offset: HashMap<usize, usize>,
    by_hash: HashMap<Sha1Hash, usize>,
    store: &'a ObjectStore,
}

impl<'a> DeltaResolver<'a> {
    fn new(entries: Vec<PackFileObject>, store: &'a ObjectStore) -> Self {
        let mut resolved = Vec::with_capacity(entries.len());
        let mut by_offset = HashMap::with_capacity(entries.len());
        let mut by_hash = HashMap::new();

        for (idx, object) in entries.iter().enumerate() {
            by_offset.insert(object.offset, idx);
            match &object.entry {
                Entry::Undeltified(obj) => {
                    by_hash.insert(obj.hash(), idx);
                    resolved.push(Some(obj.clone()));
                }
                Entry::Deltified { .. } => resolved.push(None),
            }
        }

        Self {
            entries,
            resolved,
            by_offset,
            by_hash,
            store,
        }
    }

    fn resolve(mut self) -> Result<Vec<GitObject>> {
        let mut pending: Vec<usize> = (0..self.entries.len())
            .filter(|idx| self.resolved[*idx].is_none())
            .collect();

        // A ref-delta may name a base that is itself a delta later in the
        // stream, so keep sweeping until a sweep makes no progress.
        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = vec![];
            for idx in pending {
                if !self.try_resolve(idx)? {
                    deferred.push(idx);
                }
            }

            if deferred.len() == before {
                let missing: Vec<String> = deferred
                    .iter()
                    .filter_map(|idx| match self.entries[*idx].entry {
                        Entry::Deltified {
                            base: BaseLocation::Hash(hash),
                            ..
                        } => Some(hash.hex()),
                        _ => None,
                    })
                    .collect();
                return Err(Error::format(format!(
                    "{} deltas have missing or circular bases: {}",
                    deferred.len(),
                    missing.join(", ")
                )));
            }
            debug!(resolved = before - deferred.len(), left = deferred.len(), "delta sweep");
            pending = deferred;
        }

        self.resolved
            .into_iter()
            .map(|object| object.ok_or_else(|| Error::format("unresolved pack entry")))
            .collect()
    }

    /// Follows the base chain from `idx` down to something already resolved,
    /// then applies the deltas back up. `false` means the chain ends at a
    /// hash nobody has produced yet.
    fn try_resolve(&mut self, idx: usize) -> Result<bool> {
        let mut chain: Vec<usize> = vec![];
        let mut cur = idx;

        let mut base = loop {
            if let Some(object) = &self.resolved[cur] {
                break object.clone();
            }
            chain.push(cur);

            let Entry::Deltified { base, .. } = &self.entries[cur].entry else {
                return Err(Error::format("undeltified entry left unresolved"));
            };
            match *base {
                BaseLocation::Offset(offset) => {
                    cur = *self.by_offset.get(&offset).ok_or_else(|| {
                        Error::format(format!("no pack entry starts at offset {offset}"))
                    })?;
                }
                BaseLocation::Hash(hash) => {
                    if let Some(&found) = self.by_hash.get(&hash) {
                        cur = found;
                    } else if let Some(object) = self.store.try_load(&hash)? {
                        debug!(%hash, "delta base found in the object store");
                        break object;
                    } else {
                        return Ok(false);
                    }
                }
            }
        };

        for &i in chain.iter().rev() {
            let Entry::Deltified { delta, .. } = &self.entries[i].entry else {
                return Err(Error::format("undeltified entry in a delta chain"));
            };
            let content = delta.apply(base.content())?;
            let object = GitObject::new(base.kind(), content);
            self.by_hash.insert(object.hash(), i);
            self.resolved[i] = Some(object.clone());
            base = object;
        }

        Ok(true)
    }
}
