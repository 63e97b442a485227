use super::{msb_is_1, Error, Result};
use std::io::{Cursor, Read};

const MASK_LAST_7: u8 = 0b01111111;

/// A copy instruction with no size bytes copies this many bytes.
const DEFAULT_COPY_SIZE: usize = 0x10000;

/// Upper bound on the up-front reservation for a delta's output.
const MAX_PREALLOC: usize = 1 << 20;

fn read_one<R: Read>(r: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)
        .map_err(|_| Error::format("delta data ends mid-instruction"))?;
    let [byte] = buf;
    Ok(byte)
}

/// Little-endian base-128 varint, least-significant group first.
fn get_length<R: Read>(r: &mut R) -> Result<usize> {
    let mut len: usize = 0;
    let mut shift = 0;

    loop {
        let byte = read_one(r)?;
        if shift >= usize::BITS {
            return Err(Error::format("delta size varint overflows"));
        }
        len |= ((byte & MASK_LAST_7) as usize) << shift;
        shift += 7;

        if !msb_is_1(byte) {
            return Ok(len);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    base_size: usize,
    target_size: usize,
    instructions: Vec<Instruction>,
}

impl Delta {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(bytes);
        let base_size = get_length(&mut r)?;
        let target_size = get_length(&mut r)?;

        let mut instructions: Vec<Instruction> = vec![];
        while (r.position() as usize) < bytes.len() {
            let byte = read_one(&mut r)?;
            instructions.push(Instruction::new(byte, &mut r)?);
        }

        Ok(Self {
            base_size,
            target_size,
            instructions,
        })
    }

    pub fn base_size(&self) -> usize {
        self.base_size
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Rebuilds the target object from `base`.
    pub fn apply(&self, base: &[u8]) -> Result<Vec<u8>> {
        if base.len() != self.base_size {
            return Err(Error::format(format!(
                "delta expects a {}-byte base, found {} bytes",
                self.base_size,
                base.len()
            )));
        }

        let produced = self
            .instructions
            .iter()
            .try_fold(0usize, |total, inst| total.checked_add(inst.output_len()));
        if produced != Some(self.target_size) {
            return Err(Error::format(format!(
                "delta promises {} bytes but its instructions produce {}",
                self.target_size,
                produced.map_or_else(|| "an overflowing amount".to_string(), |n| n.to_string())
            )));
        }

        let mut result: Vec<u8> = Vec::with_capacity(self.target_size.min(MAX_PREALLOC));

        for inst in &self.instructions {
            match inst {
                Instruction::Copy { offset, size } => {
                    let range = offset
                        .checked_add(*size)
                        .filter(|end| *end <= base.len())
                        .map(|end| *offset..end)
                        .ok_or_else(|| {
                            Error::format(format!(
                                "delta copies {size} bytes at {offset} from a {}-byte base",
                                base.len()
                            ))
                        })?;
                    result.extend_from_slice(&base[range]);
                }
                Instruction::Insert(bytes) => {
                    result.extend_from_slice(bytes);
                }
            }
        }

        if result.len() != self.target_size {
            return Err(Error::format(format!(
                "delta promised {} bytes but produced {}",
                self.target_size,
                result.len()
            )));
        }

        Ok(result)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Copy { offset: usize, size: usize },
    Insert(Vec<u8>),
}

impl Instruction {
    /// Bytes this instruction appends to the target.
    pub fn output_len(&self) -> usize {
        match self {
            Self::Copy { size, .. } => *size,
            Self::Insert(bytes) => bytes.len(),
        }
    }

    fn new<R: Read>(byte: u8, r: &mut R) -> Result<Self> {
        if msb_is_1(byte) {
            let offset = get_delta_offset(byte, r)?;
            let size = match get_delta_size(byte, r)? {
                0 => DEFAULT_COPY_SIZE,
                size => size,
            };
            Ok(Self::Copy { offset, size })
        } else {
            let len = (byte & MASK_LAST_7) as usize;
            if len == 0 {
                return Err(Error::format("reserved delta instruction 0x00"));
            }
            let mut buf = vec![0u8; len];
            r.read_exact(&mut buf)
                .map_err(|_| Error::format("delta insert runs past the end of the delta"))?;
            Ok(Self::Insert(buf))
        }
    }
}

/// Bits 0-3 of the instruction byte select which offset bytes follow.
fn get_delta_offset<R: Read>(byte: u8, r: &mut R) -> Result<usize> {
    read_packed(byte, 0, 4, r)
}

/// Bits 4-6 select which size bytes follow.
fn get_delta_size<R: Read>(byte: u8, r: &mut R) -> Result<usize> {
    read_packed(byte, 4, 3, r)
}

fn read_packed<R: Read>(byte: u8, first_bit: u32, count: u32, r: &mut R) -> Result<usize> {
    let mut value: usize = 0;
    for i in 0..count {
        if byte & (1 << (first_bit + i)) != 0 {
            value |= (read_one(r)? as usize) << (8 * i);
        }
    }
    Ok(value)
}
