use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Section locates a contiguous region of a file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub offset: u64,
    pub size: u64,
}

impl Section {
    pub const ENCODED_SIZE: usize = 16;

    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    pub fn max_offset(&self) -> u64 {
        self.offset + self.size
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> anyhow::Result<()> {
        w.write_u64::<BigEndian>(self.offset)?;
        w.write_u64::<BigEndian>(self.size)?;
        Ok(())
    }

    pub fn read_from<R: Read>(mut r: R) -> anyhow::Result<Self> {
        let offset = r.read_u64::<BigEndian>()?;
        let size = r.read_u64::<BigEndian>()?;
        Ok(Self { offset, size })
    }
}
