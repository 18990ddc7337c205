//! Little-endian primitives shared by the header, tag, and entry codecs

use crate::error::{NovusPackError, Result};

/// Cursor over an encoded byte slice
///
/// Tracks an absolute offset so decode errors point at the byte that
/// could not be read.
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> ByteReader<'a> {
    /// `base` is the absolute offset of `bytes[0]` within the package stream
    pub fn new(bytes: &'a [u8], base: u64) -> Self {
        ByteReader { bytes, pos: 0, base }
    }

    /// Absolute offset of the next unread byte
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(NovusPackError::Encoding(format!(
                "unexpected end of data at offset {}: need {} bytes, have {}",
                self.offset(),
                len,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn i64(&mut self) -> Result<i64> {
        Ok(self.u64()? as i64)
    }

    pub fn bool(&mut self) -> Result<bool> {
        let offset = self.offset();
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(NovusPackError::Encoding(format!(
                "invalid boolean byte 0x{:02X} at offset {}",
                other, offset
            ))),
        }
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    /// UTF-8 string prefixed with a u16 length
    pub fn short_str(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        self.utf8(len)
    }

    /// UTF-8 string prefixed with a u32 length
    pub fn long_str(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        self.utf8(len)
    }

    pub fn optional_str(&mut self) -> Result<Option<String>> {
        if self.bool()? {
            Ok(Some(self.short_str()?))
        } else {
            Ok(None)
        }
    }

    fn utf8(&mut self, len: usize) -> Result<String> {
        let offset = self.offset();
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            NovusPackError::Encoding(format!("invalid UTF-8 string at offset {}", offset))
        })
    }
}

pub(crate) fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn put_short_str(out: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u16::try_from(s.len()).map_err(|_| NovusPackError::Length {
        field: "string",
        actual: s.len(),
        max: u16::MAX as usize,
    })?;
    put_u16(out, len);
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

pub(crate) fn put_long_str(out: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u32::try_from(s.len()).map_err(|_| NovusPackError::Length {
        field: "string",
        actual: s.len(),
        max: u32::MAX as usize,
    })?;
    put_u32(out, len);
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

pub(crate) fn put_optional_str(out: &mut Vec<u8>, s: Option<&str>) -> Result<()> {
    match s {
        Some(s) => {
            out.push(1);
            put_short_str(out, s)
        }
        None => {
            out.push(0);
            Ok(())
        }
    }
}
