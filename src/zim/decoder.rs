//! Bounds-checked reads over a [`ReadAt`] source.
//!
//! Every structure above this layer is decoded through a [`Decoder`]. A read
//! that would cross the end of the archive, comes back short, or yields an
//! unterminated or non-UTF-8 string is reported as
//! [`ZimError::CorruptArchive`]; nothing is cached here.

use byteorder::{ByteOrder, LittleEndian};
use std::io::{self, Read};
use std::sync::Arc;

use crate::error::{Result, ZimError};
use crate::io::ReadAt;

/// Strings are read in chunks of this many bytes while looking for the NUL.
const STRING_CHUNK: usize = 256;

/// Longest string accepted before the record is considered corrupt.
const MAX_STRING_LEN: usize = 64 * 1024;

pub struct Decoder<R: ReadAt> {
    reader: Arc<R>,
    size: u64,
}

impl<R: ReadAt> Clone for Decoder<R> {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
            size: self.size,
        }
    }
}

impl<R: ReadAt> Decoder<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    fn check_range(&self, offset: u64, len: usize) -> Result<()> {
        match offset.checked_add(len as u64) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(ZimError::corrupt(format!(
                "read of {len} bytes at offset {offset} runs past end of archive ({} bytes)",
                self.size
            ))),
        }
    }

    /// Fill `buf` from `offset`, looping over short reads.
    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check_range(offset, buf.len())?;

        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .reader
                .read_at(offset + filled as u64, &mut buf[filled..])?;
            if n == 0 {
                return Err(ZimError::corrupt(format!(
                    "unexpected end of data at offset {}",
                    offset + filled as u64
                )));
            }
            filled += n;
        }
        Ok(())
    }

    /// Sequential reader over `[start, end)`, fetching bytes as they are
    /// consumed.
    pub fn range_reader(&self, start: u64, end: u64) -> Result<RangeReader<'_, R>> {
        if start > end || end > self.size {
            return Err(ZimError::corrupt(format!(
                "byte range {start}..{end} lies outside the archive ({} bytes)",
                self.size
            )));
        }
        Ok(RangeReader {
            decoder: self,
            pos: start,
            end,
        })
    }

    pub fn read_bytes(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Little-endian unsigned integer of `width` bytes (1 to 8).
    pub fn read_uint(&self, offset: u64, width: usize) -> Result<u64> {
        if !(1..=8).contains(&width) {
            return Err(ZimError::corrupt(format!("invalid integer width {width}")));
        }
        let mut buf = [0u8; 8];
        self.read_exact_at(offset, &mut buf[..width])?;
        Ok(LittleEndian::read_uint(&buf[..width], width))
    }

    pub fn read_u32(&self, offset: u64) -> Result<u32> {
        Ok(self.read_uint(offset, 4)? as u32)
    }

    pub fn read_u64(&self, offset: u64) -> Result<u64> {
        self.read_uint(offset, 8)
    }

    /// NUL-terminated UTF-8 string at `offset`.
    ///
    /// Returns the string and the offset just past its terminator.
    pub fn read_string(&self, offset: u64) -> Result<(String, u64)> {
        let mut bytes = Vec::new();
        let mut pos = offset;

        loop {
            if pos >= self.size {
                return Err(ZimError::corrupt(format!(
                    "unterminated string at offset {offset}"
                )));
            }
            let len = STRING_CHUNK.min((self.size - pos) as usize);
            let chunk = self.read_bytes(pos, len)?;

            if let Some(nul) = chunk.iter().position(|&b| b == 0) {
                bytes.extend_from_slice(&chunk[..nul]);
                let next = pos + nul as u64 + 1;
                let text = String::from_utf8(bytes).map_err(|_| {
                    ZimError::corrupt(format!("invalid UTF-8 in string at offset {offset}"))
                })?;
                return Ok((text, next));
            }

            bytes.extend_from_slice(&chunk);
            if bytes.len() > MAX_STRING_LEN {
                return Err(ZimError::corrupt(format!(
                    "string at offset {offset} exceeds {MAX_STRING_LEN} bytes"
                )));
            }
            pos += len as u64;
        }
    }
}

/// [`Read`] adapter over a byte range of a [`Decoder`]
pub struct RangeReader<'a, R: ReadAt> {
    decoder: &'a Decoder<R>,
    pos: u64,
    end: u64,
}

impl<R: ReadAt> RangeReader<'_, R> {
    /// Bytes not yet consumed
    pub fn remaining(&self) -> u64 {
        self.end - self.pos
    }
}

impl<R: ReadAt> Read for RangeReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len().min(self.remaining().min(usize::MAX as u64) as usize);
        if len == 0 {
            return Ok(0);
        }
        let n = self.decoder.reader.read_at(self.pos, &mut buf[..len])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("byte source ended at offset {}", self.pos),
            ));
        }
        self.pos += n as u64;
        Ok(n)
    }
}
