//! Unix `ar` container encoding (the outer layer of a `.deb`/`.ipk`).
//!
//! ```text
//! "!<arch>\n"
//! [60-byte header][content][\n if content length is odd]   (repeated)
//! ```
//!
//! Header fields are ASCII, left-justified and space-padded:
//!
//! | Bytes | Field | Value |
//! |---|---|---|
//! | 0..16 | name | member name |
//! | 16..28 | mtime | decimal seconds |
//! | 28..34 | uid | `0` |
//! | 34..40 | gid | `0` |
//! | 40..48 | mode | `100644` |
//! | 48..58 | size | decimal bytes, padding excluded |
//! | 58..60 | trailer | `` ` `` `\n` |

use std::io::{self, Read, Write};

use crate::error::{PackagerError, Result};

pub const AR_MAGIC: &[u8; 8] = b"!<arch>\n";
pub const HEADER_LEN: usize = 60;

const NAME_WIDTH: usize = 16;
const MTIME_WIDTH: usize = 12;
const SIZE_WIDTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    name: String,
    size: u64,
    mtime: i64,
}

impl ArchiveMember {
    /// # Errors
    ///
    /// Returns [`PackagerError::Format`] if a value does not fit its header
    /// field: a name longer than 16 bytes or non-ASCII, a negative or
    /// over-wide timestamp, or a size of 10 GB or more.
    pub fn new(name: impl Into<String>, size: u64, mtime: i64) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.len() > NAME_WIDTH || !name.is_ascii() {
            return Err(PackagerError::Format(format!(
                "ar member name must be 1-{NAME_WIDTH} ASCII bytes: {name:?}"
            )));
        }
        if mtime < 0 || mtime.to_string().len() > MTIME_WIDTH {
            return Err(PackagerError::Format(format!(
                "ar member timestamp out of range: {mtime}"
            )));
        }
        if size.to_string().len() > SIZE_WIDTH {
            return Err(PackagerError::Format(format!(
                "ar member {name} too large: {size} bytes"
            )));
        }
        Ok(Self { name, size, mtime })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// The fixed-width 60-byte header.
    pub fn header(&self) -> [u8; HEADER_LEN] {
        let text = format!(
            "{:<16}{:<12}{:<6}{:<6}{:<8}{:<10}`\n",
            self.name, self.mtime, "0", "0", "100644", self.size
        );
        let mut header = [b' '; HEADER_LEN];
        header.copy_from_slice(text.as_bytes());
        header
    }

    /// Odd-sized members get one `\n` after their content.
    pub fn padding(&self) -> u64 {
        self.size % 2
    }

    /// Bytes this member occupies in the archive: header, content, padding.
    pub fn block_len(&self) -> u64 {
        HEADER_LEN as u64 + self.size + self.padding()
    }
}

/// Sequential `ar` writer. Members are written in the order appended.
#[derive(Debug)]
pub struct ArWriter<W: Write> {
    inner: W,
}

impl<W: Write> ArWriter<W> {
    /// Start an archive by writing the global magic.
    pub fn new(mut inner: W) -> io::Result<Self> {
        inner.write_all(AR_MAGIC)?;
        Ok(Self { inner })
    }

    /// Write one member: header, exactly `member.size()` bytes from `data`, padding.
    pub fn append<R: Read>(&mut self, member: &ArchiveMember, data: R) -> Result<()> {
        self.inner.write_all(&member.header())?;

        let copied = io::copy(&mut data.take(member.size), &mut self.inner)?;
        if copied != member.size {
            return Err(PackagerError::Format(format!(
                "ar member {} truncated: expected {} bytes, got {copied}",
                member.name, member.size
            )));
        }

        if member.padding() == 1 {
            self.inner.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn append_bytes(&mut self, name: &str, mtime: i64, bytes: &[u8]) -> Result<()> {
        let member = ArchiveMember::new(name, bytes.len() as u64, mtime)?;
        self.append(&member, bytes)
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
