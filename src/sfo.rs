//! Provides the [`SfoContainer`] structure that can be used to read and patch in-memory
//! 'param.sfo' files.
//!
//! The container is never re-serialized. Title rewrites patch the bytes of existing value slots
//! so that the size of the file and every offset in it stay the same.

/// Provides [`SfoError`] that describes errors which may occur while parsing or patching an SFO
/// container.
pub mod error {
    use thiserror::Error;

    /// An error which may occur when parsing or patching an SFO container.
    #[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
    pub enum SfoError {
        /// Returned when the container is structurally invalid: it is shorter than its header,
        /// its entry table doesn't fit into it, or one of its entries points outside of it.
        #[error("malformed sfo container: {0}")]
        MalformedHeader(&'static str),
        /// Returned when no entry with the requested key exists.
        #[error("key not found in sfo container")]
        NotFound,
    }
}

use crate::format::*;
use std::{borrow::Cow, ops::Range};
pub use error::SfoError;

#[inline(always)]
fn get_u16_le(bytes: &[u8]) -> (&[u8], u16) {
    let (bytes, tail) = bytes.split_at(2);
    let bytes: &[u8; 2] = bytes.try_into().unwrap();
    (tail, u16::from_le_bytes(*bytes))
}

#[inline(always)]
fn get_u32_le(bytes: &[u8]) -> (&[u8], u32) {
    let (bytes, tail) = bytes.split_at(4);
    let bytes: &[u8; 4] = bytes.try_into().unwrap();
    (tail, u32::from_le_bytes(*bytes))
}

/// Computes `base + offset .. base + offset + len` and checks that it lies within a buffer of
/// `buf_len` bytes.
fn checked_range(buf_len: usize, base: u32, offset: u32, len: usize) -> Option<Range<usize>> {
    let start = usize::try_from(base)
        .ok()?
        .checked_add(usize::try_from(offset).ok()?)?;
    let end = start.checked_add(len)?;
    (end <= buf_len).then_some(start..end)
}

/// Returns the bytes up to (not including) the first zero byte, or the whole slice when there is
/// no zero byte.
fn until_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

/// Returns `true` for keys that hold the application title: `TITLE` and its `TITLE_xx` locale
/// variants.
pub fn is_title_key(key: &str) -> bool {
    key == TITLE_KEY || key.starts_with(TITLE_LOCALE_PREFIX)
}

/// A parsed entry of the SFO index table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SfoEntry {
    /// Offset of the key name relative to the key table.
    pub key_offset: u16,
    /// One of the `FMT_*` constants.
    pub data_format: u16,
    /// Length of the value including its terminator and padding.
    pub data_len: u32,
    /// Allocated capacity of the value slot.
    pub data_max_len: u32,
    /// Offset of the value relative to the data table.
    pub data_offset: u32,
}

impl SfoEntry {
    fn parse(slot: &[u8]) -> Self {
        let (slot, key_offset) = get_u16_le(slot);
        let (slot, data_format) = get_u16_le(slot);
        let (slot, data_len) = get_u32_le(slot);
        let (slot, data_max_len) = get_u32_le(slot);
        let (_, data_offset) = get_u32_le(slot);

        Self {
            key_offset,
            data_format,
            data_len,
            data_max_len,
            data_offset,
        }
    }
}

/// Describes what [`SfoContainer::write_string`] changed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct WriteReport {
    /// Number of value slots that were rewritten.
    pub updated: usize,
    /// Set when at least one slot was too small for the whole value.
    pub truncated: bool,
    /// Set when a truncated value was cut inside a multi-byte UTF-8 character. Such a slot
    /// reads back with a replacement character at its end.
    pub split_char: bool,
}

/// An index over an SFO container held in a separate byte buffer.
///
/// The index doesn't borrow the buffer so the same buffer can be patched with
/// [`SfoContainer::write_string`] after parsing.
#[derive(Clone, Debug)]
pub struct SfoContainer {
    magic: [u8; 4],
    version: u32,
    key_table_offset: u32,
    data_table_offset: u32,
    entries: Vec<SfoEntry>,
}

impl SfoContainer {
    /// Parses the header and the index table of an SFO container.
    ///
    /// # Errors
    /// Returns [`SfoError::MalformedHeader`] when the buffer is shorter than the header or when
    /// the index table extends past the end of the buffer.
    pub fn parse(bytes: &[u8]) -> Result<Self, SfoError> {
        if bytes.len() < HEADER_LEN {
            return Err(SfoError::MalformedHeader("file is too short to be an sfo file"));
        }

        let (magic, tail) = bytes.split_at(4);
        let magic: [u8; 4] = magic.try_into().unwrap();
        let (tail, version) = get_u32_le(tail);
        let (tail, key_table_offset) = get_u32_le(tail);
        let (tail, data_table_offset) = get_u32_le(tail);
        let (tail, entries_count) = get_u32_le(tail);

        let table_len = usize::try_from(entries_count)
            .ok()
            .and_then(|count| count.checked_mul(ENTRY_LEN))
            .ok_or(SfoError::MalformedHeader("entry table length overflows"))?;
        if table_len > tail.len() {
            return Err(SfoError::MalformedHeader(
                "entry table is larger than the space available in the file",
            ));
        }

        debug!(
            "Key table at {:#x}, data table at {:#x}, {} entries.",
            key_table_offset, data_table_offset, entries_count
        );

        let entries = tail[..table_len]
            .chunks_exact(ENTRY_LEN)
            .map(SfoEntry::parse)
            .collect();

        Ok(Self {
            magic,
            version,
            key_table_offset,
            data_table_offset,
            entries,
        })
    }

    /// Returns `true` if the container starts with the `\0PSF` magic. The magic is not required
    /// for parsing.
    #[inline]
    pub fn has_magic(&self) -> bool {
        self.magic == SFO_MAGIC
    }

    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[inline]
    pub fn key_table_offset(&self) -> u32 {
        self.key_table_offset
    }

    #[inline]
    pub fn data_table_offset(&self) -> u32 {
        self.data_table_offset
    }

    /// Returns the parsed index table in file order.
    #[inline]
    pub fn entries(&self) -> &[SfoEntry] {
        &self.entries
    }

    /// Decodes the key name of an entry.
    ///
    /// # Errors
    /// Returns [`SfoError::MalformedHeader`] when the key starts outside of the buffer or has no
    /// terminator before the end of the buffer.
    pub fn key<'a>(&self, bytes: &'a [u8], entry: &SfoEntry) -> Result<Cow<'a, str>, SfoError> {
        let start = checked_range(bytes.len(), self.key_table_offset, entry.key_offset.into(), 0)
            .ok_or(SfoError::MalformedHeader("key offset is out of bounds"))?
            .start;
        let tail = &bytes[start..];
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(SfoError::MalformedHeader("key is not terminated"))?;

        Ok(String::from_utf8_lossy(&tail[..end]))
    }

    /// Returns the absolute byte range of an entry's value slot.
    ///
    /// # Errors
    /// Returns [`SfoError::MalformedHeader`] when the slot doesn't fit into the buffer.
    pub fn value_range(&self, bytes: &[u8], entry: &SfoEntry) -> Result<Range<usize>, SfoError> {
        let len = usize::try_from(entry.data_len)
            .map_err(|_| SfoError::MalformedHeader("value length overflows"))?;
        checked_range(bytes.len(), self.data_table_offset, entry.data_offset, len)
            .ok_or(SfoError::MalformedHeader("value is out of bounds"))
    }

    /// Reads the string value of the first entry whose key equals `key`.
    ///
    /// The value ends at its first zero byte or at the end of its slot, whichever comes first.
    ///
    /// # Errors
    /// Returns [`SfoError::NotFound`] if no entry has the key and [`SfoError::MalformedHeader`]
    /// if an entry points outside of the buffer.
    pub fn read_string(&self, bytes: &[u8], key: &str) -> Result<String, SfoError> {
        for entry in self.entries.iter() {
            if self.key(bytes, entry)? != key {
                continue;
            }

            let value = &bytes[self.value_range(bytes, entry)?];
            return Ok(String::from_utf8_lossy(until_nul(value)).into_owned());
        }

        Err(SfoError::NotFound)
    }

    /// Overwrites the value of every entry whose key satisfies `predicate` with `value`.
    ///
    /// Each slot is zeroed over its whole `data_len` and then receives the first
    /// `min(value.len(), data_len - 1)` bytes of `value`, so the slot always keeps a terminator.
    /// The cut is byte-exact; [`WriteReport::split_char`] tells when it fell inside a character.
    /// The buffer length and all offsets stay unchanged.
    ///
    /// All matching slots are validated before any byte is written, so an error leaves the
    /// buffer untouched.
    ///
    /// # Errors
    /// Returns [`SfoError::MalformedHeader`] if a key or a matching value slot lies outside of
    /// the buffer.
    pub fn write_string<P>(
        &self,
        bytes: &mut [u8],
        predicate: P,
        value: &str,
    ) -> Result<WriteReport, SfoError>
    where
        P: Fn(&str) -> bool,
    {
        let mut targets = Vec::new();
        for entry in self.entries.iter() {
            if predicate(&*self.key(bytes, entry)?) {
                targets.push(self.value_range(bytes, entry)?);
            }
        }

        let mut report = WriteReport::default();
        for range in targets {
            let len = value.len().min(range.len().saturating_sub(1));

            trace!(
                "Rewriting value at {:#x}..{:#x} with {} bytes.",
                range.start,
                range.end,
                len
            );

            let slot = &mut bytes[range];
            slot.fill(0);
            slot[..len].copy_from_slice(&value.as_bytes()[..len]);

            report.updated += 1;
            report.truncated |= len < value.len();
            report.split_char |= !value.is_char_boundary(len);
        }

        Ok(report)
    }
}
