use std::mem;

pub const HEADER_LEN: usize = mem::size_of::<SfoHeader>();
pub const ENTRY_LEN: usize = mem::size_of::<EntryHeader>();

pub const SFO_MAGIC: [u8; 4] = *b"\0PSF";

/// UTF-8 string that is not null-terminated.
pub const FMT_UTF8_SPECIAL: u16 = 0x0004;
/// Null-terminated UTF-8 string.
pub const FMT_UTF8: u16 = 0x0204;
pub const FMT_INT32: u16 = 0x0404;

pub const TITLE_KEY: &str = "TITLE";
pub const TITLE_LOCALE_PREFIX: &str = "TITLE_";

#[derive(Clone, Debug)]
#[repr(C)]
pub struct SfoHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub key_table_offset: u32,
    pub data_table_offset: u32,
    pub entries_count: u32,
}

#[derive(Clone, Debug)]
#[repr(C)]
pub struct EntryHeader {
    pub key_offset: u16,
    pub data_format: u16,
    pub data_len: u32,
    pub data_max_len: u32,
    pub data_offset: u32,
}
