//! Builds 'param.sfo' images for tests. Shared by the unit tests and the integration tests.

use super::format::{ENTRY_LEN, FMT_UTF8, HEADER_LEN, SFO_MAGIC};

/// Builds a container with string entries laid out back to back, each value slot being
/// `data_len` bytes long.
pub fn build_sfo(entries: &[(&str, &str, u32)]) -> Vec<u8> {
    let mut keys = Vec::new();
    let mut key_offsets = Vec::new();
    for (key, _, _) in entries {
        key_offsets.push(keys.len() as u16);
        keys.extend_from_slice(key.as_bytes());
        keys.push(0);
    }
    keys.resize((keys.len() + 3) & !3, 0);

    let key_table_offset = HEADER_LEN + entries.len() * ENTRY_LEN;
    let data_table_offset = key_table_offset + keys.len();

    let mut out = Vec::new();
    out.extend_from_slice(&SFO_MAGIC);
    out.extend_from_slice(&0x101u32.to_le_bytes());
    out.extend_from_slice(&(key_table_offset as u32).to_le_bytes());
    out.extend_from_slice(&(data_table_offset as u32).to_le_bytes());
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());

    let mut data = Vec::new();
    for (i, (_, value, data_len)) in entries.iter().enumerate() {
        out.extend_from_slice(&key_offsets[i].to_le_bytes());
        out.extend_from_slice(&FMT_UTF8.to_le_bytes());
        out.extend_from_slice(&data_len.to_le_bytes());
        out.extend_from_slice(&data_len.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());

        let mut slot = value.as_bytes().to_vec();
        slot.resize(*data_len as usize, 0);
        data.extend_from_slice(&slot);
    }

    out.extend_from_slice(&keys);
    out.extend_from_slice(&data);
    out
}
