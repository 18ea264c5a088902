//! CRC32 helpers

/// CRC32 of `data`
pub fn calculate_crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
