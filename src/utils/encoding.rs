//! Little-endian helpers for the hash database layout.

use std::io::{self, Write};

/// Write a u32 in little-endian format
pub fn write_u32_le<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Write a u64 in little-endian format
pub fn write_u64_le<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Write a u16 in little-endian format
pub fn write_u16_le<W: Write>(writer: &mut W, value: u16) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Read a u16 at `pos` from a byte slice
#[inline]
pub fn u16_at(buf: &[u8], pos: usize) -> Option<u16> {
    let bytes = buf.get(pos..pos.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Read a u32 at `pos` from a byte slice
#[inline]
pub fn u32_at(buf: &[u8], pos: usize) -> Option<u32> {
    let bytes = buf.get(pos..pos.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Read a u64 at `pos` from a byte slice
#[inline]
pub fn u64_at(buf: &[u8], pos: usize) -> Option<u64> {
    let bytes = buf.get(pos..pos.checked_add(8)?)?;
    let mut arr = [0u8; 8];
    arr.copy_from_slice(bytes);
    Some(u64::from_le_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_at() {
        let mut buf = Vec::new();
        write_u16_le(&mut buf, 0xBEEF).unwrap();
        write_u32_le(&mut buf, 0xDEADBEEF).unwrap();
        write_u64_le(&mut buf, u64::MAX - 1).unwrap();

        assert_eq!(u16_at(&buf, 0), Some(0xBEEF));
        assert_eq!(u32_at(&buf, 2), Some(0xDEADBEEF));
        assert_eq!(u64_at(&buf, 6), Some(u64::MAX - 1));
    }

    #[test]
    fn test_read_past_end() {
        let buf = [1u8, 2, 3];
        assert_eq!(u32_at(&buf, 0), None);
        assert_eq!(u16_at(&buf, 2), None);
        assert_eq!(u64_at(&buf, usize::MAX - 2), None);
    }
}
