//! Content sniffing used by the default decoder.

use memchr::memchr;

/// Bytes inspected when deciding whether content is binary
const SNIFF_LEN: usize = 8192;

/// Check if content is likely binary
pub fn is_binary(content: &[u8]) -> bool {
    let sample_size = content.len().min(SNIFF_LEN);
    if sample_size == 0 {
        return false;
    }
    let sample = &content[..sample_size];

    // Any NUL in the sample rules out text
    if memchr(0, sample).is_some() {
        return true;
    }

    let control_count = sample
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t' && b != 0x0c)
        .count();

    control_count > sample_size / 8
}

/// Lower-cased extension of a file name, used as the decoder type hint
pub fn type_hint(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_binary() {
        assert!(!is_binary(b"hello world\n"));
        assert!(!is_binary(b""));
        assert!(is_binary(b"DDS \x7c\x00\x00\x00"));
        assert!(is_binary(&[1, 2, 3, 4, 5, 6, 7, 8]));
    }

    #[test]
    fn test_type_hint() {
        assert_eq!(type_hint("c0101e0001_top.MTRL"), "mtrl");
        assert_eq!(type_hint("archive.tar.gz"), "gz");
        assert_eq!(type_hint("README"), "");
        assert_eq!(type_hint(".hidden"), "");
    }
}
