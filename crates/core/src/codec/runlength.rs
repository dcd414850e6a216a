//! RunLength stream decoder.

use crate::error::Result;

/// Decode RunLength-encoded data.
///
/// Format:
/// - Length byte 0-127: copy next (length + 1) bytes literally
/// - Length byte 128: end of data
/// - Length byte 129-255: repeat next byte (257 - length) times
///
/// Truncated input is tolerated: decoding stops at the point the stream
/// runs short.
pub fn rldecode(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;
        match length {
            128 => break,
            0..=127 => {
                let count = length as usize + 1;
                if i + count <= data.len() {
                    result.extend_from_slice(&data[i..i + count]);
                    i += count;
                }
            }
            129..=255 => {
                if i < data.len() {
                    let count = 257 - length as usize;
                    let byte = data[i];
                    i += 1;
                    result.extend(std::iter::repeat_n(byte, count));
                }
            }
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rldecode() {
        // 2+1 literal bytes, then 'x' repeated 257-254=3 times, then EOD
        let data = [2u8, b'a', b'b', b'c', 254, b'x', 128, b'z'];
        assert_eq!(rldecode(&data).unwrap(), b"abcxxx");
    }
}
