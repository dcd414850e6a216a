//! LZW stream decoder using the weezl crate.

use weezl::{BitOrder, decode::Decoder};

use crate::error::Result;

/// Decode LZW-encoded data (PDF variant: MSB first, 8-bit).
pub fn lzwdecode(data: &[u8]) -> Result<Vec<u8>> {
    lzwdecode_with_earlychange(data, 1)
}

/// Decode LZW-encoded data with an explicit EarlyChange setting.
///
/// EarlyChange=1 is the PDF default; EarlyChange=0 uses TIFF size
/// switching.
pub fn lzwdecode_with_earlychange(data: &[u8], early_change: i32) -> Result<Vec<u8>> {
    let mut decoder = if early_change == 0 {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        Decoder::new(BitOrder::Msb, 8)
    };
    let mut output = Vec::new();
    // lenient: keep partial output on corrupt data
    let _ = decoder.into_vec(&mut output).decode(data);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lzw_decode() {
        // canonical PDF reference sample for "-----A---B"
        let data = [0x80, 0x0B, 0x60, 0x50, 0x22, 0x0C, 0x0C, 0x85, 0x01];
        assert_eq!(lzwdecode(&data).unwrap(), b"\x2d\x2d\x2d\x2d\x2d\x41\x2d\x2d\x2d\x42");
    }
}
