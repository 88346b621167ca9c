//! Checksums used by the TON wire formats.

use crc::{CRC_16_XMODEM, CRC_32_ISCSI, Crc};

const XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);
const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Guards user-friendly addresses.
pub(crate) fn crc16_xmodem(data: &[u8]) -> u16 {
    XMODEM.checksum(data)
}

/// CRC-32C trailer of a bag of cells.
pub(crate) fn crc32c(data: &[u8]) -> u32 {
    CASTAGNOLI.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16_xmodem(b"123456789"), 0x31C3);
        assert_eq!(crc16_xmodem(b""), 0);
    }

    #[test]
    fn test_crc32c_check_value() {
        assert_eq!(crc32c(b"123456789"), 0xE306_9283);
        assert_eq!(crc32c(b""), 0);
    }
}
