//! CRC16 checksums
//!
//! XMODEM (poly 0x1021, init 0, no reflection) is the Redis Cluster slot hash.
//! The reflected ARC variant is kept for legacy callers.

use crc::{Crc, CRC_16_ARC, CRC_16_XMODEM};

/// Number of hash slots in a Redis Cluster
pub const TOTAL_SLOTS: u32 = 16384;

static XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);
static ARC: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// CRC16/XMODEM over raw bytes or UTF-8 text
pub fn xmodem(data: impl AsRef<[u8]>) -> u16 {
    XMODEM.checksum(data.as_ref())
}

/// Legacy CRC16 (ARC: poly 0x8005 reflected, init 0)
pub fn crc16(data: impl AsRef<[u8]>) -> u16 {
    ARC.checksum(data.as_ref())
}

/// Redis Cluster slot of an already extracted hash key
pub fn slot_for_key(hash_key: impl AsRef<[u8]>) -> u32 {
    xmodem(hash_key) as u32 % TOTAL_SLOTS
}
