//! Hashing and random-number pass-throughs
//!
//! Thin wrappers over the `sha1`, `sha2` and `rand` crates. Nothing here is
//! systems-design work; the functions exist so callers of the facility get
//! one consistent surface for digests and randomness.

use rand::{Rng, RngCore};
use sha1::{Digest, Sha1};
use sha2::Sha512;

/// SHA-1 digest of `data`.
pub fn sha1(data: &[u8]) -> [u8; 20] {
    let digest = Sha1::digest(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

/// SHA-512 digest of `data`.
pub fn sha512(data: &[u8]) -> [u8; 64] {
    let digest = Sha512::digest(data);
    let mut out = [0u8; 64];
    out.copy_from_slice(&digest);
    out
}

/// `count` bytes from the thread-local RNG.
pub fn random_bytes(count: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; count];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Uniform `u32` in `[floor, ceiling)`. Returns `floor` when the range is empty.
pub fn random_u32(floor: u32, ceiling: u32) -> u32 {
    if floor >= ceiling {
        return floor;
    }
    rand::thread_rng().gen_range(floor..ceiling)
}

/// Uniform `u16` in `[floor, ceiling)`. Returns `floor` when the range is empty.
pub fn random_u16(floor: u16, ceiling: u16) -> u16 {
    if floor >= ceiling {
        return floor;
    }
    rand::thread_rng().gen_range(floor..ceiling)
}

/// Uniform `u8` in `[floor, ceiling)`. Returns `floor` when the range is empty.
pub fn random_u8(floor: u8, ceiling: u8) -> u8 {
    if floor >= ceiling {
        return floor;
    }
    rand::thread_rng().gen_range(floor..ceiling)
}
