//! NR integrity algorithms
//!
//! NIA1 (SNOW 3G, 128-NIA1), NIA2 (AES-CMAC, 128-NIA2) and NIA3 (ZUC,
//! 128-NIA3) as used for the RRC integrity protection the handover short
//! MAC-I is computed with.
//!
//! Reference: 3GPP TS 33.501 Annex D, TS 33.401 Annex B, TS 35.223

use aes::Aes128;
use cmac::{Cmac, Mac};
use zuc::eia3::Eia3Mac;

use crate::algorithm::IntegrityAlgorithm;
use crate::snow3g::uia2_f9;
use crate::CryptoError;

/// Key size in bytes (128 bits)
pub const KEY_SIZE: usize = 16;

/// MAC size in bytes (32 bits)
pub const MAC_SIZE: usize = 4;

/// Compute the 32-bit MAC of `data` with the given algorithm.
///
/// NIA0 yields an all-zero MAC.
pub fn compute_mac(
    algorithm: IntegrityAlgorithm,
    count: u32,
    bearer: u8,
    direction: u8,
    key: &[u8; KEY_SIZE],
    data: &[u8],
) -> Result<[u8; MAC_SIZE], CryptoError> {
    match algorithm {
        IntegrityAlgorithm::Nia0 => Ok([0u8; MAC_SIZE]),
        IntegrityAlgorithm::Nia1 => Ok(nia1_compute_mac(count, bearer, direction, key, data)),
        IntegrityAlgorithm::Nia2 => nia2_compute_mac(count, bearer, direction, key, data),
        IntegrityAlgorithm::Nia3 => Ok(nia3_compute_mac(count, bearer, direction, key, data)),
    }
}

/// 128-NIA1: UIA2 with `FRESH = BEARER || 0^27`.
pub fn nia1_compute_mac(
    count: u32,
    bearer: u8,
    direction: u8,
    key: &[u8; KEY_SIZE],
    data: &[u8],
) -> [u8; MAC_SIZE] {
    let fresh = u32::from(bearer & 0x1F) << 27;
    uia2_f9(key, count, fresh, direction, data, data.len() * 8).to_be_bytes()
}

/// Second header octet: BEARER in bits 7..3, DIRECTION in bit 2.
fn bearer_direction_octet(bearer: u8, direction: u8) -> u8 {
    ((bearer & 0x1F) << 3) | ((direction & 0x01) << 2)
}

/// 128-NIA2: AES-128-CMAC over `COUNT || BEARER || DIRECTION || 0^26 || MESSAGE`,
/// truncated to the first 32 bits.
pub fn nia2_compute_mac(
    count: u32,
    bearer: u8,
    direction: u8,
    key: &[u8; KEY_SIZE],
    data: &[u8],
) -> Result<[u8; MAC_SIZE], CryptoError> {
    let mut mac = Cmac::<Aes128>::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_SIZE,
    })?;
    mac.update(&count.to_be_bytes());
    mac.update(&[bearer_direction_octet(bearer, direction), 0, 0, 0]);
    mac.update(data);

    let tag = mac.finalize().into_bytes();
    let mut out = [0u8; MAC_SIZE];
    out.copy_from_slice(&tag[..MAC_SIZE]);
    Ok(out)
}

/// 128-NIA3 over a whole number of octets.
pub fn nia3_compute_mac(
    count: u32,
    bearer: u8,
    direction: u8,
    key: &[u8; KEY_SIZE],
    data: &[u8],
) -> [u8; MAC_SIZE] {
    nia3_compute_mac_bits(count, bearer, direction, key, data, data.len() * 8)
}

/// 128-NIA3 (EIA3) over the first `bit_len` bits of `data`.
///
/// `bit_len` must not exceed `data.len() * 8`.
pub fn nia3_compute_mac_bits(
    count: u32,
    bearer: u8,
    direction: u8,
    key: &[u8; KEY_SIZE],
    data: &[u8],
    bit_len: usize,
) -> [u8; MAC_SIZE] {
    Eia3Mac::compute(count, bearer, direction, key, data, bit_len).to_be_bytes()
}
