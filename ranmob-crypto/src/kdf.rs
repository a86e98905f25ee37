//! Key derivation functions for AS security across handover
//!
//! Implements the generic KDF of 3GPP TS 33.220 Annex B and the derivations
//! of TS 33.501 Annex A that a gNB needs during mobility:
//! - KgNB* from KgNB or NH (A.11/A.12), horizontal and vertical key change
//! - NH from KAMF (A.10), the vertical chain
//! - RRC/UP cipher and integrity keys from KgNB (A.8)

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// HMAC-SHA256 output size in bytes
pub const HMAC_SHA256_SIZE: usize = 32;

/// Key size for 256-bit keys
pub const KEY_256_SIZE: usize = 32;

/// Key size for 128-bit keys
pub const KEY_128_SIZE: usize = 16;

/// FC values used by the mobility derivations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FcValue {
    /// FC = 0x69: algorithm key derivation (RRC/UP keys)
    AlgorithmKey = 0x69,
    /// FC = 0x6F: NH derivation
    Nh = 0x6F,
    /// FC = 0x70: KgNB* derivation for handover
    KgnbStar = 0x70,
}

/// Algorithm type distinguisher (TS 33.501 A.8)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlgorithmTypeDistinguisher {
    RrcEnc = 0x03,
    RrcInt = 0x04,
    UpEnc = 0x05,
    UpInt = 0x06,
}

/// Compute HMAC-SHA256.
pub fn hmac_sha256(key: &[u8], input: &[u8]) -> [u8; HMAC_SHA256_SIZE] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts keys of any size"));
    mac.update(input);
    mac.finalize().into_bytes().into()
}

/// Generic KDF of TS 33.220 Annex B.
///
/// `S = FC || P0 || L0 || ... || Pn || Ln`, each `Li` the 2-octet big-endian
/// length of `Pi`; output is `HMAC-SHA-256(key, S)`.
pub fn calculate_kdf_key(key: &[u8; KEY_256_SIZE], fc: u8, parameters: &[&[u8]]) -> [u8; KEY_256_SIZE] {
    let capacity = 1 + parameters.iter().map(|p| p.len() + 2).sum::<usize>();
    let mut s = Vec::with_capacity(capacity);
    s.push(fc);

    for param in parameters {
        s.extend_from_slice(param);
        s.extend_from_slice(&(param.len() as u16).to_be_bytes());
    }

    hmac_sha256(key, &s)
}

/// Derive KgNB* for a handover to the cell with `pci` on `dl_arfcn`.
///
/// `key` is the current KgNB for a horizontal key change, or the NH received
/// from the core network for a vertical one.
///
/// `KgNB* = KDF(key, 0x70, PCI, ARFCN-DL)`; PCI is 2 octets and ARFCN-DL is
/// 3 octets, both big-endian.
pub fn derive_kgnb_star(key: &[u8; KEY_256_SIZE], pci: u16, dl_arfcn: u32) -> [u8; KEY_256_SIZE] {
    let pci_bytes = pci.to_be_bytes();
    let arfcn_bytes = dl_arfcn.to_be_bytes();

    calculate_kdf_key(key, FcValue::KgnbStar as u8, &[&pci_bytes, &arfcn_bytes[1..]])
}

/// Derive NH from KAMF and a sync input (the initial KgNB or the previous NH).
pub fn derive_nh(kamf: &[u8; KEY_256_SIZE], sync_input: &[u8; KEY_256_SIZE]) -> [u8; KEY_256_SIZE] {
    calculate_kdf_key(kamf, FcValue::Nh as u8, &[sync_input])
}

/// Derive an RRC or UP key from KgNB.
///
/// Returns the least significant 128 bits of the KDF output.
pub fn derive_algorithm_key(
    kgnb: &[u8; KEY_256_SIZE],
    algorithm_type: AlgorithmTypeDistinguisher,
    algorithm_id: u8,
) -> [u8; KEY_128_SIZE] {
    let output = calculate_kdf_key(
        kgnb,
        FcValue::AlgorithmKey as u8,
        &[&[algorithm_type as u8], &[algorithm_id]],
    );

    let mut key = [0u8; KEY_128_SIZE];
    key.copy_from_slice(&output[KEY_128_SIZE..]);
    key
}
