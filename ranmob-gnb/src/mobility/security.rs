//! Security context derivation for handover
//!
//! Pure functions. Horizontal derivation chains from the current KgNB and is
//! used for intra-gNB handover. Vertical derivation starts from the NH the
//! core network forwarded to the target and adopts the forwarded NCC. Both
//! re-derive the RRC and UP keys for the negotiated algorithms.

use ranmob_common::{Arfcn, Pci};
use ranmob_crypto::kdf::{derive_algorithm_key, derive_kgnb_star, AlgorithmTypeDistinguisher};
use ranmob_crypto::nia::compute_mac;
use ranmob_crypto::CryptoError;
use ranmob_rrc::{SecurityAlgorithmConfig, VarShortMacInput};

use crate::ue_context::UeSecurityContext;

/// COUNT input of the short MAC-I computation
pub const SHORT_MAC_COUNT: u32 = 0xFFFF_FFFF;
/// BEARER input of the short MAC-I computation
pub const SHORT_MAC_BEARER: u8 = 0x1F;
/// DIRECTION input of the short MAC-I computation
pub const SHORT_MAC_DIRECTION: u8 = 1;

/// RRC and UP keys derived from KgNB.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct AsKeys {
    pub k_rrc_enc: [u8; 16],
    pub k_rrc_int: [u8; 16],
    pub k_up_enc: [u8; 16],
    pub k_up_int: [u8; 16],
}

impl std::fmt::Debug for AsKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AsKeys(..)")
    }
}

pub fn derive_as_keys(kgnb: &[u8; 32], algorithms: &SecurityAlgorithmConfig) -> AsKeys {
    let enc = algorithms.ciphering.id();
    let int = algorithms.integrity.id();
    AsKeys {
        k_rrc_enc: derive_algorithm_key(kgnb, AlgorithmTypeDistinguisher::RrcEnc, enc),
        k_rrc_int: derive_algorithm_key(kgnb, AlgorithmTypeDistinguisher::RrcInt, int),
        k_up_enc: derive_algorithm_key(kgnb, AlgorithmTypeDistinguisher::UpEnc, enc),
        k_up_int: derive_algorithm_key(kgnb, AlgorithmTypeDistinguisher::UpInt, int),
    }
}

/// Horizontal key change towards the cell `target_pci` on `target_arfcn`.
///
/// NH and NCC are carried over unchanged.
pub fn derive_horizontal(
    current: &UeSecurityContext,
    target_pci: Pci,
    target_arfcn: Arfcn,
) -> UeSecurityContext {
    let kgnb = derive_kgnb_star(&current.kgnb, target_pci, target_arfcn);
    UeSecurityContext {
        kgnb,
        nh: current.nh,
        ncc: current.ncc,
        algorithms: current.algorithms,
        keys: derive_as_keys(&kgnb, &current.algorithms),
    }
}

/// Vertical key change from the NH/NCC pair forwarded by the core network.
pub fn derive_vertical(
    nh: &[u8; 32],
    ncc: u8,
    algorithms: SecurityAlgorithmConfig,
    target_pci: Pci,
    target_arfcn: Arfcn,
) -> UeSecurityContext {
    let kgnb = derive_kgnb_star(nh, target_pci, target_arfcn);
    UeSecurityContext {
        kgnb,
        nh: *nh,
        ncc: ncc & 0x07,
        algorithms,
        keys: derive_as_keys(&kgnb, &algorithms),
    }
}

/// Short MAC-I over `input`, keyed with the RRC integrity key in use before
/// the handover. Returns the 16 least significant bits of the MAC.
pub fn compute_short_mac_i(
    security: &UeSecurityContext,
    input: &VarShortMacInput,
) -> Result<u16, CryptoError> {
    let mac = compute_mac(
        security.algorithms.integrity,
        SHORT_MAC_COUNT,
        SHORT_MAC_BEARER,
        SHORT_MAC_DIRECTION,
        &security.keys.k_rrc_int,
        &input.encode(),
    )?;
    Ok(u16::from_be_bytes([mac[2], mac[3]]))
}
