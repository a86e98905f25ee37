//! Identity types shared by every ranmob crate: PLMN, cell identities, UE ids.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Internal UE identifier, unique within one gNB.
pub type UeId = i32;

/// Physical cell identity (locally unique, 0..=1007).
pub type Pci = u16;

/// Absolute radio frequency channel number of a downlink carrier.
pub type Arfcn = u32;

/// Cell radio network temporary identifier.
pub type CRnti = u16;

/// Reserved value marking "no C-RNTI".
pub const INVALID_CRNTI: CRnti = 0;

/// Highest valid physical cell identity.
pub const MAX_PCI: Pci = 1007;

/// Public Land Mobile Network identifier.
///
/// `long_mnc` selects a 3-digit MNC encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Plmn {
    /// Mobile Country Code
    pub mcc: u16,
    /// Mobile Network Code
    pub mnc: u16,
    /// True if MNC is 3 digits
    #[serde(default)]
    pub long_mnc: bool,
}

impl Plmn {
    pub const fn new(mcc: u16, mnc: u16, long_mnc: bool) -> Self {
        Self { mcc, mnc, long_mnc }
    }

    /// Encodes the PLMN as the 3-octet TBCD form used in N2 IEs.
    pub fn encode(&self) -> [u8; 3] {
        let digit = |v: u16, div: u16| ((v / div) % 10) as u8;
        let mnc3 = if self.long_mnc { digit(self.mnc, 1) } else { 0x0F };
        let (mnc1, mnc2) = if self.long_mnc {
            (digit(self.mnc, 100), digit(self.mnc, 10))
        } else {
            (digit(self.mnc, 10), digit(self.mnc, 1))
        };

        [
            (digit(self.mcc, 10) << 4) | digit(self.mcc, 100),
            (mnc3 << 4) | digit(self.mcc, 1),
            (mnc2 << 4) | mnc1,
        ]
    }

    /// Decodes the 3-octet TBCD form.
    pub fn decode(bytes: [u8; 3]) -> Self {
        let lo = |b: u8| (b & 0x0F) as u16;
        let hi = |b: u8| (b >> 4) as u16;

        let mcc = 100 * lo(bytes[0]) + 10 * hi(bytes[0]) + lo(bytes[1]);
        let mnc12 = 10 * lo(bytes[2]) + hi(bytes[2]);
        if hi(bytes[1]) == 0x0F {
            Self::new(mcc, mnc12, false)
        } else {
            Self::new(mcc, 10 * mnc12 + hi(bytes[1]), true)
        }
    }
}

impl fmt::Debug for Plmn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Plmn({self})")
    }
}

impl fmt::Display for Plmn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.long_mnc {
            write!(f, "{:03}-{:03}", self.mcc, self.mnc)
        } else {
            write!(f, "{:03}-{:02}", self.mcc, self.mnc)
        }
    }
}

/// Globally unique cell identity: owning gNB id plus the gNB-local cell id.
///
/// Packed form is the 28-bit cell identity `gnb_id << 8 | cell_id`, so the
/// gNB id occupies at most 20 bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalCellId {
    pub gnb_id: u32,
    pub cell_id: u8,
}

impl GlobalCellId {
    /// Mask of the 28-bit packed cell identity
    pub const ECI_MASK: u32 = 0x0FFF_FFFF;

    pub const fn new(gnb_id: u32, cell_id: u8) -> Self {
        Self { gnb_id, cell_id }
    }

    /// Splits a packed 28-bit cell identity.
    pub const fn from_eci(eci: u32) -> Self {
        let eci = eci & Self::ECI_MASK;
        Self {
            gnb_id: eci >> 8,
            cell_id: (eci & 0xFF) as u8,
        }
    }

    /// Packs into the 28-bit cell identity.
    pub const fn eci(&self) -> u32 {
        ((self.gnb_id << 8) | self.cell_id as u32) & Self::ECI_MASK
    }

    /// True if both cells are served by the same gNB.
    pub fn same_gnb(&self, other: &GlobalCellId) -> bool {
        self.gnb_id == other.gnb_id
    }
}

impl fmt::Debug for GlobalCellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cell({:#x}/{})", self.gnb_id, self.cell_id)
    }
}

impl fmt::Display for GlobalCellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#09x}", self.eci())
    }
}
