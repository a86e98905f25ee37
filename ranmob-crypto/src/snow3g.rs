//! SNOW 3G keystream generator and the UIA2 (f9) integrity function
//!
//! 128-NIA1 is UIA2 keyed with the RRC integrity key and FRESH built from
//! BEARER. Only the integrity side is needed here.
//!
//! Reference: ETSI/SAGE UEA2 & UIA2 Document 2, 3GPP TS 35.222

/// Rijndael S-box, used by S1
const SR: [u8; 256] = [
    0x63, 0x7c, 0x77, 0x7b, 0xf2, 0x6b, 0x6f, 0xc5, 0x30, 0x01, 0x67, 0x2b, 0xfe, 0xd7, 0xab, 0x76,
    0xca, 0x82, 0xc9, 0x7d, 0xfa, 0x59, 0x47, 0xf0, 0xad, 0xd4, 0xa2, 0xaf, 0x9c, 0xa4, 0x72, 0xc0,
    0xb7, 0xfd, 0x93, 0x26, 0x36, 0x3f, 0xf7, 0xcc, 0x34, 0xa5, 0xe5, 0xf1, 0x71, 0xd8, 0x31, 0x15,
    0x04, 0xc7, 0x23, 0xc3, 0x18, 0x96, 0x05, 0x9a, 0x07, 0x12, 0x80, 0xe2, 0xeb, 0x27, 0xb2, 0x75,
    0x09, 0x83, 0x2c, 0x1a, 0x1b, 0x6e, 0x5a, 0xa0, 0x52, 0x3b, 0xd6, 0xb3, 0x29, 0xe3, 0x2f, 0x84,
    0x53, 0xd1, 0x00, 0xed, 0x20, 0xfc, 0xb1, 0x5b, 0x6a, 0xcb, 0xbe, 0x39, 0x4a, 0x4c, 0x58, 0xcf,
    0xd0, 0xef, 0xaa, 0xfb, 0x43, 0x4d, 0x33, 0x85, 0x45, 0xf9, 0x02, 0x7f, 0x50, 0x3c, 0x9f, 0xa8,
    0x51, 0xa3, 0x40, 0x8f, 0x92, 0x9d, 0x38, 0xf5, 0xbc, 0xb6, 0xda, 0x21, 0x10, 0xff, 0xf3, 0xd2,
    0xcd, 0x0c, 0x13, 0xec, 0x5f, 0x97, 0x44, 0x17, 0xc4, 0xa7, 0x7e, 0x3d, 0x64, 0x5d, 0x19, 0x73,
    0x60, 0x81, 0x4f, 0xdc, 0x22, 0x2a, 0x90, 0x88, 0x46, 0xee, 0xb8, 0x14, 0xde, 0x5e, 0x0b, 0xdb,
    0xe0, 0x32, 0x3a, 0x0a, 0x49, 0x06, 0x24, 0x5c, 0xc2, 0xd3, 0xac, 0x62, 0x91, 0x95, 0xe4, 0x79,
    0xe7, 0xc8, 0x37, 0x6d, 0x8d, 0xd5, 0x4e, 0xa9, 0x6c, 0x56, 0xf4, 0xea, 0x65, 0x7a, 0xae, 0x08,
    0xba, 0x78, 0x25, 0x2e, 0x1c, 0xa6, 0xb4, 0xc6, 0xe8, 0xdd, 0x74, 0x1f, 0x4b, 0xbd, 0x8b, 0x8a,
    0x70, 0x3e, 0xb5, 0x66, 0x48, 0x03, 0xf6, 0x0e, 0x61, 0x35, 0x57, 0xb9, 0x86, 0xc1, 0x1d, 0x9e,
    0xe1, 0xf8, 0x98, 0x11, 0x69, 0xd9, 0x8e, 0x94, 0x9b, 0x1e, 0x87, 0xe9, 0xce, 0x55, 0x28, 0xdf,
    0x8c, 0xa1, 0x89, 0x0d, 0xbf, 0xe6, 0x42, 0x68, 0x41, 0x99, 0x2d, 0x0f, 0xb0, 0x54, 0xbb, 0x16,
];

/// S-box of S2
const SQ: [u8; 256] = [
    0x25, 0x24, 0x73, 0x67, 0xd7, 0xae, 0x5c, 0x30, 0xa4, 0xee, 0x6e, 0xcb, 0x7d, 0xb5, 0x82, 0xdb,
    0xe4, 0x8e, 0x48, 0x49, 0x4f, 0x5d, 0x6a, 0x78, 0x70, 0x88, 0xe8, 0x5f, 0x5e, 0x84, 0x65, 0xe2,
    0xd8, 0xe9, 0xcc, 0xed, 0x40, 0x2f, 0x11, 0x28, 0x57, 0xd2, 0xac, 0xe3, 0x4a, 0x15, 0x1b, 0xb9,
    0xb2, 0x80, 0x85, 0xa6, 0x2e, 0x02, 0x47, 0x29, 0x07, 0x4b, 0x0e, 0xc1, 0x51, 0xaa, 0x89, 0xd4,
    0xca, 0x01, 0x46, 0xb3, 0xef, 0xdd, 0x44, 0x7b, 0xc2, 0x7f, 0xbe, 0xc3, 0x9f, 0x20, 0x4c, 0x64,
    0x83, 0xa2, 0x68, 0x42, 0x13, 0xb4, 0x41, 0xcd, 0xba, 0xc6, 0xbb, 0x6d, 0x4d, 0x71, 0x21, 0xf4,
    0x8d, 0xb0, 0xe5, 0x93, 0xfe, 0x8f, 0xe6, 0xcf, 0x43, 0x45, 0x31, 0x22, 0x37, 0x36, 0x96, 0xfa,
    0xbc, 0x0f, 0x08, 0x52, 0x1d, 0x55, 0x1a, 0xc5, 0x4e, 0x23, 0x69, 0x7a, 0x92, 0xff, 0x5b, 0x5a,
    0xeb, 0x9a, 0x1c, 0xa9, 0xd1, 0x7e, 0x0d, 0xfc, 0x50, 0x8a, 0xb6, 0x62, 0xf5, 0x0a, 0xf8, 0xdc,
    0x03, 0x3c, 0x0c, 0x39, 0xf1, 0xb8, 0xf3, 0x3d, 0xf2, 0xd5, 0x97, 0x66, 0x81, 0x32, 0xa0, 0x00,
    0x06, 0xce, 0xf6, 0xea, 0xb7, 0x17, 0xf7, 0x8c, 0x79, 0xd6, 0xa7, 0xbf, 0x8b, 0x3f, 0x1f, 0x53,
    0x63, 0x75, 0x35, 0x2c, 0x60, 0xfd, 0x27, 0xd3, 0x94, 0xa5, 0x7c, 0xa1, 0x05, 0x58, 0x2d, 0xbd,
    0xd9, 0xc7, 0xaf, 0x6b, 0x54, 0x0b, 0xe0, 0x38, 0x04, 0xc8, 0x9d, 0xe7, 0x14, 0xb1, 0x87, 0x9c,
    0xdf, 0x6f, 0xf9, 0xda, 0x2a, 0xc4, 0x59, 0x16, 0x74, 0x91, 0xab, 0x26, 0x61, 0x76, 0x34, 0x2b,
    0xad, 0x99, 0xfb, 0x72, 0xec, 0x33, 0x12, 0xde, 0x98, 0x3b, 0xc0, 0x9b, 0x3e, 0x18, 0x10, 0x3a,
    0x56, 0xe1, 0x77, 0xc9, 0x1e, 0x9e, 0x95, 0xa3, 0x90, 0x19, 0xa8, 0x6c, 0x09, 0xd0, 0xf0, 0x86,
];
fn mul_x(v: u8, c: u8) -> u8 {
    if v & 0x80 != 0 {
        (v << 1) ^ c
    } else {
        v << 1
    }
}

fn mul_x_pow(mut v: u8, i: u32, c: u8) -> u8 {
    for _ in 0..i {
        v = mul_x(v, c);
    }
    v
}

fn mul_alpha(c: u8) -> u32 {
    u32::from_be_bytes([
        mul_x_pow(c, 23, 0xa9),
        mul_x_pow(c, 245, 0xa9),
        mul_x_pow(c, 48, 0xa9),
        mul_x_pow(c, 239, 0xa9),
    ])
}

fn div_alpha(c: u8) -> u32 {
    u32::from_be_bytes([
        mul_x_pow(c, 16, 0xa9),
        mul_x_pow(c, 39, 0xa9),
        mul_x_pow(c, 6, 0xa9),
        mul_x_pow(c, 64, 0xa9),
    ])
}

/// S-box substitution of each octet followed by the column mix over
/// GF(2^8) reduced by `c` (S1 with `SR`/0x1b, S2 with `SQ`/0x69).
fn substitute(w: u32, sbox: &[u8; 256], c: u8) -> u32 {
    let [a0, a1, a2, a3] = w.to_be_bytes().map(|b| sbox[usize::from(b)]);
    u32::from_be_bytes([
        mul_x(a0, c) ^ a1 ^ a2 ^ mul_x(a3, c) ^ a3,
        mul_x(a0, c) ^ a0 ^ mul_x(a1, c) ^ a2 ^ a3,
        a0 ^ mul_x(a1, c) ^ a1 ^ mul_x(a2, c) ^ a3,
        a0 ^ a1 ^ mul_x(a2, c) ^ a2 ^ mul_x(a3, c),
    ])
}

fn key_word(key: &[u8; 16], offset: usize) -> u32 {
    u32::from_be_bytes([key[offset], key[offset + 1], key[offset + 2], key[offset + 3]])
}

/// SNOW 3G in keystream mode.
pub struct Snow3g {
    lfsr: [u32; 16],
    r1: u32,
    r2: u32,
    r3: u32,
}

impl Snow3g {
    /// Loads `key` (most significant octet first) and `iv = [IV0, IV1, IV2, IV3]`,
    /// then runs the 32 initialisation clocks and the discarded first clock.
    pub fn new(key: &[u8; 16], iv: [u32; 4]) -> Self {
        let k = [key_word(key, 12), key_word(key, 8), key_word(key, 4), key_word(key, 0)];
        let ones = u32::MAX;
        let lfsr = [
            k[0] ^ ones,
            k[1] ^ ones,
            k[2] ^ ones,
            k[3] ^ ones,
            k[0],
            k[1],
            k[2],
            k[3],
            k[0] ^ ones,
            k[1] ^ ones ^ iv[3],
            k[2] ^ ones ^ iv[2],
            k[3] ^ ones,
            k[0] ^ iv[1],
            k[1],
            k[2],
            k[3] ^ iv[0],
        ];

        let mut snow = Self { lfsr, r1: 0, r2: 0, r3: 0 };
        for _ in 0..32 {
            let f = snow.clock_fsm();
            snow.clock_lfsr(f);
        }
        snow.clock_fsm();
        snow.clock_lfsr(0);
        snow
    }

    /// Next 32-bit keystream word.
    pub fn next_word(&mut self) -> u32 {
        let z = self.clock_fsm() ^ self.lfsr[0];
        self.clock_lfsr(0);
        z
    }

    fn clock_lfsr(&mut self, feedback: u32) {
        let s0 = self.lfsr[0];
        let s11 = self.lfsr[11];
        let v = (s0 << 8)
            ^ mul_alpha((s0 >> 24) as u8)
            ^ self.lfsr[2]
            ^ (s11 >> 8)
            ^ div_alpha((s11 & 0xff) as u8)
            ^ feedback;
        self.lfsr.copy_within(1.., 0);
        self.lfsr[15] = v;
    }

    fn clock_fsm(&mut self) -> u32 {
        let f = self.lfsr[15].wrapping_add(self.r1) ^ self.r2;
        let r = self.r2.wrapping_add(self.r3 ^ self.lfsr[5]);
        self.r3 = substitute(self.r2, &SQ, 0x69);
        self.r2 = substitute(self.r1, &SR, 0x1b);
        self.r1 = r;
        f
    }
}

fn mul64x(v: u64) -> u64 {
    if v >> 63 == 1 {
        (v << 1) ^ 0x1b
    } else {
        v << 1
    }
}

/// MUL64(V, P, 0x1b)
fn mul64(mut v: u64, p: u64) -> u64 {
    let mut result = 0;
    for i in 0..64 {
        if (p >> i) & 1 == 1 {
            result ^= v;
        }
        v = mul64x(v);
    }
    result
}

/// UIA2 (f9) over the first `bit_len` bits of `message`.
///
/// `bit_len` must not exceed `message.len() * 8`.
pub fn uia2_f9(key: &[u8; 16], count: u32, fresh: u32, direction: u8, message: &[u8], bit_len: usize) -> u32 {
    debug_assert!(bit_len <= message.len() * 8);
    let dir = u32::from(direction & 0x01);
    let mut snow = Snow3g::new(key, [fresh ^ (dir << 15), count ^ (dir << 31), fresh, count]);
    let z: [u32; 5] = std::array::from_fn(|_| snow.next_word());
    let p = (u64::from(z[0]) << 32) | u64::from(z[1]);
    let q = (u64::from(z[2]) << 32) | u64::from(z[3]);

    let mut eval = 0u64;
    for i in 0..bit_len.div_ceil(64) {
        let start = i * 8;
        let end = (start + 8).min(message.len());
        let mut chunk = [0u8; 8];
        chunk[..end - start].copy_from_slice(&message[start..end]);

        let mut block = u64::from_be_bytes(chunk);
        let remaining = bit_len - i * 64;
        if remaining < 64 {
            block &= !(u64::MAX >> remaining);
        }
        eval = mul64(eval ^ block, p);
    }

    eval ^= bit_len as u64;
    eval = mul64(eval, q);
    ((eval >> 32) as u32) ^ z[4]
}
