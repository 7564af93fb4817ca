// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Wallet configuration constants

/// Minimum PIN length
pub const PIN_MIN_LEN: usize = 4;

/// Maximum PIN length
pub const PIN_MAX_LEN: usize = 32;

/// PIN attempts before wipeout
pub const PIN_RETRIES: u8 = 3;

/// User confirmation timeout
pub const CONFIRM_TIMEOUT_MS: u32 = 20_000;

/// Minimum wallet seed length
pub const SEED_MIN_LEN: usize = 32;

/// Maximum wallet seed length
pub const SEED_MAX_LEN: usize = 64;

/// Maximum length of a script in a streamed transaction
pub const MAX_SCRIPT_LEN: u64 = 10_000;

/// Transaction display buffer size
pub const DISPLAY_BUFFER_LEN: usize = 256;

/// Default random response length
pub const DEFAULT_RANDOM_LEN: usize = 32;

/// Maximum random response length
pub const MAX_RANDOM_LEN: usize = 255;

/// Bitcoin P2PKH address version (mainnet)
pub const P2PKH_VERSION: u8 = 0x00;

/// Hardware architecture identifier
pub const ARCH: u8 = 0x01;

/// Firmware version from the package manifest
pub const VERSION: (u8, u8, u8) = (
    parse_u8(env!("CARGO_PKG_VERSION_MAJOR")),
    parse_u8(env!("CARGO_PKG_VERSION_MINOR")),
    parse_u8(env!("CARGO_PKG_VERSION_PATCH")),
);

const fn parse_u8(s: &str) -> u8 {
    let b = s.as_bytes();
    let mut v = 0u8;
    let mut i = 0;
    while i < b.len() {
        v = v * 10 + (b[i] - b'0');
        i += 1;
    }
    v
}
