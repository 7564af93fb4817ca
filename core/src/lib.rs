// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Hardware wallet core
//!
//! This provides the protocol logic for a hardware wallet, exposed as a set
//! of applets answering ISO7816-4 APDUs: a Bitcoin [Engine][engine::Engine]
//! with trusted input generation and transaction signing, Ethereum and
//! Ripple signers, a symmetric key applet, a one time password applet, and a
//! firmware update [Bootloader][applets::bldr::Bootloader].
//!
//! Hardware access is abstracted via the [Driver][platform::Driver] trait
//! (persistent storage and user confirmation) and the
//! [Flash][applets::bldr::Flash] trait for the bootloader, see
//! [hw_wallet_apdu] for APDU objects and wire encodings.
//!
//! ## Operations
//!
//! Firmware builds route commands through a [Device][device::Device], which
//! handles `SELECT` and forwards everything else to the active applet.
//! Bootloader builds call [process_apdu][applet::process_apdu] directly.
//!
//! Every applet starts in the `Initialization` lifecycle, accepting only
//! `GetFirmwareVersion`, `GetRandom` and `Setup`. Once provisioned the
//! applet is `Operational` and requires `VerifyPin` before any key
//! operation. Exhausting the PIN retries wipes the applet.
//!
//! ### Signing a Bitcoin transaction
//!
//! 1. For each input, stream the previous transaction with `GetTrustedInput`
//!    to obtain a MAC authenticated [TrustedInput][apdu::trusted_input::TrustedInput]
//! 2. Issue `HashInputStart` with the trusted inputs, the input being signed
//!    carrying its script and all others an empty script
//! 3. Stream outputs with `HashInputFinalizeFull`, optionally preceded by a
//!    change path
//! 4. Issue `HashSign` with the signing key path, the user is asked to
//!    confirm the transaction once
//! 5. Repeat 2 and 4 (continuation) for the remaining inputs
//!

#![cfg_attr(not(feature = "std"), no_std)]

pub use hw_wallet_apdu::{self as apdu};

pub mod applet;

pub mod applets;

pub mod consts;

#[cfg(feature = "firmware")]
pub mod device;

#[cfg(feature = "firmware")]
pub mod engine;

mod error;
pub use error::Error;

pub mod helpers;

pub mod pin;

pub mod platform;

pub mod presence;

pub mod wallet;
