// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Prelude to simplify downstream use of APDU objects
//!

pub use crate::{
    app_info::{AppFlags, FirmwareVersion, FirmwareVersionReq},
    bldr::ImageInfo,
    btc::{HashSignReq, TrustedInputStart, WalletPublicKeyReq, WalletPublicKeyResp},
    command::Command,
    path::DerivationPath,
    response::Response,
    setup::SetupReq,
    status::StatusWord,
    trusted_input::TrustedInput,
    ApduError, ApduStatic, Instruction,
};
