// Copyright (c) 2022-2023 The MobileCoin Foundation

//! One time password applet
//!
//! Counter based codes per RFC 4226 with HMAC-SHA256 in place of SHA-1.
//! The counter is advanced and persisted before a code is released, so a
//! code is never issued twice even across power loss.

use hmac::{Hmac, Mac};
use rand_core::CryptoRngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{
    apdu::{aid, command::Command, response::Response, Instruction, SECRET_APDU_CLA},
    applet::{wallet_precheck, Applet, Session},
    platform::{AppletId, Storage},
    wallet::{Lifecycle, Wallet},
    Error,
};

/// Minimum HMAC secret length
pub const SECRET_MIN_LEN: usize = 16;

/// Maximum HMAC secret length
pub const SECRET_MAX_LEN: usize = 64;

/// Compute an HOTP value with the requested number of digits
pub fn hotp(secret: &[u8], counter: u64, digits: u8) -> Result<u32, Error> {
    if !(6..=8).contains(&digits) {
        return Err(Error::InvalidParameters);
    }

    let mut mac =
        <Hmac<Sha256> as Mac>::new_from_slice(secret).map_err(|_| Error::InvalidLength)?;
    mac.update(&counter.to_be_bytes());
    let h = mac.finalize().into_bytes();

    // Dynamic truncation
    let offset = (h[h.len() - 1] & 0x0f) as usize;
    let bin = u32::from_be_bytes([h[offset], h[offset + 1], h[offset + 2], h[offset + 3]])
        & 0x7fff_ffff;

    Ok(bin % 10u32.pow(digits as u32))
}

/// One time password applet
#[derive(Default)]
pub struct Otp {
    session: Session,
}

impl Otp {
    pub const fn new() -> Self {
        Self {
            session: Session::new(),
        }
    }

    fn get_code<S: Storage>(&mut self, store: &mut S, digits: u8) -> Result<u32, Error> {
        if !(6..=8).contains(&digits) {
            return Err(Error::InvalidParameters);
        }

        let mut w = Wallet::new(store, AppletId::Otp);

        let counter = w.counter()?.checked_add(1).ok_or(Error::InvalidState)?;
        w.set_counter(counter)?;

        let mut secret = [0u8; SECRET_MAX_LEN];
        let n = w.secret(&mut secret)?;

        let r = hotp(&secret[..n], counter, digits);
        secret.zeroize();

        #[cfg(feature = "log")]
        log::debug!("issued OTP for counter {}", counter);

        r
    }
}

impl<S: Storage> Applet<S> for Otp {
    const ID: AppletId = AppletId::Otp;
    const CLA: u8 = SECRET_APDU_CLA;
    const AID: &'static [u8] = aid::OTP;

    fn precheck(&mut self, store: &mut S) -> Result<Lifecycle, Error> {
        wallet_precheck(store, AppletId::Otp, &mut self.session.pin)
    }

    fn handle<RNG: CryptoRngCore>(
        &mut self,
        store: &mut S,
        rng: &mut RNG,
        lifecycle: Lifecycle,
        cmd: &Command,
        resp: &mut Response,
    ) -> Result<(), Error> {
        if self.session.handle(
            AppletId::Otp,
            store,
            rng,
            lifecycle,
            cmd,
            resp,
            SECRET_MIN_LEN..=SECRET_MAX_LEN,
        )? {
            return Ok(());
        }

        self.session.check(lifecycle)?;

        match Instruction::try_from(cmd.ins) {
            Ok(Instruction::GetCode) => {
                let code = self.get_code(store, cmd.p1)?;
                resp.push(&code.to_be_bytes())?;
                Ok(())
            }
            _ => Err(Error::UnsupportedInstruction),
        }
    }

    fn reset(&mut self) {
        self.session.reset();
    }
}
