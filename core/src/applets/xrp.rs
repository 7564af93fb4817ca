// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Ripple applet

use encdec::DecodeOwned;
use rand_core::CryptoRngCore;
use sha2::{Digest, Sha512};

use crate::{
    apdu::{aid, command::Command, path::DerivationPath, response::Response, Instruction, WALLET_APDU_CLA},
    applet::{wallet_precheck, Applet, Session},
    consts::{CONFIRM_TIMEOUT_MS, SEED_MAX_LEN, SEED_MIN_LEN},
    helpers::{compressed_pubkey, der_encode, sign_low_s},
    platform::{AppletId, Driver, Request},
    wallet::{Lifecycle, Wallet},
    Error,
};

use super::{StreamHash, StreamSigner};

/// Single signing hash prefix (`STX\0`)
pub const HASH_PREFIX_TX_SIGN: [u8; 4] = [0x53, 0x54, 0x58, 0x00];

/// SHA-512-half over the signing prefix and transaction
pub struct Sha512Half(Sha512);

impl StreamHash for Sha512Half {
    fn new() -> Self {
        let mut h = Sha512::new();
        h.update(HASH_PREFIX_TX_SIGN);
        Self(h)
    }

    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }

    fn finalize(self) -> [u8; 32] {
        let d = self.0.finalize();

        let mut h = [0u8; 32];
        h.copy_from_slice(&d[..32]);
        h
    }
}

/// Ripple applet
#[derive(Default)]
pub struct Ripple {
    session: Session,
    tx: Option<StreamSigner<Sha512Half>>,
}

impl Ripple {
    pub const fn new() -> Self {
        Self {
            session: Session::new(),
            tx: None,
        }
    }
}

impl<DRV: Driver> Applet<DRV> for Ripple {
    const ID: AppletId = AppletId::Ripple;
    const CLA: u8 = WALLET_APDU_CLA;
    const AID: &'static [u8] = aid::XRP;

    fn precheck(&mut self, drv: &mut DRV) -> Result<Lifecycle, Error> {
        wallet_precheck(drv, AppletId::Ripple, &mut self.session.pin)
    }

    fn handle<RNG: CryptoRngCore>(
        &mut self,
        drv: &mut DRV,
        rng: &mut RNG,
        lifecycle: Lifecycle,
        cmd: &Command,
        resp: &mut Response,
    ) -> Result<(), Error> {
        if self.session.handle(
            AppletId::Ripple,
            drv,
            rng,
            lifecycle,
            cmd,
            resp,
            SEED_MIN_LEN..=SEED_MAX_LEN,
        )? {
            return Ok(());
        }

        self.session.check(lifecycle)?;

        match Instruction::try_from(cmd.ins) {
            Ok(Instruction::GetPublicKey) => {
                let (path, _) = DerivationPath::decode_owned(cmd.data)?;
                let xprv = Wallet::new(drv, AppletId::Ripple).derive(path.elements())?;

                resp.push(&compressed_pubkey(xprv.private_key()))?;
                Ok(())
            }
            Ok(Instruction::SignTransaction) => {
                let (path, digest) =
                    match StreamSigner::update(&mut self.tx, cmd.p1, cmd.p2, cmd.data)? {
                        Some(v) => v,
                        None => return Ok(()),
                    };

                drv.confirm(
                    &Request::Sign {
                        applet: AppletId::Ripple,
                        digest: &digest,
                    },
                    CONFIRM_TIMEOUT_MS,
                )
                .check()?;

                let xprv = Wallet::new(drv, AppletId::Ripple).derive(path.elements())?;
                let sig = sign_low_s(xprv.private_key(), &digest)?;

                resp.push(&der_encode(&sig)?)?;
                Ok(())
            }
            _ => Err(Error::UnsupportedInstruction),
        }
    }

    fn reset(&mut self) {
        self.session.reset();
        self.tx = None;
    }
}

#[cfg(test)]
mod test {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn signing_hash_is_prefixed() {
        let mut h = Sha512Half::new();
        h.update(&hex!("1200002280000000"));

        let mut expected = Sha512::new();
        expected.update(hex!("535458001200002280000000"));
        let expected = expected.finalize();

        assert_eq!(&h.finalize()[..], &expected[..32]);
    }

    #[test]
    fn sha512_half_empty() {
        let h = Sha512::digest(b"");
        assert_eq!(
            &h[..32],
            &hex!("cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce")
        );
    }
}
