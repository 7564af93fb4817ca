// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Ethereum applet
//!
//! Transactions are streamed as RLP bytes and hashed with Keccak-256, the
//! device signs the digest without decoding the transaction.

use encdec::DecodeOwned;
use k256::ecdsa::{signature::hazmat::PrehashSigner, RecoveryId, Signature, SigningKey};
use rand_core::CryptoRngCore;
use tiny_keccak::{Hasher, Keccak};

use crate::{
    apdu::{aid, command::Command, path::DerivationPath, response::Response, Instruction, WALLET_APDU_CLA},
    applet::{wallet_precheck, Applet, Session},
    consts::{CONFIRM_TIMEOUT_MS, SEED_MAX_LEN, SEED_MIN_LEN},
    helpers::{hex_str, uncompressed_pubkey},
    platform::{AppletId, Driver, Request},
    wallet::{Lifecycle, Wallet},
    Error,
};

use super::{StreamHash, StreamSigner};

/// P1 (GetPublicKey): display address for confirmation
pub const P1_DISPLAY_ADDRESS: u8 = 0x01;

/// Keccak-256 digest
pub struct Keccak256(Keccak);

impl StreamHash for Keccak256 {
    fn new() -> Self {
        Self(Keccak::v256())
    }

    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self) -> [u8; 32] {
        let mut d = [0u8; 32];
        self.0.finalize(&mut d);
        d
    }
}

/// Ethereum address (last 20 bytes of the Keccak-256 of the public key)
pub fn address(public_key: &[u8; 65]) -> [u8; 20] {
    let mut h = Keccak256::new();
    h.update(&public_key[1..]);
    let d = h.finalize();

    let mut a = [0u8; 20];
    a.copy_from_slice(&d[12..]);
    a
}

/// Recoverable low-S signature, encoded as `v ‖ r ‖ s` with `v = 27 + parity`
pub fn sign_recoverable(key: &SigningKey, digest: &[u8; 32]) -> Result<[u8; 65], Error> {
    let (sig, recid): (Signature, RecoveryId) = key
        .sign_prehash_recoverable(digest)
        .map_err(|_| Error::SignError)?;

    // Normalising s flips the parity of the recovered point
    let (sig, recid) = match sig.normalize_s() {
        Some(n) => (n, RecoveryId::new(!recid.is_y_odd(), recid.is_x_reduced())),
        None => (sig, recid),
    };

    let mut out = [0u8; 65];
    out[0] = 27 + recid.to_byte();
    out[1..].copy_from_slice(&sig.to_bytes());
    Ok(out)
}

/// Ethereum applet
#[derive(Default)]
pub struct Ethereum {
    session: Session,
    tx: Option<StreamSigner<Keccak256>>,
}

impl Ethereum {
    pub const fn new() -> Self {
        Self {
            session: Session::new(),
            tx: None,
        }
    }

    fn get_public_key<DRV: Driver>(
        &mut self,
        drv: &mut DRV,
        cmd: &Command,
        resp: &mut Response,
    ) -> Result<(), Error> {
        let display = match cmd.p1 {
            0x00 => false,
            P1_DISPLAY_ADDRESS => true,
            _ => return Err(Error::InvalidParameters),
        };

        let (path, _) = DerivationPath::decode_owned(cmd.data)?;
        let xprv = Wallet::new(drv, AppletId::Ethereum).derive(path.elements())?;

        let public_key = uncompressed_pubkey(xprv.private_key());
        let mut buff = [0u8; 40];
        let addr = hex_str(&address(&public_key), &mut buff)?;

        if display {
            drv.confirm(&Request::Address(addr), CONFIRM_TIMEOUT_MS)
                .check()?;
        }

        resp.push(&[public_key.len() as u8])?;
        resp.push(&public_key)?;
        resp.push(&[addr.len() as u8])?;
        resp.push(addr.as_bytes())?;

        Ok(())
    }

    fn sign_transaction<DRV: Driver>(
        &mut self,
        drv: &mut DRV,
        cmd: &Command,
        resp: &mut Response,
    ) -> Result<(), Error> {
        let (path, digest) = match StreamSigner::update(&mut self.tx, cmd.p1, cmd.p2, cmd.data)? {
            Some(v) => v,
            None => return Ok(()),
        };

        drv.confirm(
            &Request::Sign {
                applet: AppletId::Ethereum,
                digest: &digest,
            },
            CONFIRM_TIMEOUT_MS,
        )
        .check()?;

        let xprv = Wallet::new(drv, AppletId::Ethereum).derive(path.elements())?;
        let sig = sign_recoverable(xprv.private_key(), &digest)?;

        resp.push(&sig)?;

        Ok(())
    }
}

impl<DRV: Driver> Applet<DRV> for Ethereum {
    const ID: AppletId = AppletId::Ethereum;
    const CLA: u8 = WALLET_APDU_CLA;
    const AID: &'static [u8] = aid::ETH;

    fn precheck(&mut self, drv: &mut DRV) -> Result<Lifecycle, Error> {
        wallet_precheck(drv, AppletId::Ethereum, &mut self.session.pin)
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
            AppletId::Ethereum,
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
            Ok(Instruction::GetPublicKey) => self.get_public_key(drv, cmd, resp),
            Ok(Instruction::SignTransaction) => self.sign_transaction(drv, cmd, resp),
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
    use k256::ecdsa::VerifyingKey;

    use super::*;
    use crate::helpers::derive_key;

    #[test]
    fn keccak_empty() {
        assert_eq!(
            Keccak256::new().finalize(),
            hex!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
        );
    }

    #[test]
    fn address_from_key() {
        // Private key 1
        let key = SigningKey::from_bytes(&hex!("0000000000000000000000000000000000000000000000000000000000000001").into()).unwrap();

        assert_eq!(
            address(&uncompressed_pubkey(&key)),
            hex!("7e5f4552091a69125d5dfcb7b8c2659029395bdf")
        );
    }

    #[test]
    fn recoverable_signature() {
        let key = derive_key(&[0x5a; 32], &[44 | (1 << 31), 60 | (1 << 31), 1 << 31, 0, 0]).unwrap();
        let digest = [0x42; 32];

        let sig = sign_recoverable(&key, &digest).unwrap();
        assert!(sig[0] == 27 || sig[0] == 28);

        let s = Signature::from_slice(&sig[1..]).unwrap();
        assert!(s.normalize_s().is_none());

        let recid = RecoveryId::from_byte(sig[0] - 27).unwrap();
        let recovered = VerifyingKey::recover_from_prehash(&digest, &s, recid).unwrap();
        assert_eq!(&recovered, key.verifying_key());
    }
}
