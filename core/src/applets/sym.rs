// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Symmetric key applet
//!
//! Holds a single AES-256 key, used for raw block encryption and
//! HMAC-SHA256 authentication of host supplied data.

use aes::{
    cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, NewBlockCipher},
    Aes256,
};
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

/// AES-256 key length
pub const KEY_LEN: usize = 32;

/// AES block size
pub const BLOCK_LEN: usize = 16;

#[derive(Copy, Clone, PartialEq, Debug)]
enum Direction {
    Encrypt,
    Decrypt,
}

/// ECB encrypt / decrypt `buff` in place
fn crypt(key: &[u8; KEY_LEN], dir: Direction, buff: &mut [u8]) -> Result<(), Error> {
    if buff.len() % BLOCK_LEN != 0 {
        return Err(Error::InvalidLength);
    }

    let cipher = Aes256::new(GenericArray::from_slice(key));

    for block in buff.chunks_exact_mut(BLOCK_LEN) {
        let b = GenericArray::from_mut_slice(block);
        match dir {
            Direction::Encrypt => cipher.encrypt_block(b),
            Direction::Decrypt => cipher.decrypt_block(b),
        }
    }

    Ok(())
}

/// Symmetric key applet
#[derive(Default)]
pub struct Symmetric {
    session: Session,
}

impl Symmetric {
    pub const fn new() -> Self {
        Self {
            session: Session::new(),
        }
    }

    fn key<S: Storage>(store: &mut S) -> Result<[u8; KEY_LEN], Error> {
        let mut key = [0u8; KEY_LEN];
        match Wallet::new(store, AppletId::Symmetric).secret(&mut key)? {
            KEY_LEN => Ok(key),
            _ => Err(Error::Tampered),
        }
    }
}

impl<S: Storage> Applet<S> for Symmetric {
    const ID: AppletId = AppletId::Symmetric;
    const CLA: u8 = SECRET_APDU_CLA;
    const AID: &'static [u8] = aid::SYM;

    fn precheck(&mut self, store: &mut S) -> Result<Lifecycle, Error> {
        wallet_precheck(store, AppletId::Symmetric, &mut self.session.pin)
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
            AppletId::Symmetric,
            store,
            rng,
            lifecycle,
            cmd,
            resp,
            KEY_LEN..=KEY_LEN,
        )? {
            return Ok(());
        }

        self.session.check(lifecycle)?;

        let dir = match Instruction::try_from(cmd.ins) {
            Ok(Instruction::Encrypt) => Direction::Encrypt,
            Ok(Instruction::Decrypt) => Direction::Decrypt,
            Ok(Instruction::Mac) => {
                let mut key = Self::key(store)?;
                let mac = <Hmac<Sha256> as Mac>::new_from_slice(&key)
                    .map_err(|_| Error::InvalidLength);
                key.zeroize();

                let mut mac = mac?;
                mac.update(cmd.data);
                resp.push(&mac.finalize().into_bytes())?;

                return Ok(());
            }
            _ => return Err(Error::UnsupportedInstruction),
        };

        let n = cmd.data.len();
        let out = resp.tail();
        if out.len() < n {
            return Err(Error::InvalidLength);
        }
        out[..n].copy_from_slice(cmd.data);

        let mut key = Self::key(store)?;
        let r = crypt(&key, dir, &mut out[..n]);
        key.zeroize();
        r?;

        resp.advance(n)?;

        Ok(())
    }

    fn reset(&mut self) {
        self.session.reset();
    }
}
