// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Persistent wallet state, lifecycle and wipeout
//!
//! Each applet owns a namespace of [Storage] files. Wallet lifecycle is
//! `Initialization` (no secrets) until `Setup` installs a secret and PIN,
//! then `Operational` until a wipeout returns it to `Initialization`.
//!
//! Wipeout sets a persistent flag before erasing anything and clears it
//! last, a wipe interrupted by power loss is resumed by [Wallet::precheck]
//! before any further command is processed.

use bip32::XPrv;
use strum::{Display, EnumString};
use zeroize::Zeroize;

use crate::{
    consts::{PIN_RETRIES, SEED_MAX_LEN},
    helpers::derive_xprv,
    platform::{AppletId, File, Slot, Storage},
    Error,
};

/// Wallet lifecycle state
#[derive(Copy, Clone, PartialEq, Debug, Display, EnumString)]
#[repr(u16)]
pub enum Lifecycle {
    /// No secrets installed, only `Setup` is accepted
    Initialization = 0x0000,
    /// Wallet provisioned
    Operational = 0x5aa5,
}

impl Lifecycle {
    fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x0000 => Some(Lifecycle::Initialization),
            0x5aa5 => Some(Lifecycle::Operational),
            _ => None,
        }
    }
}

/// Files erased by a wipeout, in erase order
const WIPE_SLOTS: [Slot; 5] = [
    Slot::Secret,
    Slot::TrustedInputKey,
    Slot::PinHash,
    Slot::PinRetries,
    Slot::Counter,
];

/// Persistent wallet state for a single applet
pub struct Wallet<'a, S: Storage> {
    store: &'a mut S,
    applet: AppletId,
}

impl<'a, S: Storage> Wallet<'a, S> {
    pub fn new(store: &'a mut S, applet: AppletId) -> Self {
        Self { store, applet }
    }

    fn file(&self, slot: Slot) -> File {
        File::new(self.applet, slot)
    }

    fn read_array<const N: usize>(&self, slot: Slot) -> Result<Option<[u8; N]>, Error> {
        let mut b = [0u8; N];
        match self.store.read(self.file(slot), &mut b)? {
            Some(n) if n == N => Ok(Some(b)),
            Some(_) => Err(Error::Tampered),
            None => Ok(None),
        }
    }

    /// Fetch the current lifecycle, absent files read as `Initialization`
    pub fn lifecycle(&self) -> Result<Lifecycle, Error> {
        match self.read_array::<2>(Slot::Lifecycle)? {
            Some(b) => Lifecycle::from_u16(u16::from_be_bytes(b)).ok_or(Error::Tampered),
            None => Ok(Lifecycle::Initialization),
        }
    }

    fn set_lifecycle(&mut self, l: Lifecycle) -> Result<(), Error> {
        let f = self.file(Slot::Lifecycle);
        self.store.write(f, &(l as u16).to_be_bytes())
    }

    /// Check whether a wipeout was interrupted
    pub fn wipe_pending(&self) -> Result<bool, Error> {
        Ok(matches!(self.read_array::<1>(Slot::WipeFlag)?, Some([1])))
    }

    /// Erase all secrets and return to `Initialization`
    pub fn wipe(&mut self) -> Result<(), Error> {
        #[cfg(feature = "log")]
        log::warn!("wiping {:?} wallet", self.applet);

        let flag = self.file(Slot::WipeFlag);
        self.store.write(flag, &[1])?;

        for s in WIPE_SLOTS {
            let f = self.file(s);
            self.store.erase(f)?;
        }

        self.set_lifecycle(Lifecycle::Initialization)?;

        self.store.erase(flag)
    }

    /// Resume interrupted wipeouts and enforce PIN lockout, returning the
    /// resulting lifecycle.
    ///
    /// Run before every command. A corrupt lifecycle marker is treated
    /// as tampering and wipes the wallet.
    pub fn precheck(&mut self) -> Result<Lifecycle, Error> {
        if self.wipe_pending()? {
            self.wipe()?;
            return Ok(Lifecycle::Initialization);
        }

        let lifecycle = match self.lifecycle() {
            Ok(l) => l,
            Err(Error::Tampered) => {
                self.wipe()?;
                return Ok(Lifecycle::Initialization);
            }
            Err(e) => return Err(e),
        };

        if lifecycle == Lifecycle::Operational && self.retries()? == 0 {
            self.wipe()?;
            return Ok(Lifecycle::Initialization);
        }

        Ok(lifecycle)
    }

    /// Install wallet secrets, moving to `Operational` once all files are written
    pub fn provision(
        &mut self,
        secret: &[u8],
        pin_hash: &[u8; 32],
        ti_key: Option<&[u8; 32]>,
    ) -> Result<(), Error> {
        if self.lifecycle()? != Lifecycle::Initialization {
            return Err(Error::InvalidState);
        }

        let f = self.file(Slot::Secret);
        self.store.write(f, secret)?;

        if let Some(k) = ti_key {
            let f = self.file(Slot::TrustedInputKey);
            self.store.write(f, k)?;
        }

        let f = self.file(Slot::PinHash);
        self.store.write(f, pin_hash)?;

        self.set_retries(PIN_RETRIES)?;

        self.set_lifecycle(Lifecycle::Operational)
    }

    /// Remaining PIN attempts, absent reads as zero
    pub fn retries(&self) -> Result<u8, Error> {
        Ok(self.read_array::<1>(Slot::PinRetries)?.map(|b| b[0]).unwrap_or(0))
    }

    pub fn set_retries(&mut self, n: u8) -> Result<(), Error> {
        let f = self.file(Slot::PinRetries);
        self.store.write(f, &[n])
    }

    /// Stored PIN hash
    pub fn pin_hash(&self) -> Result<[u8; 32], Error> {
        self.read_array(Slot::PinHash)?.ok_or(Error::Tampered)
    }

    /// Read the wallet secret into `buff`, returning the secret length
    pub fn secret(&self, buff: &mut [u8]) -> Result<usize, Error> {
        self.store
            .read(self.file(Slot::Secret), buff)?
            .ok_or(Error::Tampered)
    }

    /// Trusted input MAC key
    pub fn trusted_input_key(&self) -> Result<[u8; 32], Error> {
        self.read_array(Slot::TrustedInputKey)?
            .ok_or(Error::Tampered)
    }

    /// Moving counter, absent reads as zero
    pub fn counter(&self) -> Result<u64, Error> {
        Ok(self
            .read_array::<8>(Slot::Counter)?
            .map(u64::from_be_bytes)
            .unwrap_or(0))
    }

    pub fn set_counter(&mut self, v: u64) -> Result<(), Error> {
        let f = self.file(Slot::Counter);
        self.store.write(f, &v.to_be_bytes())
    }

    /// Derive an extended private key from the wallet seed
    pub fn derive(&self, path: &[u32]) -> Result<XPrv, Error> {
        let mut seed = [0u8; SEED_MAX_LEN];
        let n = self.secret(&mut seed)?;

        let r = derive_xprv(&seed[..n], path);
        seed.zeroize();

        r
    }
}
