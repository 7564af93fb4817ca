// Copyright (c) 2022-2023 The MobileCoin Foundation

//! PIN verification
//!
//! The retry counter is decremented and persisted _before_ the comparison,
//! so removing power mid-verify always costs an attempt. A successful
//! verify restores the counter, exhausting it wipes the wallet and
//! further attempts report the PIN as blocked.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::{
    consts::{PIN_MAX_LEN, PIN_MIN_LEN, PIN_RETRIES},
    platform::Storage,
    wallet::Wallet,
    Error,
};

/// Check PIN length and compute the stored PIN hash
pub fn new_pin_hash(pin: &[u8]) -> Result<[u8; 32], Error> {
    if pin.len() < PIN_MIN_LEN || pin.len() > PIN_MAX_LEN {
        return Err(Error::InvalidPinLength);
    }

    Ok(Sha256::digest(pin).into())
}

/// Volatile PIN session state
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pin {
    verified: bool,
}

impl Pin {
    pub const fn new() -> Self {
        Self { verified: false }
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Require a verified PIN for the current session
    pub fn check(&self) -> Result<(), Error> {
        match self.verified {
            true => Ok(()),
            false => Err(Error::PinRequired),
        }
    }

    pub fn clear(&mut self) {
        self.verified = false;
    }

    /// Verify a PIN attempt against the stored hash
    pub fn verify<S: Storage>(&mut self, wallet: &mut Wallet<S>, pin: &[u8]) -> Result<(), Error> {
        self.verified = false;

        let h = new_pin_hash(pin)?;

        let retries = wallet.retries()?;
        if retries == 0 {
            return Err(Error::PinBlocked);
        }

        let remaining = retries - 1;
        wallet.set_retries(remaining)?;

        if bool::from(h.ct_eq(&wallet.pin_hash()?)) {
            wallet.set_retries(PIN_RETRIES)?;
            self.verified = true;

            return Ok(());
        }

        #[cfg(feature = "log")]
        log::warn!("invalid PIN, {} attempts remaining", remaining);

        if remaining == 0 {
            wallet.wipe()?;
        }

        Err(Error::InvalidPin { remaining })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        platform::{AppletId, MemStore},
        wallet::Lifecycle,
    };

    const PIN: &[u8] = b"1234";

    fn setup() -> MemStore {
        let mut s = MemStore::new();
        Wallet::new(&mut s, AppletId::Bitcoin)
            .provision(&[0x5a; 32], &new_pin_hash(PIN).unwrap(), None)
            .unwrap();
        s
    }

    #[test]
    fn pin_lengths() {
        assert_eq!(new_pin_hash(b"123"), Err(Error::InvalidPinLength));
        assert!(new_pin_hash(b"1234").is_ok());
        assert!(new_pin_hash(&[b'1'; 32]).is_ok());
        assert_eq!(new_pin_hash(&[b'1'; 33]), Err(Error::InvalidPinLength));
    }

    #[test]
    fn verify_resets_retries() {
        let mut s = setup();
        let mut w = Wallet::new(&mut s, AppletId::Bitcoin);
        let mut p = Pin::new();

        assert_eq!(p.verify(&mut w, b"0000"), Err(Error::InvalidPin { remaining: 2 }));
        assert_eq!(w.retries(), Ok(2));
        assert!(!p.is_verified());

        p.verify(&mut w, PIN).unwrap();
        assert!(p.is_verified());
        assert_eq!(w.retries(), Ok(PIN_RETRIES));
    }

    #[test]
    fn invalid_length_costs_nothing() {
        let mut s = setup();
        let mut w = Wallet::new(&mut s, AppletId::Bitcoin);
        let mut p = Pin::new();

        assert_eq!(p.verify(&mut w, b"12"), Err(Error::InvalidPinLength));
        assert_eq!(w.retries(), Ok(PIN_RETRIES));
    }

    #[test]
    fn lockout_wipes() {
        let mut s = setup();
        let mut w = Wallet::new(&mut s, AppletId::Bitcoin);
        let mut p = Pin::new();

        assert_eq!(p.verify(&mut w, b"0000"), Err(Error::InvalidPin { remaining: 2 }));
        assert_eq!(p.verify(&mut w, b"0000"), Err(Error::InvalidPin { remaining: 1 }));
        assert_eq!(p.verify(&mut w, b"0000"), Err(Error::InvalidPin { remaining: 0 }));

        assert_eq!(w.lifecycle(), Ok(Lifecycle::Initialization));
        assert_eq!(w.retries(), Ok(0));
        assert_eq!(w.pin_hash(), Err(Error::Tampered));
    }

    #[test]
    fn failed_verify_clears_session() {
        let mut s = setup();
        let mut w = Wallet::new(&mut s, AppletId::Bitcoin);
        let mut p = Pin::new();

        p.verify(&mut w, PIN).unwrap();
        assert_eq!(p.check(), Ok(()));

        let _ = p.verify(&mut w, b"9999");
        assert_eq!(p.check(), Err(Error::PinRequired));
    }
}
