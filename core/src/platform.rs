// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Platform abstractions for persistent storage and user interaction
//!
//! Applets access hardware only via the [Storage] and [Driver] traits, so
//! the engine can be exercised on the host against [MemStore].

use heapless::Vec;

use crate::Error;

#[cfg(feature = "firmware")]
use crate::engine::TxSummary;

/// Persistent storage namespace, one per applet
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum AppletId {
    Bitcoin = 0x01,
    Ethereum = 0x02,
    Ripple = 0x03,
    Symmetric = 0x04,
    Otp = 0x05,
    Bootloader = 0x06,
}

/// Persistent file slots within an applet namespace
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum Slot {
    /// Wallet lifecycle marker
    Lifecycle = 0x01,
    /// Wipeout in progress
    WipeFlag = 0x02,
    /// SHA-256 of the user PIN
    PinHash = 0x03,
    /// Remaining PIN attempts
    PinRetries = 0x04,
    /// Wallet seed or applet secret
    Secret = 0x05,
    /// Trusted input MAC key
    TrustedInputKey = 0x06,
    /// OTP counter
    Counter = 0x07,
}

/// Persistent file identifier
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct File {
    pub applet: AppletId,
    pub slot: Slot,
}

impl File {
    pub const fn new(applet: AppletId, slot: Slot) -> Self {
        Self { applet, slot }
    }
}

/// Maximum stored file length
pub const MAX_FILE_LEN: usize = 64;

/// Persistent storage
///
/// Individual writes are assumed atomic (as with page-buffered flash),
/// sequences of writes are not.
pub trait Storage {
    /// Read a file into `buff`, returning the stored length or `None` where the file is absent
    fn read(&self, file: File, buff: &mut [u8]) -> Result<Option<usize>, Error>;

    /// Write (replace) a file
    fn write(&mut self, file: File, data: &[u8]) -> Result<(), Error>;

    /// Erase a file (no-op if absent)
    fn erase(&mut self, file: File) -> Result<(), Error>;
}

impl<T: Storage> Storage for &mut T {
    fn read(&self, file: File, buff: &mut [u8]) -> Result<Option<usize>, Error> {
        T::read(self, file, buff)
    }

    fn write(&mut self, file: File, data: &[u8]) -> Result<(), Error> {
        T::write(self, file, data)
    }

    fn erase(&mut self, file: File) -> Result<(), Error> {
        T::erase(self, file)
    }
}

/// User confirmation outcome
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Confirmation {
    Approved,
    Rejected,
    Timeout,
}

impl Confirmation {
    /// Map non-approval outcomes to errors
    pub fn check(self) -> Result<(), Error> {
        match self {
            Confirmation::Approved => Ok(()),
            Confirmation::Rejected => Err(Error::Rejected),
            Confirmation::Timeout => Err(Error::Timeout),
        }
    }
}

/// Request presented to the user for confirmation
#[derive(Clone, Debug)]
pub enum Request<'a> {
    /// Bitcoin transaction approval
    #[cfg(feature = "firmware")]
    Transaction(&'a TxSummary),

    /// Address display
    Address(&'a str),

    /// Digest signing approval
    Sign {
        applet: AppletId,
        digest: &'a [u8; 32],
    },
}

/// [`Driver`] trait provides platform support for applet instances
pub trait Driver: Storage {
    /// Present a request to the user and wait for a decision or timeout.
    ///
    /// Implementations must continue servicing the host transport while
    /// waiting (see [crate::presence::wait_for_confirmation]).
    fn confirm(&mut self, req: &Request<'_>, timeout_ms: u32) -> Confirmation;
}

impl<T: Driver> Driver for &mut T {
    fn confirm(&mut self, req: &Request<'_>, timeout_ms: u32) -> Confirmation {
        T::confirm(self, req, timeout_ms)
    }
}

/// Maximum number of files held by a [MemStore]
pub const MEM_STORE_FILES: usize = 48;

/// In-memory [Storage] implementation, for hosts and tests
#[derive(Clone, Debug, Default)]
pub struct MemStore {
    files: Vec<(File, Vec<u8, MAX_FILE_LEN>), MEM_STORE_FILES>,
}

impl MemStore {
    pub const fn new() -> Self {
        Self { files: Vec::new() }
    }

    /// Check whether a file exists
    pub fn contains(&self, file: File) -> bool {
        self.files.iter().any(|(f, _)| *f == file)
    }
}

impl Storage for MemStore {
    fn read(&self, file: File, buff: &mut [u8]) -> Result<Option<usize>, Error> {
        let d = match self.files.iter().find(|(f, _)| *f == file) {
            Some((_, d)) => d,
            None => return Ok(None),
        };

        if buff.len() < d.len() {
            return Err(Error::Storage);
        }
        buff[..d.len()].copy_from_slice(d);

        Ok(Some(d.len()))
    }

    fn write(&mut self, file: File, data: &[u8]) -> Result<(), Error> {
        let v = Vec::from_slice(data).map_err(|_| Error::Storage)?;

        match self.files.iter_mut().find(|(f, _)| *f == file) {
            Some((_, d)) => *d = v,
            None => self.files.push((file, v)).map_err(|_| Error::Storage)?,
        }

        Ok(())
    }

    fn erase(&mut self, file: File) -> Result<(), Error> {
        if let Some(i) = self.files.iter().position(|(f, _)| *f == file) {
            self.files.swap_remove(i);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const F: File = File::new(AppletId::Bitcoin, Slot::Secret);

    #[test]
    fn mem_store() {
        let mut s = MemStore::new();
        let mut b = [0u8; MAX_FILE_LEN];

        assert_eq!(s.read(F, &mut b), Ok(None));

        s.write(F, &[1, 2, 3]).unwrap();
        assert_eq!(s.read(F, &mut b), Ok(Some(3)));
        assert_eq!(&b[..3], &[1, 2, 3]);

        s.write(F, &[4]).unwrap();
        assert_eq!(s.read(F, &mut b), Ok(Some(1)));

        s.erase(F).unwrap();
        assert!(!s.contains(F));
    }

    #[test]
    fn mem_store_limits() {
        let mut s = MemStore::new();
        assert_eq!(s.write(F, &[0u8; MAX_FILE_LEN + 1]), Err(Error::Storage));

        s.write(F, &[0u8; 8]).unwrap();
        let mut b = [0u8; 4];
        assert_eq!(s.read(F, &mut b), Err(Error::Storage));
    }
}
