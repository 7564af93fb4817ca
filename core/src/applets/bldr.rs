// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Bootloader (firmware update) applet
//!
//! Images are received as `SetImageInfo`, a run of `LoadImageData` chunks,
//! then `FinalizeImage`. Chunks are hashed and checksummed in RAM before
//! being written to flash. Finalize verifies the image signature, then
//! re-reads flash and compares its CRC32 with the RAM value, halting on
//! mismatch, before the image is marked valid.

use crc::{Crc, Digest as CrcDigest, CRC_32_ISO_HDLC};
use encdec::Decode;
use k256::ecdsa::{signature::hazmat::PrehashVerifier, Signature, VerifyingKey};
use rand_core::CryptoRngCore;
use sha2::{Digest, Sha256};
use strum::Display;

use crate::{
    apdu::{
        aid,
        bldr::{ImageInfo, IMAGE_CHUNK_SIZE},
        command::Command,
        response::Response,
        Instruction, BLDR_APDU_CLA,
    },
    applet::{firmware_version, random, random_len, Applet},
    platform::AppletId,
    wallet::Lifecycle,
    Error,
};

/// Image checksum, computed over image bytes only
pub static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Firmware image storage
pub trait Flash {
    /// Image area size in bytes
    fn capacity(&self) -> usize;

    /// Erase the image area, invalidating any current image
    fn erase(&mut self) -> Result<(), Error>;

    /// Write image data at `offset`
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Error>;

    /// Read image data from `offset`
    fn read(&self, offset: usize, buff: &mut [u8]) -> Result<(), Error>;

    /// Mark the written image valid for boot
    fn mark_valid(&mut self, version: u32) -> Result<(), Error>;

    /// Stop the device, used where flash no longer matches the verified image
    fn halt(&mut self) -> !;
}

impl<T: Flash> Flash for &mut T {
    fn capacity(&self) -> usize {
        T::capacity(self)
    }

    fn erase(&mut self) -> Result<(), Error> {
        T::erase(self)
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Error> {
        T::write(self, offset, data)
    }

    fn read(&self, offset: usize, buff: &mut [u8]) -> Result<(), Error> {
        T::read(self, offset, buff)
    }

    fn mark_valid(&mut self, version: u32) -> Result<(), Error> {
        T::mark_valid(self, version)
    }

    fn halt(&mut self) -> ! {
        T::halt(self)
    }
}

/// Image update state
#[derive(Copy, Clone, PartialEq, Debug, Display)]
pub enum State {
    ExpectSetImageInfo,
    ExpectLoadData,
    ExpectFinalize,
}

/// In-progress image update
struct Update {
    size: u32,
    version: u32,
    signature: [u8; 64],
    loaded: u32,
    hasher: Sha256,
    crc: CrcDigest<'static, u32>,
}

/// Bootloader applet
pub struct Bootloader {
    key: VerifyingKey,
    state: State,
    update: Option<Update>,
}

impl Bootloader {
    /// Create a bootloader accepting images signed by `public_key`
    /// (SEC1 encoded secp256k1)
    pub fn new(public_key: &[u8]) -> Result<Self, Error> {
        let key = VerifyingKey::from_sec1_bytes(public_key).map_err(|_| Error::InvalidData)?;

        Ok(Self {
            key,
            state: State::ExpectSetImageInfo,
            update: None,
        })
    }

    /// Current update state
    pub fn state(&self) -> State {
        self.state
    }

    fn set_image_info<F: Flash>(&mut self, flash: &mut F, data: &[u8]) -> Result<(), Error> {
        let (info, _) = ImageInfo::decode(data)?;

        if info.size == 0 || info.size as usize > flash.capacity() {
            return Err(Error::InvalidLength);
        }

        flash.erase()?;

        let mut hasher = Sha256::new();
        hasher.update(info.header());

        #[cfg(feature = "log")]
        log::info!("image update: {} bytes, version {:08x}", info.size, info.version);

        self.update = Some(Update {
            size: info.size,
            version: info.version,
            signature: info.signature,
            loaded: 0,
            hasher,
            crc: CRC32.digest(),
        });
        self.state = State::ExpectLoadData;

        Ok(())
    }

    fn load_data<F: Flash>(&mut self, flash: &mut F, data: &[u8]) -> Result<(), Error> {
        let u = self.update.as_mut().ok_or(Error::InvalidState)?;

        let remaining = (u.size - u.loaded) as usize;
        if data.len() != remaining.min(IMAGE_CHUNK_SIZE) {
            return Err(Error::InvalidLength);
        }

        u.hasher.update(data);
        u.crc.update(data);

        flash.write(u.loaded as usize, data)?;
        u.loaded += data.len() as u32;

        if u.loaded == u.size {
            self.state = State::ExpectFinalize;
        }

        Ok(())
    }

    fn finalize<F: Flash>(&mut self, flash: &mut F) -> Result<(), Error> {
        let u = self.update.take().ok_or(Error::InvalidState)?;
        self.state = State::ExpectSetImageInfo;

        let digest = u.hasher.finalize();
        let verified = Signature::from_slice(&u.signature)
            .and_then(|s| self.key.verify_prehash(&digest, &s));

        if verified.is_err() {
            #[cfg(feature = "log")]
            log::warn!("image signature verification failed");

            flash.erase()?;
            return Err(Error::InvalidSignature);
        }

        let expected = u.crc.finalize();

        let mut crc = CRC32.digest();
        let mut buff = [0u8; IMAGE_CHUNK_SIZE];
        let mut offset = 0;
        while offset < u.size as usize {
            let n = (u.size as usize - offset).min(IMAGE_CHUNK_SIZE);
            flash.read(offset, &mut buff[..n])?;
            crc.update(&buff[..n]);
            offset += n;
        }

        if crc.finalize() != expected {
            #[cfg(feature = "log")]
            log::error!("flashed image CRC mismatch, halting");

            flash.halt();
        }

        flash.mark_valid(u.version)?;

        #[cfg(feature = "log")]
        log::info!("image version {:08x} marked valid", u.version);

        Ok(())
    }
}

impl<F: Flash> Applet<F> for Bootloader {
    const ID: AppletId = AppletId::Bootloader;
    const CLA: u8 = BLDR_APDU_CLA;
    const AID: &'static [u8] = aid::BLDR;

    fn precheck(&mut self, _flash: &mut F) -> Result<Lifecycle, Error> {
        Ok(Lifecycle::Operational)
    }

    fn handle<RNG: CryptoRngCore>(
        &mut self,
        flash: &mut F,
        rng: &mut RNG,
        lifecycle: Lifecycle,
        cmd: &Command,
        resp: &mut Response,
    ) -> Result<(), Error> {
        let ins = Instruction::try_from(cmd.ins).map_err(|_| Error::UnsupportedInstruction)?;

        match (self.state, ins) {
            (_, Instruction::GetFirmwareVersion) => {
                resp.encode(&firmware_version(lifecycle, None))?;
            }
            (_, Instruction::GetRandom) => {
                let r = random(rng, random_len(cmd.le)?)?;
                resp.push(&r)?;
            }
            // Image info restarts any update in progress
            (_, Instruction::SetImageInfo) => self.set_image_info(flash, cmd.data)?,
            (State::ExpectLoadData, Instruction::LoadImageData) => self.load_data(flash, cmd.data)?,
            (State::ExpectFinalize, Instruction::FinalizeImage) => self.finalize(flash)?,
            (_, Instruction::LoadImageData | Instruction::FinalizeImage) => {
                return Err(Error::InvalidState)
            }
            _ => return Err(Error::UnsupportedInstruction),
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.state = State::ExpectSetImageInfo;
        self.update = None;
    }
}
