// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Per-applet APDU dispatch
//!
//! Every command runs the same sequence: parse, resume interrupted
//! wipeouts and enforce lockout ([Applet::precheck]), check the class,
//! dispatch by lifecycle and instruction ([Applet::handle]), then map any
//! error to a status word and apply the applet's reset policy. Internal
//! failures ([Error::is_fatal]) always reset the session.

use core::ops::RangeInclusive;

use encdec::Decode;
use heapless::Vec;
use rand_core::CryptoRngCore;

use crate::{
    apdu::{
        app_info::{AppFlags, FirmwareVersion},
        command::Command,
        response::Response,
        setup::SetupReq,
        status::StatusWord,
        Instruction,
    },
    consts::{ARCH, DEFAULT_RANDOM_LEN, MAX_RANDOM_LEN, VERSION},
    pin::{new_pin_hash, Pin},
    platform::{AppletId, Storage},
    wallet::{Lifecycle, Wallet},
    Error,
};

/// Applet interface, `P` is the platform the applet operates on
pub trait Applet<P> {
    /// Persistent storage namespace
    const ID: AppletId;

    /// Accepted command class
    const CLA: u8;

    /// Applet identifier for `SELECT`
    const AID: &'static [u8];

    /// Run before every command, returning the current lifecycle
    fn precheck(&mut self, platform: &mut P) -> Result<Lifecycle, Error>;

    /// Handle a parsed command, writing response data to `resp`
    fn handle<RNG: CryptoRngCore>(
        &mut self,
        platform: &mut P,
        rng: &mut RNG,
        lifecycle: Lifecycle,
        cmd: &Command,
        resp: &mut Response,
    ) -> Result<(), Error>;

    /// Reset volatile session state
    fn reset(&mut self);

    /// Whether a failed command resets the session
    fn reset_on_error(&self, _err: &Error) -> bool {
        true
    }
}

/// Process a request APDU, writing the response (data and status word) to
/// `resp` and returning the response length.
///
/// `resp` must hold at least the two status word bytes.
pub fn process_apdu<P, RNG: CryptoRngCore, A: Applet<P>>(
    applet: &mut A,
    platform: &mut P,
    rng: &mut RNG,
    req: &[u8],
    resp: &mut [u8],
) -> usize {
    let mut r = Response::new(resp);

    match dispatch(applet, platform, rng, req, &mut r) {
        Ok(()) => r.set_sw(StatusWord::Ok),
        Err(e) => {
            #[cfg(feature = "log")]
            log::debug!("{:?} command failed: {:?}", A::ID, e);

            r.clear();
            r.set_sw(e.status());

            if e.is_fatal() {
                #[cfg(feature = "log")]
                log::error!("{:?} internal failure, session reset: {:?}", A::ID, e);
            }

            if e.is_fatal() || applet.reset_on_error(&e) {
                applet.reset();
            }
        }
    }

    r.finish()
}

fn dispatch<P, RNG: CryptoRngCore, A: Applet<P>>(
    applet: &mut A,
    platform: &mut P,
    rng: &mut RNG,
    req: &[u8],
    resp: &mut Response,
) -> Result<(), Error> {
    let cmd = Command::parse(req).map_err(|_| Error::InvalidLength)?;

    let lifecycle = applet.precheck(platform)?;

    if cmd.cla != A::CLA {
        return Err(Error::UnsupportedClass);
    }

    applet.handle(platform, rng, lifecycle, &cmd, resp)
}

/// Precheck for applets holding wallet secrets, resetting the session
/// where the wallet was wiped
pub fn wallet_precheck<S: Storage>(
    store: &mut S,
    id: AppletId,
    pin: &mut Pin,
) -> Result<Lifecycle, Error> {
    let l = Wallet::new(store, id).precheck()?;
    if l == Lifecycle::Initialization {
        pin.clear();
    }
    Ok(l)
}

/// Firmware version and state flags
pub fn firmware_version(lifecycle: Lifecycle, pin: Option<&Pin>) -> FirmwareVersion {
    let mut flags = AppFlags::empty();

    if lifecycle == Lifecycle::Operational {
        flags |= AppFlags::OPERATIONAL;
    }
    if pin.map(|p| p.is_verified()).unwrap_or(false) {
        flags |= AppFlags::PIN_VERIFIED;
    }

    #[cfg(feature = "firmware")]
    {
        flags |= AppFlags::HAS_FIRMWARE;
    }
    #[cfg(feature = "bootloader")]
    {
        flags |= AppFlags::HAS_BOOTLOADER;
    }

    FirmwareVersion {
        flags,
        arch: ARCH,
        major: VERSION.0,
        minor: VERSION.1,
        patch: VERSION.2,
    }
}

/// Random response length from `Le`, absent or zero selects the default
pub fn random_len(le: Option<u16>) -> Result<usize, Error> {
    match le.map(|v| v as usize) {
        None | Some(0) => Ok(DEFAULT_RANDOM_LEN),
        Some(n) if n <= MAX_RANDOM_LEN => Ok(n),
        Some(_) => Err(Error::InvalidLength),
    }
}

/// Fetch `len` random bytes
pub fn random<RNG: CryptoRngCore>(rng: &mut RNG, len: usize) -> Result<Vec<u8, MAX_RANDOM_LEN>, Error> {
    let mut v = Vec::new();
    v.resize(len, 0).map_err(|_| Error::InvalidLength)?;
    rng.fill_bytes(&mut v);
    Ok(v)
}

/// Install an applet secret and PIN.
///
/// A trusted input key is generated from `rng` where `ti_key` is set.
pub fn setup<S: Storage, RNG: CryptoRngCore>(
    store: &mut S,
    id: AppletId,
    rng: &mut RNG,
    secret: &[u8],
    pin: &[u8],
    secret_len: RangeInclusive<usize>,
    ti_key: bool,
) -> Result<(), Error> {
    if !secret_len.contains(&secret.len()) {
        return Err(Error::InvalidLength);
    }

    let pin_hash = new_pin_hash(pin)?;

    let mut key = [0u8; 32];
    if ti_key {
        rng.fill_bytes(&mut key);
    }

    let r = Wallet::new(store, id).provision(secret, &pin_hash, ti_key.then_some(&key));
    zeroize::Zeroize::zeroize(&mut key);

    if r.is_ok() {
        #[cfg(feature = "log")]
        log::info!("{:?} wallet provisioned", id);
    }

    r
}

/// `VerifyPin` without a provisioned wallet, blocked once the retry
/// counter is exhausted or erased
pub fn verify_unprovisioned<S: Storage>(store: &mut S, id: AppletId) -> Result<(), Error> {
    match Wallet::new(store, id).retries()? {
        0 => Err(Error::PinBlocked),
        _ => Err(Error::UnsupportedInstruction),
    }
}

/// Session state and shared instructions for secret-holding applets
#[derive(Clone, Debug, Default)]
pub struct Session {
    pub pin: Pin,
}

impl Session {
    pub const fn new() -> Self {
        Self { pin: Pin::new() }
    }

    /// Handle instructions common to secret-holding applets, returning
    /// `Ok(false)` for applet specific instructions.
    ///
    /// Applet specific instructions are only accepted once operational
    /// and with a verified PIN, see [Session::check].
    #[allow(clippy::too_many_arguments)]
    pub fn handle<S: Storage, RNG: CryptoRngCore>(
        &mut self,
        id: AppletId,
        store: &mut S,
        rng: &mut RNG,
        lifecycle: Lifecycle,
        cmd: &Command,
        resp: &mut Response,
        secret_len: RangeInclusive<usize>,
    ) -> Result<bool, Error> {
        let ins = match Instruction::try_from(cmd.ins) {
            Ok(i) => i,
            Err(_) => return Err(Error::UnsupportedInstruction),
        };

        match (lifecycle, ins) {
            (_, Instruction::GetFirmwareVersion) => {
                resp.encode(&firmware_version(lifecycle, Some(&self.pin)))?;
            }
            (_, Instruction::GetRandom) => {
                let r = random(rng, random_len(cmd.le)?)?;
                resp.push(&r)?;
            }
            (Lifecycle::Initialization, Instruction::Setup) => {
                let (r, _) = SetupReq::decode(cmd.data)?;
                setup(store, id, rng, r.secret, r.pin, secret_len, false)?;
            }
            (Lifecycle::Operational, Instruction::VerifyPin) => {
                self.pin.verify(&mut Wallet::new(store, id), cmd.data)?;
            }
            (Lifecycle::Initialization, Instruction::VerifyPin) => {
                verify_unprovisioned(store, id)?;
            }
            (Lifecycle::Operational, Instruction::Deinit) => self.pin.clear(),
            (Lifecycle::Operational, Instruction::Setup)
            | (Lifecycle::Initialization, Instruction::Deinit) => {
                return Err(Error::UnsupportedInstruction)
            }
            _ => return Ok(false),
        }

        Ok(true)
    }

    /// Gate applet specific instructions
    pub fn check(&self, lifecycle: Lifecycle) -> Result<(), Error> {
        if lifecycle != Lifecycle::Operational {
            return Err(Error::UnsupportedInstruction);
        }
        self.pin.check()
    }

    pub fn reset(&mut self) {
        self.pin.clear();
    }
}

#[cfg(test)]
mod test {
    use rand::rngs::OsRng;

    use super::*;
    use crate::platform::MemStore;

    /// Minimal applet accepting the shared instructions only
    struct Plain {
        session: Session,
        resets: usize,
    }

    impl Applet<MemStore> for Plain {
        const ID: AppletId = AppletId::Symmetric;
        const CLA: u8 = 0x80;
        const AID: &'static [u8] = b"PLAIN";

        fn precheck(&mut self, store: &mut MemStore) -> Result<Lifecycle, Error> {
            wallet_precheck(store, Self::ID, &mut self.session.pin)
        }

        fn handle<RNG: CryptoRngCore>(
            &mut self,
            store: &mut MemStore,
            rng: &mut RNG,
            lifecycle: Lifecycle,
            cmd: &Command,
            resp: &mut Response,
        ) -> Result<(), Error> {
            match self
                .session
                .handle(Self::ID, store, rng, lifecycle, cmd, resp, 1..=32)?
            {
                true => Ok(()),
                false => {
                    self.session.check(lifecycle)?;
                    Err(Error::UnsupportedInstruction)
                }
            }
        }

        fn reset(&mut self) {
            self.resets += 1;
            self.session.reset();
        }
    }

    fn exchange(a: &mut Plain, s: &mut MemStore, req: &[u8]) -> (std::vec::Vec<u8>, u16) {
        let mut buff = [0u8; 300];
        let n = process_apdu(a, s, &mut OsRng, req, &mut buff);
        let sw = u16::from_be_bytes([buff[n - 2], buff[n - 1]]);
        (buff[..n - 2].to_vec(), sw)
    }

    #[test]
    fn dispatch_errors() {
        let mut a = Plain {
            session: Session::new(),
            resets: 0,
        };
        let mut s = MemStore::new();

        // Framing error
        assert_eq!(exchange(&mut a, &mut s, &[0x80, 0xc4, 0x00]).1, 0x6700);
        // Wrong class
        assert_eq!(exchange(&mut a, &mut s, &[0xe0, 0xc4, 0, 0]).1, 0x6e00);
        // Not accepted before setup
        assert_eq!(exchange(&mut a, &mut s, &[0x80, 0x24, 0, 0]).1, 0x6d00);
        assert_eq!(a.resets, 3);

        // No PIN installed, verification is blocked
        assert_eq!(exchange(&mut a, &mut s, &[0x80, 0x22, 0, 0, 4, 1, 2, 3, 4]).1, 0x6983);

        let (r, sw) = exchange(&mut a, &mut s, &[0x80, 0xc4, 0, 0]);
        assert_eq!(sw, 0x9000);
        assert_eq!(r.len(), 5);
        assert_eq!(r[0] & AppFlags::OPERATIONAL.bits(), 0);
    }

    #[test]
    fn setup_then_verify() {
        let mut a = Plain {
            session: Session::new(),
            resets: 0,
        };
        let mut s = MemStore::new();

        let setup = [0x80, 0x20, 0, 0, 10, 3, 0xaa, 0xbb, 0xcc, 5, b'1', b'2', b'3', b'4', b'5'];
        assert_eq!(exchange(&mut a, &mut s, &setup).1, 0x9000);

        // Setup is only accepted once
        assert_eq!(exchange(&mut a, &mut s, &setup).1, 0x6d00);

        // Applet operations require a verified PIN
        assert_eq!(exchange(&mut a, &mut s, &[0x80, 0x30, 0, 0]).1, 0x6982);

        let verify = [0x80, 0x22, 0, 0, 5, b'1', b'2', b'3', b'4', b'5'];
        assert_eq!(exchange(&mut a, &mut s, &verify).1, 0x9000);
        assert!(a.session.pin.is_verified());

        let (r, _) = exchange(&mut a, &mut s, &[0x80, 0xc4, 0, 0]);
        assert_eq!(
            AppFlags::from_bits_truncate(r[0]) & (AppFlags::OPERATIONAL | AppFlags::PIN_VERIFIED),
            AppFlags::OPERATIONAL | AppFlags::PIN_VERIFIED
        );
    }

    #[test]
    fn random_lengths() {
        assert_eq!(random_len(None), Ok(DEFAULT_RANDOM_LEN));
        assert_eq!(random_len(Some(0)), Ok(DEFAULT_RANDOM_LEN));
        assert_eq!(random_len(Some(255)), Ok(255));
        assert_eq!(random_len(Some(256)), Err(Error::InvalidLength));

        assert_eq!(random(&mut OsRng, 17).unwrap().len(), 17);
    }

    #[test]
    fn setup_checks_secret_length() {
        let mut s = MemStore::new();
        assert_eq!(
            setup(&mut s, AppletId::Otp, &mut OsRng, &[0u8; 8], b"1234", 16..=64, false),
            Err(Error::InvalidLength)
        );
        assert_eq!(
            setup(&mut s, AppletId::Otp, &mut OsRng, &[0u8; 16], b"12", 16..=64, false),
            Err(Error::InvalidPinLength)
        );
        setup(&mut s, AppletId::Otp, &mut OsRng, &[0u8; 16], b"1234", 16..=64, false).unwrap();
    }
}
