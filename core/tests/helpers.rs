// Copyright (c) 2022-2023 The MobileCoin Foundation

#![allow(unused)]

use std::collections::VecDeque;

use log::{debug, trace};

use hw_wallet_core::{
    apdu::{
        btc::HashSignReq,
        path::{DerivationPath, HARDENED},
        ISO_APDU_CLA, ISO_INS_SELECT, ISO_SELECT_BY_NAME,
    },
    device::Device,
    engine::TxSummary,
    platform::{Confirmation, Driver, File, MemStore, Request, Storage},
    presence::{wait_for_confirmation, Ticker},
    Error,
};

use encdec::Encode;

/// Wallet seed used by integration tests
pub const SEED: [u8; 32] = [0x5a; 32];

pub const PIN: &[u8] = b"1234";

/// BIP44 account path for bitcoin
pub const BTC_PATH: [u32; 5] = [44 | HARDENED, HARDENED, HARDENED, 0, 0];

/// Confirmation requests observed by the [TestDriver]
#[derive(Clone, PartialEq, Debug)]
pub enum Seen {
    Transaction(TxSummary),
    Address(String),
    Sign([u8; 32]),
}

/// Simulated clock and buttons, pressed after [PRESS_MS] unless the
/// user walks away
struct Buttons {
    now: u32,
    press: Option<bool>,
}

/// Simulated user response time
pub const PRESS_MS: u32 = 1_500;

impl Ticker for Buttons {
    fn now_ms(&self) -> u32 {
        self.now
    }

    fn poll(&mut self) -> Option<bool> {
        match self.now >= PRESS_MS {
            true => self.press,
            false => None,
        }
    }

    fn service(&mut self) {
        self.now += 50;
    }
}

/// Driver over [MemStore] with scripted confirmation outcomes,
/// approving by default
#[derive(Default)]
pub struct TestDriver {
    pub store: MemStore,
    pub outcomes: VecDeque<Confirmation>,
    pub seen: Vec<Seen>,
    /// Simulated time spent waiting for the user
    pub waited_ms: u32,
}

impl TestDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transaction confirmations requested
    pub fn tx_confirmations(&self) -> usize {
        self.seen
            .iter()
            .filter(|s| matches!(s, Seen::Transaction(_)))
            .count()
    }
}

impl Storage for TestDriver {
    fn read(&self, file: File, buff: &mut [u8]) -> Result<Option<usize>, Error> {
        self.store.read(file, buff)
    }

    fn write(&mut self, file: File, data: &[u8]) -> Result<(), Error> {
        self.store.write(file, data)
    }

    fn erase(&mut self, file: File) -> Result<(), Error> {
        self.store.erase(file)
    }
}

impl Driver for TestDriver {
    fn confirm(&mut self, req: &Request<'_>, timeout_ms: u32) -> Confirmation {
        debug!("confirm ({} ms): {:?}", timeout_ms, req);

        self.seen.push(match req {
            Request::Transaction(s) => Seen::Transaction((*s).clone()),
            Request::Address(a) => Seen::Address(a.to_string()),
            Request::Sign { digest, .. } => Seen::Sign(**digest),
        });

        let press = match self.outcomes.pop_front().unwrap_or(Confirmation::Approved) {
            Confirmation::Approved => Some(true),
            Confirmation::Rejected => Some(false),
            Confirmation::Timeout => None,
        };

        let mut b = Buttons { now: 0, press };
        let r = wait_for_confirmation(&mut b, timeout_ms);
        self.waited_ms += b.now;

        r
    }
}

/// Exchange an APDU with the device, returning response data and status word
pub fn exchange(d: &mut Device<TestDriver>, req: &[u8]) -> (Vec<u8>, u16) {
    trace!("req: {:02x?}", req);

    let mut buff = [0u8; 512];
    let n = d.process(req, &mut buff);
    assert!(n >= 2, "missing status word");

    let sw = u16::from_be_bytes([buff[n - 2], buff[n - 1]]);
    trace!("resp: {:02x?} sw: {:04x}", &buff[..n - 2], sw);

    (buff[..n - 2].to_vec(), sw)
}

/// Exchange an APDU, asserting success
pub fn exchange_ok(d: &mut Device<TestDriver>, req: &[u8]) -> Vec<u8> {
    let (r, sw) = exchange(d, req);
    assert_eq!(sw, 0x9000, "command {req:02x?} failed");
    r
}

/// Build a short command APDU
pub fn apdu(cla: u8, ins: u8, p1: u8, p2: u8, data: &[u8]) -> Vec<u8> {
    assert!(data.len() < 256);

    let mut v = vec![cla, ins, p1, p2];
    if !data.is_empty() {
        v.push(data.len() as u8);
        v.extend_from_slice(data);
    }
    v
}

pub fn select(aid: &[u8]) -> Vec<u8> {
    apdu(ISO_APDU_CLA, ISO_INS_SELECT, ISO_SELECT_BY_NAME, 0x00, aid)
}

/// `Setup` payload
pub fn setup_data(secret: &[u8], pin: &[u8]) -> Vec<u8> {
    let mut v = vec![secret.len() as u8];
    v.extend_from_slice(secret);
    v.push(pin.len() as u8);
    v.extend_from_slice(pin);
    v
}

pub fn encode_path(path: &[u32]) -> Vec<u8> {
    let p = DerivationPath::new(path).unwrap();
    let mut buff = [0u8; 64];
    let n = p.encode(&mut buff).unwrap();
    buff[..n].to_vec()
}

pub fn hash_sign_data(path: &[u32], lock_time: u32) -> Vec<u8> {
    let r = HashSignReq {
        path: DerivationPath::new(path).unwrap(),
        lock_time,
        sighash_type: 0x01,
    };
    let mut buff = [0u8; 64];
    let n = r.encode(&mut buff).unwrap();
    buff[..n].to_vec()
}

/// Provision and unlock the bitcoin applet of a new device
pub fn unlocked_device() -> Device<TestDriver> {
    setup();

    let mut d = Device::new(TestDriver::new());
    exchange_ok(&mut d, &apdu(0xe0, 0x20, 0, 0, &setup_data(&SEED, PIN)));
    exchange_ok(&mut d, &apdu(0xe0, 0x22, 0, 0, PIN));
    d
}

/// Setup logging for tests
pub fn setup() {
    let _ = simplelog::SimpleLogger::init(
        log::LevelFilter::Debug,
        simplelog::Config::default(),
    );
}
