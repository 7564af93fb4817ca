// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Firmware device, routing APDUs to the selected applet
//!
//! ISO7816 `SELECT` (by AID) switches the active applet and resets its
//! session, all other commands are passed to the active applet via
//! [process_apdu]. Bitcoin is selected at power on.

use rand_core::{CryptoRngCore, OsRng};
use strum::{Display, EnumIter, EnumString};

use crate::{
    apdu::{
        aid, command::Command, response::Response, status::StatusWord, ISO_APDU_CLA,
        ISO_INS_SELECT, ISO_SELECT_BY_NAME,
    },
    applet::{process_apdu, Applet},
    applets::{eth::Ethereum, otp::Otp, sym::Symmetric, xrp::Ripple},
    engine::Engine,
    platform::Driver,
    Error,
};

/// Selectable firmware applets
#[derive(Copy, Clone, PartialEq, Debug, Display, EnumString, EnumIter)]
pub enum Selected {
    Bitcoin,
    Ethereum,
    Ripple,
    Symmetric,
    Otp,
}

impl Selected {
    /// Applet identifier for `SELECT`
    pub fn aid(&self) -> &'static [u8] {
        match self {
            Selected::Bitcoin => aid::BTC,
            Selected::Ethereum => aid::ETH,
            Selected::Ripple => aid::XRP,
            Selected::Symmetric => aid::SYM,
            Selected::Otp => aid::OTP,
        }
    }

    /// Find the applet matching an AID
    pub fn from_aid(aid: &[u8]) -> Option<Self> {
        use strum::IntoEnumIterator;

        Self::iter().find(|s| s.aid() == aid)
    }
}

/// Firmware device holding the applet instances and platform driver
pub struct Device<DRV: Driver, RNG: CryptoRngCore = OsRng> {
    drv: DRV,
    rng: RNG,
    selected: Selected,

    btc: Engine,
    eth: Ethereum,
    xrp: Ripple,
    sym: Symmetric,
    otp: Otp,
}

impl<DRV: Driver> Device<DRV> {
    /// Create a new device with the provided driver, using the default [OsRng]
    pub const fn new(drv: DRV) -> Self {
        Self::new_with_rng(drv, OsRng {})
    }
}

impl<DRV: Driver, RNG: CryptoRngCore> Device<DRV, RNG> {
    /// Create a new device with the provided driver and rng
    pub const fn new_with_rng(drv: DRV, rng: RNG) -> Self {
        Self {
            drv,
            rng,
            selected: Selected::Bitcoin,
            btc: Engine::new(),
            eth: Ethereum::new(),
            xrp: Ripple::new(),
            sym: Symmetric::new(),
            otp: Otp::new(),
        }
    }

    /// Currently selected applet
    pub fn selected(&self) -> Selected {
        self.selected
    }

    /// Bitcoin engine, for inspection
    pub fn bitcoin(&self) -> &Engine {
        &self.btc
    }

    pub fn driver(&self) -> &DRV {
        &self.drv
    }

    pub fn driver_mut(&mut self) -> &mut DRV {
        &mut self.drv
    }

    /// Process a request APDU, writing the response to `resp` and
    /// returning the response length
    pub fn process(&mut self, req: &[u8], resp: &mut [u8]) -> usize {
        if req.len() >= 2 && req[0] == ISO_APDU_CLA && req[1] == ISO_INS_SELECT {
            return self.select(req, resp);
        }

        let (drv, rng) = (&mut self.drv, &mut self.rng);

        match self.selected {
            Selected::Bitcoin => process_apdu(&mut self.btc, drv, rng, req, resp),
            Selected::Ethereum => process_apdu(&mut self.eth, drv, rng, req, resp),
            Selected::Ripple => process_apdu(&mut self.xrp, drv, rng, req, resp),
            Selected::Symmetric => process_apdu(&mut self.sym, drv, rng, req, resp),
            Selected::Otp => process_apdu(&mut self.otp, drv, rng, req, resp),
        }
    }

    fn select(&mut self, req: &[u8], resp: &mut [u8]) -> usize {
        let mut r = Response::new(resp);

        let sw = match Command::parse(req) {
            Err(_) => Error::InvalidLength.status(),
            Ok(c) if c.p1 != ISO_SELECT_BY_NAME => Error::InvalidParameters.status(),
            Ok(c) => match Selected::from_aid(c.data) {
                Some(s) => {
                    #[cfg(feature = "log")]
                    log::debug!("select {}", s);

                    self.selected = s;
                    self.reset_selected();

                    StatusWord::Ok as u16
                }
                None => Error::AppletNotFound.status(),
            },
        };

        r.set_sw(sw);
        r.finish()
    }

    fn reset_selected(&mut self) {
        match self.selected {
            Selected::Bitcoin => <Engine as Applet<DRV>>::reset(&mut self.btc),
            Selected::Ethereum => <Ethereum as Applet<DRV>>::reset(&mut self.eth),
            Selected::Ripple => <Ripple as Applet<DRV>>::reset(&mut self.xrp),
            Selected::Symmetric => <Symmetric as Applet<DRV>>::reset(&mut self.sym),
            Selected::Otp => <Otp as Applet<DRV>>::reset(&mut self.otp),
        }
    }
}
