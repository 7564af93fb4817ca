// Copyright (c) 2022-2023 The MobileCoin Foundation

//! User presence polling
//!
//! Platform side helper for [Driver::confirm][crate::platform::Driver::confirm]
//! implementations: waits poll the user input and service the host transport
//! on each iteration, so the device remains responsive while a request is
//! pending.

use crate::platform::Confirmation;

/// Platform timer and user input
pub trait Ticker {
    /// Monotonic time in milliseconds
    fn now_ms(&self) -> u32;

    /// Poll user input, `Some(true)` on approval, `Some(false)` on rejection
    fn poll(&mut self) -> Option<bool>;

    /// Service the host transport (and display) while waiting
    fn service(&mut self) {}
}

/// Wait for a user decision for up to `timeout_ms`
pub fn wait_for_confirmation<T: Ticker>(t: &mut T, timeout_ms: u32) -> Confirmation {
    let start = t.now_ms();

    loop {
        match t.poll() {
            Some(true) => return Confirmation::Approved,
            Some(false) => return Confirmation::Rejected,
            None => (),
        }

        if t.now_ms().wrapping_sub(start) >= timeout_ms {
            #[cfg(feature = "log")]
            log::warn!("confirmation timeout after {} ms", timeout_ms);

            return Confirmation::Timeout;
        }

        t.service();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Clock {
        now: u32,
        press_at: Option<(u32, bool)>,
        serviced: usize,
    }

    impl Ticker for Clock {
        fn now_ms(&self) -> u32 {
            self.now
        }

        fn poll(&mut self) -> Option<bool> {
            match self.press_at {
                Some((t, v)) if self.now >= t => Some(v),
                _ => None,
            }
        }

        fn service(&mut self) {
            self.serviced += 1;
            self.now = self.now.wrapping_add(100);
        }
    }

    #[test]
    fn approve() {
        let mut c = Clock {
            now: 0,
            press_at: Some((1_000, true)),
            serviced: 0,
        };

        assert_eq!(wait_for_confirmation(&mut c, 20_000), Confirmation::Approved);
        assert_eq!(c.serviced, 10);
    }

    #[test]
    fn reject() {
        let mut c = Clock {
            now: 0,
            press_at: Some((0, false)),
            serviced: 0,
        };

        assert_eq!(wait_for_confirmation(&mut c, 20_000), Confirmation::Rejected);
    }

    #[test]
    fn timeout_across_wrap() {
        let mut c = Clock {
            now: u32::MAX - 500,
            press_at: None,
            serviced: 0,
        };

        assert_eq!(wait_for_confirmation(&mut c, 20_000), Confirmation::Timeout);
        assert_eq!(c.serviced, 200);
    }
}
