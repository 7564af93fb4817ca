// Copyright (c) 2022-2023 The MobileCoin Foundation

use encdec::{Decode, DecodeOwned};

use crate::{
    apdu::{
        btc::*, command::Command, path::DerivationPath, setup::SetupReq, Instruction,
    },
    applet::random_len,
    Error,
};

use super::signer::StartMode;

/// [`Engine`][super::Engine] input events, decoded from request [APDUs][crate::apdu]
#[derive(Clone, Debug, PartialEq)]
pub enum Event<'a> {
    None,

    /// Fetch firmware version and flags
    GetFirmwareVersion,

    /// Fetch random bytes
    GetRandom { len: usize },

    /// Install wallet seed and PIN
    Setup { seed: &'a [u8], pin: &'a [u8] },

    /// Verify user PIN
    VerifyPin { pin: &'a [u8] },

    /// Clear the session
    Deinit,

    /// Fetch public key, address and chain code
    GetWalletPublicKey {
        path: DerivationPath,
        display: bool,
    },

    /// Stream a previous transaction, `index` is set on the first block
    GetTrustedInput {
        index: Option<u32>,
        data: &'a [u8],
    },

    /// Stream transaction inputs
    HashInputStart {
        mode: StartMode,
        first_block: bool,
        data: &'a [u8],
    },

    /// Stream transaction outputs
    HashInputFinalizeFull { last: bool, data: &'a [u8] },

    /// Declare the change derivation path
    HashInputChangePath { path: DerivationPath },

    /// Sign the current input
    HashSign {
        path: DerivationPath,
        lock_time: u32,
        sighash_type: u8,
    },
}

impl<'a> Event<'a> {
    /// Decode an event from a parsed command
    pub fn parse(cmd: &Command<'a>) -> Result<Self, Error> {
        let ins = Instruction::try_from(cmd.ins).map_err(|_| Error::UnsupportedInstruction)?;
        let data = cmd.data;

        let evt = match ins {
            Instruction::GetFirmwareVersion => Event::GetFirmwareVersion,
            Instruction::GetRandom => Event::GetRandom {
                len: random_len(cmd.le)?,
            },
            Instruction::Setup => {
                let (r, _) = SetupReq::decode(data)?;
                Event::Setup {
                    seed: r.secret,
                    pin: r.pin,
                }
            }
            Instruction::VerifyPin => Event::VerifyPin { pin: data },
            Instruction::Deinit => Event::Deinit,
            Instruction::GetWalletPublicKey => {
                let (r, _) = WalletPublicKeyReq::decode_owned(data)?;
                Event::GetWalletPublicKey {
                    path: r.path,
                    display: match cmd.p1 {
                        0x00 => false,
                        P1_DISPLAY_ADDRESS => true,
                        _ => return Err(Error::InvalidParameters),
                    },
                }
            }
            Instruction::GetTrustedInput => match cmd.p1 {
                P1_FIRST_BLOCK => {
                    let (r, _) = TrustedInputStart::decode(data)?;
                    Event::GetTrustedInput {
                        index: Some(r.index),
                        data: r.tx,
                    }
                }
                P1_NEXT_BLOCK => Event::GetTrustedInput { index: None, data },
                _ => return Err(Error::InvalidParameters),
            },
            Instruction::HashInputStart => {
                let first_block = match cmd.p1 {
                    P1_FIRST_BLOCK => true,
                    P1_NEXT_BLOCK => false,
                    _ => return Err(Error::InvalidParameters),
                };
                let mode = match cmd.p2 {
                    P2_NEW_TX => StartMode::New,
                    P2_NEW_SEGWIT_TX => StartMode::NewSegwit,
                    P2_CONTINUE_TX => StartMode::Continue,
                    _ => return Err(Error::InvalidParameters),
                };
                Event::HashInputStart {
                    mode,
                    first_block,
                    data,
                }
            }
            Instruction::HashInputFinalizeFull => match cmd.p1 {
                P1_MORE_BLOCKS => Event::HashInputFinalizeFull { last: false, data },
                P1_LAST_BLOCK => Event::HashInputFinalizeFull { last: true, data },
                P1_CHANGE_PATH => {
                    let (path, _) = DerivationPath::decode_owned(data)?;
                    Event::HashInputChangePath { path }
                }
                _ => return Err(Error::InvalidParameters),
            },
            Instruction::HashSign => {
                let (r, _) = HashSignReq::decode_owned(data)?;
                Event::HashSign {
                    path: r.path,
                    lock_time: r.lock_time,
                    sighash_type: r.sighash_type,
                }
            }
            _ => return Err(Error::UnsupportedInstruction),
        };

        Ok(evt)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::apdu::path::HARDENED;

    fn parse(req: &[u8]) -> Result<Event, Error> {
        let cmd = Command::parse(req).unwrap();
        Event::parse(&cmd)
    }

    #[test]
    fn random_lengths() {
        assert_eq!(parse(&[0xe0, 0xc0, 0, 0]), Ok(Event::GetRandom { len: 32 }));
        assert_eq!(parse(&[0xe0, 0xc0, 0, 0, 8]), Ok(Event::GetRandom { len: 8 }));
        assert_eq!(
            parse(&[0xe0, 0xc0, 0, 0, 0, 0x01, 0x00]),
            Err(Error::InvalidLength)
        );
    }

    #[test]
    fn wallet_public_key() {
        let req = [0xe0, 0x40, 0x01, 0x00, 0x05, 0x01, 0x80, 0x00, 0x00, 0x2c];
        assert_eq!(
            parse(&req),
            Ok(Event::GetWalletPublicKey {
                path: DerivationPath::new(&[44 | HARDENED]).unwrap(),
                display: true,
            })
        );

        let req = [0xe0, 0x40, 0x02, 0x00, 0x05, 0x01, 0x80, 0x00, 0x00, 0x2c];
        assert_eq!(parse(&req), Err(Error::InvalidParameters));
    }

    #[test]
    fn path_depth() {
        // Zero and eleven component paths are invalid
        assert_eq!(parse(&[0xe0, 0x40, 0, 0, 1, 0]), Err(Error::InvalidData));

        let mut req = [0u8; 5 + 1 + 44];
        req[..6].copy_from_slice(&[0xe0, 0x40, 0, 0, 45, 11]);
        assert_eq!(parse(&req), Err(Error::InvalidData));
    }

    #[test]
    fn hash_input_modes() {
        assert_eq!(
            parse(&[0xe0, 0x44, 0x00, 0x02, 1, 0xaa]),
            Ok(Event::HashInputStart {
                mode: StartMode::NewSegwit,
                first_block: true,
                data: &[0xaa],
            })
        );
        assert_eq!(
            parse(&[0xe0, 0x44, 0x80, 0x80, 1, 0xaa]),
            Ok(Event::HashInputStart {
                mode: StartMode::Continue,
                first_block: false,
                data: &[0xaa],
            })
        );
        assert_eq!(
            parse(&[0xe0, 0x44, 0x00, 0x01, 1, 0xaa]),
            Err(Error::InvalidParameters)
        );
    }

    #[test]
    fn unsupported() {
        assert_eq!(parse(&[0xe0, 0x02, 0, 0]), Err(Error::UnsupportedInstruction));
        assert_eq!(parse(&[0xe0, 0xee, 0, 0]), Err(Error::UnsupportedInstruction));
    }
}
