// Copyright (c) 2022-2023 The MobileCoin Foundation

use super::{signer::TxSigner, trusted_input::TrustedInputGenerator};

/// Streaming operation context, at most one of trusted input generation
/// or transaction signing is live at a time
#[derive(Default)]
pub struct Function {
    inner: FunctionType,
}

#[allow(clippy::large_enum_variant)]
#[derive(Default)]
enum FunctionType {
    #[default]
    None,

    TrustedInput(TrustedInputGenerator),

    Sign(TxSigner),
}

impl Function {
    /// Create a new / empty function context
    pub const fn new() -> Self {
        Self {
            inner: FunctionType::None,
        }
    }

    /// Start trusted input generation, replacing any current context
    pub fn trusted_input_init(&mut self, index: u32) -> &mut TrustedInputGenerator {
        self.inner = FunctionType::TrustedInput(TrustedInputGenerator::new(index));

        match &mut self.inner {
            FunctionType::TrustedInput(g) => g,
            _ => unreachable!(),
        }
    }

    /// Fetch trusted input context
    pub fn trusted_input(&mut self) -> Option<&mut TrustedInputGenerator> {
        match &mut self.inner {
            FunctionType::TrustedInput(g) => Some(g),
            _ => None,
        }
    }

    /// Fetch the signer context, creating one if none exists.
    ///
    /// An existing signer is retained so continuation passes can reuse the
    /// authorised transaction.
    pub fn signer_or_init(&mut self) -> &mut TxSigner {
        if !matches!(self.inner, FunctionType::Sign(_)) {
            self.inner = FunctionType::Sign(TxSigner::new());
        }

        match &mut self.inner {
            FunctionType::Sign(s) => s,
            _ => unreachable!(),
        }
    }

    /// Fetch signer context
    pub fn signer(&mut self) -> Option<&mut TxSigner> {
        match &mut self.inner {
            FunctionType::Sign(s) => Some(s),
            _ => None,
        }
    }

    /// Fetch signer context
    pub fn signer_ref(&self) -> Option<&TxSigner> {
        match &self.inner {
            FunctionType::Sign(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_trusted_input(&self) -> bool {
        matches!(self.inner, FunctionType::TrustedInput(_))
    }

    /// Clear function context
    pub fn clear(&mut self) {
        self.inner = FunctionType::None;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn contexts_are_exclusive() {
        let mut f = Function::new();
        assert!(f.signer().is_none());

        f.trusted_input_init(0);
        assert!(f.is_trusted_input());

        f.signer_or_init();
        assert!(f.trusted_input().is_none());
        assert!(f.signer_ref().is_some());

        f.clear();
        assert!(f.signer_ref().is_none());
    }
}
