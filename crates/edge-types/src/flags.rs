//! Slot behavior flags.
//!
//! The contract's raw flag word packs four bits (deterministic,
//! non-deterministic, safety-critical, audit-required).  Here they are named
//! fields, and the deterministic / non-deterministic exclusion is carried by
//! the [`Determinism`] enum so the invalid combination cannot be built.
//! [`BehaviorFlags::from_bits`] accepts a raw word and rejects it.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::result::EdgeError;

pub const FLAG_DETERMINISTIC: u32 = 0x0000_0001;
pub const FLAG_NON_DETERMINISTIC: u32 = 0x0000_0002;
pub const FLAG_SAFETY_CRITICAL: u32 = 0x0000_0004;
pub const FLAG_AUDIT_REQUIRED: u32 = 0x0000_0008;

const KNOWN_FLAGS: u32 =
    FLAG_DETERMINISTIC | FLAG_NON_DETERMINISTIC | FLAG_SAFETY_CRITICAL | FLAG_AUDIT_REQUIRED;

/// Declared timing determinism of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub enum Determinism {
    #[default]
    Unspecified,
    Deterministic,
    NonDeterministic,
}

/// Named behavior flags of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub struct BehaviorFlags {
    pub determinism: Determinism,
    pub safety_critical: bool,
    pub audit_required: bool,
}

impl BehaviorFlags {
    pub fn new(determinism: Determinism) -> Self {
        Self {
            determinism,
            ..Self::default()
        }
    }

    pub fn safety_critical(mut self) -> Self {
        self.safety_critical = true;
        self
    }

    pub fn audit_required(mut self) -> Self {
        self.audit_required = true;
        self
    }

    pub fn is_deterministic(&self) -> bool {
        self.determinism == Determinism::Deterministic
    }

    /// Decode a raw contract flag word.
    ///
    /// # Errors
    ///
    /// [`EdgeError::Invalid`] when both determinism bits are set or the word
    /// carries unknown bits.
    pub fn from_bits(bits: u32) -> Result<Self, EdgeError> {
        if bits & !KNOWN_FLAGS != 0 {
            return Err(EdgeError::Invalid(format!(
                "unknown behavior flag bits {:#x}",
                bits & !KNOWN_FLAGS
            )));
        }
        let determinism = match (
            bits & FLAG_DETERMINISTIC != 0,
            bits & FLAG_NON_DETERMINISTIC != 0,
        ) {
            (true, true) => {
                return Err(EdgeError::Invalid(
                    "deterministic and non-deterministic flags are exclusive".to_string(),
                ));
            }
            (true, false) => Determinism::Deterministic,
            (false, true) => Determinism::NonDeterministic,
            (false, false) => Determinism::Unspecified,
        };
        Ok(Self {
            determinism,
            safety_critical: bits & FLAG_SAFETY_CRITICAL != 0,
            audit_required: bits & FLAG_AUDIT_REQUIRED != 0,
        })
    }

    /// Encode back into a raw contract flag word.
    pub fn bits(&self) -> u32 {
        let mut bits = match self.determinism {
            Determinism::Unspecified => 0,
            Determinism::Deterministic => FLAG_DETERMINISTIC,
            Determinism::NonDeterministic => FLAG_NON_DETERMINISTIC,
        };
        if self.safety_critical {
            bits |= FLAG_SAFETY_CRITICAL;
        }
        if self.audit_required {
            bits |= FLAG_AUDIT_REQUIRED;
        }
        bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_determinism_bits_rejected() {
        let result = BehaviorFlags::from_bits(FLAG_DETERMINISTIC | FLAG_NON_DETERMINISTIC);
        assert!(matches!(result, Err(EdgeError::Invalid(_))));
    }

    #[test]
    fn unknown_bits_rejected() {
        assert!(BehaviorFlags::from_bits(0x100).is_err());
    }

    #[test]
    fn decode_named_flags() {
        let flags =
            BehaviorFlags::from_bits(FLAG_DETERMINISTIC | FLAG_AUDIT_REQUIRED).unwrap();
        assert!(flags.is_deterministic());
        assert!(flags.audit_required);
        assert!(!flags.safety_critical);
        assert_eq!(flags.bits(), FLAG_DETERMINISTIC | FLAG_AUDIT_REQUIRED);
    }

    #[test]
    fn builder_sets_flags() {
        let flags = BehaviorFlags::new(Determinism::NonDeterministic)
            .safety_critical()
            .audit_required();
        assert_eq!(
            flags.bits(),
            FLAG_NON_DETERMINISTIC | FLAG_SAFETY_CRITICAL | FLAG_AUDIT_REQUIRED
        );
        assert_eq!(BehaviorFlags::default().bits(), 0);
    }
}
