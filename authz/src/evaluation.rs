//! Evaluation results and rule effects.
//!
//! An [`Evaluation`] is a small set of bit flags. The composite values
//! (`INDETERMINATE_PERMIT` and friends) carry the decisions an indeterminate
//! result could have produced, so combining algorithms can ask "could this have
//! been a deny" with a plain bitwise AND.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result of evaluating a rule, policy or policy set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Evaluation(u8);

impl Evaluation {
    pub const PERMIT: Evaluation = Evaluation(0b0001);
    pub const DENY: Evaluation = Evaluation(0b0010);
    pub const INDETERMINATE: Evaluation = Evaluation(0b0100);
    pub const NOT_APPLICABLE: Evaluation = Evaluation(0b1000);

    pub const INDETERMINATE_PERMIT: Evaluation =
        Evaluation(Self::INDETERMINATE.0 | Self::PERMIT.0);
    pub const INDETERMINATE_DENY: Evaluation = Evaluation(Self::INDETERMINATE.0 | Self::DENY.0);
    pub const INDETERMINATE_DENY_OR_PERMIT: Evaluation =
        Evaluation(Self::INDETERMINATE.0 | Self::DENY.0 | Self::PERMIT.0);

    /// Every valid value, in display order.
    pub const ALL: [Evaluation; 7] = [
        Self::PERMIT,
        Self::DENY,
        Self::NOT_APPLICABLE,
        Self::INDETERMINATE,
        Self::INDETERMINATE_PERMIT,
        Self::INDETERMINATE_DENY,
        Self::INDETERMINATE_DENY_OR_PERMIT,
    ];

    /// Builds an evaluation from raw bits, rejecting combinations that break
    /// the flag invariant.
    pub fn from_bits(bits: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.0 == bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// True when every flag of `other` is also set in `self`.
    pub fn contains(self, other: Evaluation) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_permit(self) -> bool {
        self == Self::PERMIT
    }

    pub fn is_deny(self) -> bool {
        self == Self::DENY
    }

    pub fn is_not_applicable(self) -> bool {
        self == Self::NOT_APPLICABLE
    }

    pub fn is_indeterminate(self) -> bool {
        self.contains(Self::INDETERMINATE)
    }

    /// `PERMIT` or `DENY`.
    pub fn is_determinate(self) -> bool {
        self.is_permit() || self.is_deny()
    }

    pub fn as_str(self) -> &'static str {
        match self.0 {
            0b0001 => "permit",
            0b0010 => "deny",
            0b1000 => "not-applicable",
            0b0101 => "indeterminate-permit",
            0b0110 => "indeterminate-deny",
            0b0111 => "indeterminate-deny-or-permit",
            _ => "indeterminate",
        }
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Evaluation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("unknown evaluation '{}'", s))
    }
}

impl TryFrom<String> for Evaluation {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Evaluation> for String {
    fn from(value: Evaluation) -> Self {
        value.as_str().to_string()
    }
}

/// The decision a matching rule contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Permit,
    Deny,
}

impl Effect {
    /// The determinate evaluation for this effect.
    pub fn evaluation(self) -> Evaluation {
        match self {
            Effect::Permit => Evaluation::PERMIT,
            Effect::Deny => Evaluation::DENY,
        }
    }

    /// The indeterminate evaluation carrying this effect.
    pub fn indeterminate(self) -> Evaluation {
        match self {
            Effect::Permit => Evaluation::INDETERMINATE_PERMIT,
            Effect::Deny => Evaluation::INDETERMINATE_DENY,
        }
    }

    /// Maps a determinate evaluation back to an effect.
    pub fn from_evaluation(evaluation: Evaluation) -> Option<Self> {
        if evaluation.is_permit() {
            Some(Effect::Permit)
        } else if evaluation.is_deny() {
            Some(Effect::Deny)
        } else {
            None
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Permit => f.write_str("permit"),
            Effect::Deny => f.write_str("deny"),
        }
    }
}
