//! Combining algorithms.
//!
//! Each algorithm reduces the ordered results of a node's children to a single
//! result. Only first-applicable depends on the order of its input; the
//! override tables follow the extended indeterminate rules of XACML 3.0.

use crate::error::AuthzError;
use crate::evaluation::Evaluation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CombiningAlgorithm {
    DenyOverrides,
    PermitOverrides,
    FirstApplicable,
    DenyUnlessPermit,
    PermitUnlessDeny,
}

impl CombiningAlgorithm {
    pub const ALL: [CombiningAlgorithm; 5] = [
        CombiningAlgorithm::DenyOverrides,
        CombiningAlgorithm::PermitOverrides,
        CombiningAlgorithm::FirstApplicable,
        CombiningAlgorithm::DenyUnlessPermit,
        CombiningAlgorithm::PermitUnlessDeny,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CombiningAlgorithm::DenyOverrides => "deny-overrides",
            CombiningAlgorithm::PermitOverrides => "permit-overrides",
            CombiningAlgorithm::FirstApplicable => "first-applicable",
            CombiningAlgorithm::DenyUnlessPermit => "deny-unless-permit",
            CombiningAlgorithm::PermitUnlessDeny => "permit-unless-deny",
        }
    }

    /// Whether no further children need to be evaluated once `result` has
    /// been seen.
    pub fn is_final(self, result: Evaluation) -> bool {
        match self {
            CombiningAlgorithm::FirstApplicable => !result.is_not_applicable(),
            _ => false,
        }
    }

    /// Reduces child results to one. An empty input is `NOT_APPLICABLE` for
    /// every algorithm.
    pub fn combine(self, results: &[Evaluation]) -> Evaluation {
        if results.is_empty() {
            return Evaluation::NOT_APPLICABLE;
        }
        match self {
            CombiningAlgorithm::DenyOverrides => {
                overrides(results, Evaluation::DENY, Evaluation::PERMIT)
            }
            CombiningAlgorithm::PermitOverrides => {
                overrides(results, Evaluation::PERMIT, Evaluation::DENY)
            }
            CombiningAlgorithm::FirstApplicable => results
                .iter()
                .copied()
                .find(|r| !r.is_not_applicable())
                .unwrap_or(Evaluation::NOT_APPLICABLE),
            CombiningAlgorithm::DenyUnlessPermit => {
                if results.iter().any(|r| r.is_permit()) {
                    Evaluation::PERMIT
                } else {
                    Evaluation::DENY
                }
            }
            CombiningAlgorithm::PermitUnlessDeny => {
                if results.iter().any(|r| r.is_deny()) {
                    Evaluation::DENY
                } else {
                    Evaluation::PERMIT
                }
            }
        }
    }
}

/// Shared table for deny-overrides (`winner` = DENY) and permit-overrides
/// (`winner` = PERMIT).
fn overrides(results: &[Evaluation], winner: Evaluation, loser: Evaluation) -> Evaluation {
    let indeterminate_winner = Evaluation::from_bits(Evaluation::INDETERMINATE.bits() | winner.bits())
        .unwrap_or(Evaluation::INDETERMINATE_DENY_OR_PERMIT);
    let indeterminate_loser = Evaluation::from_bits(Evaluation::INDETERMINATE.bits() | loser.bits())
        .unwrap_or(Evaluation::INDETERMINATE_DENY_OR_PERMIT);

    let mut error_winner = false;
    let mut error_loser = false;
    let mut error_both = false;
    let mut loser_seen = false;

    for &result in results {
        if result == winner {
            return winner;
        }
        if result == loser {
            loser_seen = true;
        } else if result.is_indeterminate() {
            let maybe_winner = result.contains(winner);
            let maybe_loser = result.contains(loser);
            match (maybe_winner, maybe_loser) {
                (true, false) => error_winner = true,
                (false, true) => error_loser = true,
                // both bits, or a bare INDETERMINATE that could be anything
                _ => error_both = true,
            }
        }
    }

    if error_both || (error_winner && (error_loser || loser_seen)) {
        Evaluation::INDETERMINATE_DENY_OR_PERMIT
    } else if error_winner {
        indeterminate_winner
    } else if loser_seen {
        loser
    } else if error_loser {
        indeterminate_loser
    } else {
        Evaluation::NOT_APPLICABLE
    }
}

impl fmt::Display for CombiningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CombiningAlgorithm {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| AuthzError::UnknownAlgorithm(s.to_string()))
    }
}
