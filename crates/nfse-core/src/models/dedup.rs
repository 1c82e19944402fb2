use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

use super::invoice::InvoiceRecord;

/// Which duplicate-matching strategy produced a verdict.
///
/// The order of the variants is the trust hierarchy: a government-issued
/// verification code is the most authoritative signal, the composite key
/// catches re-submissions where that code is absent or differs, and the
/// content fingerprint is the last-resort byte-identity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    VerificationCode,
    CompositeKey,
    Fingerprint,
}

impl Display for MatchStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MatchStrategy::VerificationCode => write!(f, "verification_code"),
            MatchStrategy::CompositeKey => write!(f, "composite_key"),
            MatchStrategy::Fingerprint => write!(f, "fingerprint"),
        }
    }
}

/// Outcome of one duplicate check. Transient, produced per candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateVerdict {
    pub is_duplicate: bool,
    pub matched: Option<InvoiceRecord>,
    pub strategy: Option<MatchStrategy>,
    pub reason: String,
}

impl DuplicateVerdict {
    pub fn duplicate(matched: InvoiceRecord, strategy: MatchStrategy, reason: String) -> Self {
        DuplicateVerdict {
            is_duplicate: true,
            matched: Some(matched),
            strategy: Some(strategy),
            reason,
        }
    }

    /// Verdict for a duplicate caught by a persistence-layer uniqueness
    /// constraint rather than by the detector (check-then-insert race).
    /// No matched record is available in that path.
    pub fn constraint(reason: String) -> Self {
        DuplicateVerdict {
            is_duplicate: true,
            matched: None,
            strategy: None,
            reason,
        }
    }

    /// Verdict for a candidate matching an earlier document of the same
    /// batch. The earlier document is not persisted yet, so there is no
    /// matched record to attach.
    pub fn within_batch(strategy: MatchStrategy, reason: String) -> Self {
        DuplicateVerdict {
            is_duplicate: true,
            matched: None,
            strategy: Some(strategy),
            reason,
        }
    }

    pub fn unique() -> Self {
        DuplicateVerdict {
            is_duplicate: false,
            matched: None,
            strategy: None,
            reason: "no existing record matched".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_verdict() {
        let verdict = DuplicateVerdict::unique();
        assert!(!verdict.is_duplicate);
        assert!(verdict.matched.is_none());
        assert!(verdict.strategy.is_none());
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(
            MatchStrategy::VerificationCode.to_string(),
            "verification_code"
        );
        assert_eq!(MatchStrategy::CompositeKey.to_string(), "composite_key");
        assert_eq!(MatchStrategy::Fingerprint.to_string(), "fingerprint");
    }
}
