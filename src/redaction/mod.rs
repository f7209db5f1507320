//! Local PII detection and redaction.
//!
//! Detection is fully local: sensitive text must never leave the process
//! before it has been redacted, so no rule may involve network calls.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Kinds of PII the redactor detects, in rule priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    Email,
    Ssn,
    CreditCard,
    Phone,
    IpAddress,
    DateOfBirth,
}

impl PiiKind {
    /// Replacement token inserted for matches of this kind.
    pub fn token(&self) -> &'static str {
        match self {
            PiiKind::Email => "[EMAIL_REDACTED]",
            PiiKind::Ssn => "[SSN_REDACTED]",
            PiiKind::CreditCard => "[CC_REDACTED]",
            PiiKind::Phone => "[PHONE_REDACTED]",
            PiiKind::IpAddress => "[IP_REDACTED]",
            PiiKind::DateOfBirth => "[DOB_REDACTED]",
        }
    }
}

/// A single detected PII occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// Kind of PII detected.
    pub kind: PiiKind,
    /// Number of matches replaced for this kind.
    pub count: usize,
}

/// Result of redacting a piece of text.
#[derive(Debug, Clone)]
pub struct Redaction {
    /// Text with all detected PII replaced by fixed tokens.
    pub redacted_text: String,
    /// What was found, one entry per matched kind.
    pub detections: Vec<Detection>,
}

struct Rule {
    kind: PiiKind,
    pattern: Regex,
}

/// PII redaction engine with a fixed, ordered rule set.
///
/// Rules are applied in priority order; each rule replaces all of its own
/// matches against the text as left by earlier rules, so overlapping
/// candidates (e.g. a 16-digit run that could read as SSN-like) resolve
/// deterministically. Replacement tokens contain no digits or `@`, so later
/// rules never re-match earlier replacements.
pub struct Redactor {
    rules: Vec<Rule>,
}

impl Redactor {
    /// Build a redactor with the standard rule set. Patterns are compiled
    /// once here, not per call.
    pub fn new() -> Self {
        let rules = vec![
            Rule {
                kind: PiiKind::Email,
                pattern: Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}")
                    .expect("invalid email pattern"),
            },
            Rule {
                kind: PiiKind::Ssn,
                pattern: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("invalid ssn pattern"),
            },
            Rule {
                kind: PiiKind::CreditCard,
                pattern: Regex::new(r"\b(?:\d[ \-]?){13,16}\b").expect("invalid cc pattern"),
            },
            Rule {
                kind: PiiKind::Phone,
                pattern: Regex::new(
                    r"(?:\+?1[ .\-]?)?\(?\d{3}\)?[ .\-]?\d{3}[ .\-]?\d{4}\b",
                )
                .expect("invalid phone pattern"),
            },
            Rule {
                kind: PiiKind::IpAddress,
                pattern: Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("invalid ip pattern"),
            },
            Rule {
                kind: PiiKind::DateOfBirth,
                pattern: Regex::new(
                    r"(?i)\b(?:date of birth|birth ?date|born on|dob)\b[:\s]*[A-Za-z0-9 ,/\-]{4,30}",
                )
                .expect("invalid dob pattern"),
            },
        ];

        Self { rules }
    }

    /// Redact all detectable PII in `text`.
    ///
    /// Never fails for ordinary text, including the empty string.
    pub fn redact(&self, text: &str) -> Redaction {
        let mut redacted = text.to_string();
        let mut detections = Vec::new();

        for rule in &self.rules {
            let count = rule.pattern.find_iter(&redacted).count();
            if count > 0 {
                redacted = rule
                    .pattern
                    .replace_all(&redacted, rule.kind.token())
                    .into_owned();
                detections.push(Detection {
                    kind: rule.kind,
                    count,
                });
            }
        }

        Redaction {
            redacted_text: redacted,
            detections,
        }
    }

    /// Side-effect-free check using the same rule set.
    pub fn contains_pii(&self, text: &str) -> bool {
        self.rules.iter().any(|r| r.pattern.is_match(text))
    }

    /// Convenience wrapper returning only the redacted text.
    pub fn mask_pii(&self, text: &str) -> String {
        self.redact(text).redacted_text
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_email() {
        let redactor = Redactor::new();
        assert_eq!(
            redactor.mask_pii("Contact jane@acme.com for details"),
            "Contact [EMAIL_REDACTED] for details"
        );
    }

    #[test]
    fn test_redact_reports_detections() {
        let redactor = Redactor::new();
        let result = redactor.redact("jane@acme.com and bob@acme.com called from 10.0.0.1");
        assert!(result.redacted_text.contains("[EMAIL_REDACTED]"));
        assert!(result.redacted_text.contains("[IP_REDACTED]"));
        assert!(!result.redacted_text.contains("acme.com"));

        let email = result
            .detections
            .iter()
            .find(|d| d.kind == PiiKind::Email)
            .unwrap();
        assert_eq!(email.count, 2);
    }

    #[test]
    fn test_ssn_and_phone() {
        let redactor = Redactor::new();
        let masked = redactor.mask_pii("SSN 123-45-6789, call (555) 867-5309");
        assert_eq!(masked, "SSN [SSN_REDACTED], call [PHONE_REDACTED]");
    }

    #[test]
    fn test_credit_card_beats_phone() {
        // 16 digits must resolve as a card, not be partially eaten by the
        // phone rule. Card rule runs first.
        let redactor = Redactor::new();
        let masked = redactor.mask_pii("card 4111 1111 1111 1111 on file");
        assert!(masked.contains("[CC_REDACTED]"));
        assert!(!masked.contains("4111"));
    }

    #[test]
    fn test_dob_phrase() {
        let redactor = Redactor::new();
        let masked = redactor.mask_pii("Her date of birth: March 4, 1988 was confirmed.");
        assert!(masked.contains("[DOB_REDACTED]"));
        assert!(!masked.contains("1988"));
    }

    #[test]
    fn test_contains_pii() {
        let redactor = Redactor::new();
        assert!(redactor.contains_pii("reach me at jane@acme.com"));
        assert!(!redactor.contains_pii("no sensitive content here"));
        assert!(!redactor.contains_pii(""));
    }

    #[test]
    fn test_empty_and_clean_text_pass_through() {
        let redactor = Redactor::new();
        assert_eq!(redactor.mask_pii(""), "");
        let clean = "We discussed the renewal timeline and pricing.";
        assert_eq!(redactor.mask_pii(clean), clean);
    }

    #[test]
    fn test_replacement_text_not_rescanned() {
        // The email rule's output must not be re-detected by later rules.
        let redactor = Redactor::new();
        let result = redactor.redact("jane@acme.com");
        assert_eq!(result.detections.len(), 1);
        assert_eq!(result.redacted_text, "[EMAIL_REDACTED]");
    }
}
