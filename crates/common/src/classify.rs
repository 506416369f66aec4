// Syntactic credential classification.
//
// Pure and deterministic: no I/O, no network. Values that look like another
// service's key are rejected before any probe is attempted.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Minimum length for hosting-service tokens and unrecognized long values.
pub const MIN_TOKEN_LEN: usize = 40;

/// Known prefixes of other services' keys, checked in order.
const FOREIGN_PREFIXES: &[(&str, &str)] = &[
    ("sk-ant-", "Anthropic"),
    ("sk-", "OpenAI"),
    ("AKIA", "AWS"),
    ("ASIA", "AWS"),
    ("xoxb-", "Slack"),
    ("xoxp-", "Slack"),
    ("xoxa-", "Slack"),
    ("glpat-", "GitLab"),
    ("AIza", "Google"),
];

/// Hosting-service token prefixes.
const HOSTING_PREFIXES: &[(&str, Classification)] = &[
    ("github_pat_", Classification::FineGrained),
    ("ghp_", Classification::Classic),
    ("gho_", Classification::Classic),
    ("ghu_", Classification::Classic),
    ("ghs_", Classification::Classic),
    ("ghr_", Classification::Classic),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum InvalidReason {
    Empty,
    IllegalCharacter,
    ForeignService { service: String },
    TooShort { len: usize, min: usize },
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("value is empty"),
            Self::IllegalCharacter => {
                f.write_str("value contains whitespace, quotes, or control characters")
            }
            Self::ForeignService { service } => {
                write!(f, "value looks like a {service} key, not a repository token")
            }
            Self::TooShort { len, min } => {
                write!(f, "value is {len} characters, expected at least {min}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    Classic,
    FineGrained,
    /// No known prefix but long enough to plausibly be a token.
    UnknownLong,
    Invalid(InvalidReason),
}

impl Classification {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::FineGrained => "fine-grained",
            Self::UnknownLong => "unknown-long",
            Self::Invalid(_) => "invalid",
        }
    }
}

/// Classify a raw credential value.
pub fn classify(raw: &str) -> Classification {
    let value = raw.trim();
    if value.is_empty() {
        return Classification::Invalid(InvalidReason::Empty);
    }

    if value
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '"' | '\'' | '`'))
    {
        return Classification::Invalid(InvalidReason::IllegalCharacter);
    }

    if let Some((_, service)) = FOREIGN_PREFIXES.iter().find(|(prefix, _)| value.starts_with(prefix)) {
        return Classification::Invalid(InvalidReason::ForeignService {
            service: (*service).to_string(),
        });
    }

    let len = value.chars().count();
    let classification = HOSTING_PREFIXES
        .iter()
        .find(|(prefix, _)| value.starts_with(prefix))
        .map(|(_, classification)| classification.clone())
        .unwrap_or(Classification::UnknownLong);

    if len < MIN_TOKEN_LEN {
        return Classification::Invalid(InvalidReason::TooShort { len, min: MIN_TOKEN_LEN });
    }

    classification
}
