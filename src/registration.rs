//! Drone registration parsing and flight-authorization classification.
//!
//! Registrations look like `SB-XY` or `SD-XY` where `X` and `Y` are class letters
//! `A`-`D`. The first class letter decides whether the drone may fly.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Strict shape used for identity: prefix, dash, two class letters
static REGISTRATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^S[BD]-([ABCD])([ABCD])$").unwrap());

/// Hex colors used by the map layers for each classification
pub const AUTHORIZED_COLOR: &str = "#22c55e";
pub const UNAUTHORIZED_COLOR: &str = "#ef4444";

/// Flight-authorization class of a tracked drone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Authorized,
    Unauthorized,
}

impl Classification {
    /// Classify a raw identifier string. Malformed input is unauthorized.
    pub fn from_identifier(raw: Option<&str>) -> Self {
        if can_fly(raw) {
            Classification::Authorized
        } else {
            Classification::Unauthorized
        }
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self, Classification::Authorized)
    }

    /// Map color for this classification
    pub fn color(&self) -> &'static str {
        match self {
            Classification::Authorized => AUTHORIZED_COLOR,
            Classification::Unauthorized => UNAUTHORIZED_COLOR,
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Authorized => write!(f, "authorized"),
            Classification::Unauthorized => write!(f, "unauthorized"),
        }
    }
}

fn canonical_form(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Canonicalize a registration for use as a stable identity.
///
/// Returns `None` unless the value matches `S[BD]-XY` with class letters `X`, `Y`.
/// A doubled letter is rejected except for `BB`.
pub fn normalize_registration(raw: Option<&str>) -> Option<String> {
    let up = canonical_form(raw?);
    let caps = REGISTRATION_RE.captures(&up)?;

    let first = &caps[1];
    let second = &caps[2];
    if first != "B" && first == second {
        return None;
    }
    Some(up)
}

/// First class letter of a registration, without the distinct-letters rule.
///
/// Used for classification only, so that a registration rejected by
/// [`normalize_registration`] still gets a color.
pub fn class_letter(raw: Option<&str>) -> Option<char> {
    let up = canonical_form(raw?);
    let caps = REGISTRATION_RE.captures(&up)?;
    caps[1].chars().next()
}

/// Sole authorization predicate: the first class letter is `B`
pub fn can_fly(raw: Option<&str>) -> bool {
    class_letter(raw) == Some('B')
}
