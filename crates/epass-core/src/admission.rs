//! Admission decision logic.
//!
//! The single decision function used identically by the online path (the
//! ledger's write handler) and the offline path (the scanner's local cache
//! fallback). Only the source of truth consulted and the durability path
//! of the resulting admission differ between the two.
//!
//! Per scan attempt:
//! `SCANNED -> HASHED -> {FOUND, NOT_FOUND} -> {ACTIVE_AND_PAID, INACTIVE,
//! UNPAID} -> {ADMIT, ALREADY_ADMITTED, DENY(reason)}`.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Kind of checkpoint an admission is recorded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckinType {
    Main,
    Dining,
    Session,
}

impl CheckinType {
    /// Storage representation, matching the wire form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "MAIN",
            Self::Dining => "DINING",
            Self::Session => "SESSION",
        }
    }
}

impl std::str::FromStr for CheckinType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MAIN" => Ok(Self::Main),
            "DINING" => Ok(Self::Dining),
            "SESSION" => Ok(Self::Session),
            other => Err(Error::UnknownValue(format!("checkin type {other}"))),
        }
    }
}

impl std::fmt::Display for CheckinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status of the registration owning a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    Paid,
    Pending,
    Cancelled,
}

impl RegistrationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paid => "PAID",
            Self::Pending => "PENDING",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for RegistrationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAID" => Ok(Self::Paid),
            "PENDING" => Ok(Self::Pending),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(Error::UnknownValue(format!("registration status {other}"))),
        }
    }
}

/// Joined pass state as seen by whichever source of truth was consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassStatus {
    pub person_name: String,
    pub korean_name: Option<String>,
    pub confirmation_code: Option<String>,
    pub participant_code: Option<String>,
    pub event_id: String,
    pub event_name: String,
    pub is_active: bool,
    pub registration_status: RegistrationStatus,
}

/// Tagged result of a pass lookup. Every consumer must handle absence
/// explicitly; there is no nullable chain to fall through.
#[derive(Debug, Clone)]
pub enum PassLookup {
    Found(PassStatus),
    NotFound,
}

/// Reason an admission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    PassNotFound,
    PassInactive,
    RegistrationNotPaid,
}

impl DenyReason {
    /// Stable wire/storage code for this reason.
    pub const fn code(self) -> &'static str {
        match self {
            Self::PassNotFound => "PASS_NOT_FOUND",
            Self::PassInactive => "PASS_INACTIVE",
            Self::RegistrationNotPaid => "REGISTRATION_NOT_PAID",
        }
    }

    /// Parse a wire code back into a reason, if it is one.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "PASS_NOT_FOUND" => Some(Self::PassNotFound),
            "PASS_INACTIVE" => Some(Self::PassInactive),
            "REGISTRATION_NOT_PAID" => Some(Self::RegistrationNotPaid),
            _ => None,
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of the pure eligibility check, before any write is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Admissible,
    Denied(DenyReason),
}

/// Decide whether a looked-up pass may be admitted.
///
/// A pass is admissible only when it is active and its owning registration
/// is `PAID`. Inactive wins over unpaid when both apply, so a revoked pass
/// never surfaces payment detail.
pub fn evaluate(lookup: &PassLookup) -> Eligibility {
    match lookup {
        PassLookup::NotFound => Eligibility::Denied(DenyReason::PassNotFound),
        PassLookup::Found(status) => {
            if !status.is_active {
                Eligibility::Denied(DenyReason::PassInactive)
            } else if status.registration_status != RegistrationStatus::Paid {
                Eligibility::Denied(DenyReason::RegistrationNotPaid)
            } else {
                Eligibility::Admissible
            }
        }
    }
}
