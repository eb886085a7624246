//! Verification records: carbon-saving claims awaiting adjudication.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Decimal places carried by verification quantities. Fixed precision
/// avoids floating rounding drift across services.
pub const VERIFICATION_DECIMAL_PLACES: u32 = 4;

/// Adjudication state of a verification.
///
/// `Pending` is the initial state; `Approved` and `Rejected` are
/// terminal; no further transitions are permitted from either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "PENDING",
            VerificationStatus::Approved => "APPROVED",
            VerificationStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(VerificationStatus::Pending),
            "APPROVED" => Some(VerificationStatus::Approved),
            "REJECTED" => Some(VerificationStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, VerificationStatus::Pending)
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A claim that a trip saved a given amount of CO2, pending or resolved
/// approval/rejection. Never physically deleted (audit trail).
///
/// Invariants:
/// - `signature_hash` and `signed_at` are set iff status is Approved.
/// - `verifier_id` is set iff status is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub id: Uuid,
    /// External trip reference; one verification per trip.
    pub trip_id: String,
    /// Claimant (EV owner) identity.
    pub user_id: String,
    /// Adjudicator (CVA) identity; set on approval or rejection.
    pub verifier_id: Option<String>,
    pub co2_saved_kg: Decimal,
    pub credits_suggested: Decimal,
    pub status: VerificationStatus,
    pub remarks: Option<String>,
    /// Verifier's attestation digest; present only when approved.
    pub signature_hash: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Verification {
    /// Create a fresh pending record. Quantities are quantized to the
    /// fixed verification precision.
    pub fn new(
        trip_id: impl Into<String>,
        user_id: impl Into<String>,
        co2_saved_kg: Decimal,
        credits_suggested: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            trip_id: trip_id.into(),
            user_id: user_id.into(),
            verifier_id: None,
            co2_saved_kg: co2_saved_kg.round_dp(VERIFICATION_DECIMAL_PLACES),
            credits_suggested: credits_suggested.round_dp(VERIFICATION_DECIMAL_PLACES),
            status: VerificationStatus::Pending,
            remarks: None,
            signature_hash: None,
            signed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Query filter for verification listings. Fields left `None` do not
/// constrain the result set.
#[derive(Debug, Clone, Default)]
pub struct VerificationFilter {
    pub status: Option<VerificationStatus>,
    pub user_id: Option<String>,
    pub verifier_id: Option<String>,
}

/// Sortable columns for verification listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    CreatedAt,
    UpdatedAt,
    Co2SavedKg,
}

impl SortBy {
    /// Column name for ORDER BY. Closed enum, so this cannot be abused
    /// for SQL injection.
    pub fn column(&self) -> &'static str {
        match self {
            SortBy::CreatedAt => "created_at",
            SortBy::UpdatedAt => "updated_at",
            SortBy::Co2SavedKg => "co2_saved_kg",
        }
    }
}

impl Default for SortBy {
    fn default() -> Self {
        SortBy::CreatedAt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Desc
    }
}

/// Offset-based pagination. Page numbering starts at 1.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Page {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, 100),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.page_size as i64
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

/// Aggregate statistics over verifications. CO2 and credit totals sum
/// approved records only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationStats {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    /// Percentage; 0 when there are no verifications at all.
    pub approval_rate: f64,
    pub total_co2_saved: Decimal,
    pub total_credits: Decimal,
}

impl VerificationStats {
    pub fn approval_rate_of(approved: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            approved as f64 / total as f64 * 100.0
        }
    }
}
