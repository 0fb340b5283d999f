//! Loan (borrow request) model and its lifecycle

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

/// Loan status.
///
/// ```text
/// pending ──approve──> approved ──return──> returned
///    └─────reject────> rejected
/// ```
///
/// `rejected` and `returned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
    Returned,
}

/// Outcome of checking a status change against the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Legal move; `copies_delta` must be applied to the book in the same unit of work
    Apply { copies_delta: i32 },
    /// The loan is already in the target status
    Unchanged,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
            LoanStatus::Returned => "returned",
        }
    }

    /// Pending and approved loans still reference a book copy
    pub fn is_open(&self) -> bool {
        matches!(self, LoanStatus::Pending | LoanStatus::Approved)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Rejected | LoanStatus::Returned)
    }

    /// Check a move to `next`
    pub fn transition(self, next: LoanStatus) -> AppResult<Transition> {
        use LoanStatus::*;

        match (self, next) {
            (from, to) if from == to => Ok(Transition::Unchanged),
            (Pending, Approved) => Ok(Transition::Apply { copies_delta: -1 }),
            (Pending, Rejected) => Ok(Transition::Apply { copies_delta: 0 }),
            (Approved, Returned) => Ok(Transition::Apply { copies_delta: 1 }),
            (from, to) => Err(AppError::Conflict(format!(
                "Cannot move loan from {} to {}",
                from, to
            ))),
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(LoanStatus::Pending),
            "approved" => Ok(LoanStatus::Approved),
            "rejected" => Ok(LoanStatus::Rejected),
            "returned" => Ok(LoanStatus::Returned),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

super::text_column!(LoanStatus);

/// Loan record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub member_id: i32,
    pub book_id: i32,
    pub issued_date: DateTime<Utc>,
    pub status: LoanStatus,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Loan joined with its book and member, for listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LoanDetails {
    pub id: i32,
    pub member_id: i32,
    pub book_id: i32,
    pub issued_date: DateTime<Utc>,
    pub status: LoanStatus,
    pub book_title: String,
    pub username: String,
    pub email: String,
}

/// Approved loan past its due date, with the fine owed so far
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct OverdueLoan {
    #[serde(flatten)]
    pub loan: LoanDetails,
    pub due_date: NaiveDate,
    pub days_overdue: i64,
    #[schema(value_type = String, example = "50")]
    pub fine: Decimal,
}

/// Borrow request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateLoanRequest {
    pub book_id: i32,
    /// Defaults to the caller; only admins may borrow on behalf of someone else
    pub member_id: Option<i32>,
}

/// Status change requested through the generic ledger update
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateLoanStatus {
    pub status: LoanStatus,
}
