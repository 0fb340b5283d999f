//! Dashboard statistics

use serde::Serialize;
use utoipa::ToSchema;

use crate::{error::AppResult, models::loan::LoanStatus, repository::Repository};

/// Headline counts for the admin dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DashboardCounts {
    /// Books in the catalog
    pub books: i64,
    /// Registered members
    pub members: i64,
    /// Loans in any status
    pub loans: i64,
    /// Loans waiting for a decision
    pub pending: i64,
}

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
}

/// A failed count is logged and shown as zero
fn or_zero(what: &str, count: AppResult<i64>) -> i64 {
    count.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Could not count {}", what);
        0
    })
}

impl StatsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Never fails; each count degrades on its own
    pub async fn dashboard(&self) -> DashboardCounts {
        let (books, members, loans, pending) = tokio::join!(
            self.repository.books.count(),
            self.repository.members.count(),
            self.repository.loans.count(),
            self.repository.loans.count_by_status(LoanStatus::Pending),
        );

        DashboardCounts {
            books: or_zero("books", books),
            members: or_zero("members", members),
            loans: or_zero("loans", loans),
            pending: or_zero("pending loans", pending),
        }
    }
}
