//! Loan ledger: loan records, status changes and date-scoped queries

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::{
    config::LendingConfig,
    error::{AppError, AppResult},
    models::{
        loan::{Loan, LoanDetails, LoanStatus, OverdueLoan, Transition},
        page::{Page, PageRequest},
    },
    repository::{Repository, StatusChange},
    services::clock::Clock,
};

/// A compare-and-set miss is re-read at most this many times. The lifecycle
/// only moves forward, so a loan can be overtaken at most twice.
const MAX_ATTEMPTS: usize = 3;

/// Last day of the loan period
pub fn due_date(issued: DateTime<Utc>, loan_period_days: i64) -> NaiveDate {
    issued.date_naive() + Duration::days(loan_period_days)
}

/// Started days since issue beyond the loan period, never negative
pub fn days_overdue(issued: DateTime<Utc>, now: DateTime<Utc>, loan_period_days: i64) -> i64 {
    let elapsed = now - issued;
    let mut days = elapsed.num_days();
    if elapsed > Duration::days(days) {
        days += 1;
    }
    (days - loan_period_days).max(0)
}

pub fn fine(days_overdue: i64, fine_per_day: Decimal) -> Decimal {
    Decimal::from(days_overdue.max(0)) * fine_per_day
}

fn start_of(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

#[derive(Clone)]
pub struct LedgerService {
    repository: Repository,
    lending: LendingConfig,
    clock: Arc<dyn Clock>,
}

impl LedgerService {
    pub fn new(repository: Repository, lending: LendingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            lending,
            clock,
        }
    }

    pub async fn get_loan(&self, id: i32) -> AppResult<Loan> {
        self.repository.loans.get_by_id(id).await
    }

    pub async fn list_by_member(&self, member_id: i32) -> AppResult<Vec<LoanDetails>> {
        self.repository.loans.list_by_member(member_id).await
    }

    pub async fn list_pending(&self, request: &PageRequest) -> AppResult<Page<LoanDetails>> {
        self.repository.loans.list_pending(request).await
    }

    /// Approved loans whose last day is today
    pub async fn list_due_today(&self) -> AppResult<Vec<LoanDetails>> {
        let issued_on = self.clock.today() - Duration::days(self.lending.loan_period_days);
        let from = start_of(issued_on);
        self.repository
            .loans
            .list_approved(Some(from), from + Duration::days(1))
            .await
    }

    /// Approved loans past their last day, with the fine accrued so far
    pub async fn list_overdue(&self) -> AppResult<Vec<OverdueLoan>> {
        let now = self.clock.now();
        let cutoff = start_of(now.date_naive() - Duration::days(self.lending.loan_period_days));
        let loans = self.repository.loans.list_approved(None, cutoff).await?;

        Ok(loans
            .into_iter()
            .map(|loan| {
                let days = days_overdue(loan.issued_date, now, self.lending.loan_period_days);
                OverdueLoan {
                    due_date: due_date(loan.issued_date, self.lending.loan_period_days),
                    days_overdue: days,
                    fine: fine(days, self.lending.fine_per_day),
                    loan,
                }
            })
            .collect())
    }

    /// Move a loan to `next` following the lifecycle.
    ///
    /// Asking for the status a loan already has returns it unchanged. The copy
    /// counter moves in the same unit of work as the status; when approving
    /// and no copy is left the loan stays pending and `Unavailable` is returned.
    pub async fn update_status(&self, id: i32, next: LoanStatus) -> AppResult<Loan> {
        let mut loan = self.repository.loans.get_by_id(id).await?;

        for _ in 0..MAX_ATTEMPTS {
            let copies_delta = match loan.status.transition(next)? {
                Transition::Unchanged => {
                    tracing::debug!(loan_id = id, status = %next, "Loan already in requested status");
                    return Ok(loan);
                }
                Transition::Apply { copies_delta } => copies_delta,
            };

            let change = self
                .repository
                .loans
                .transition(id, loan.status, next, copies_delta, self.clock.now())
                .await
                .map_err(|e| match e {
                    AppError::Invariant(_) if next == LoanStatus::Approved => AppError::Unavailable(
                        format!("No copy of book {} is available", loan.book_id),
                    ),
                    other => other,
                })?;

            match change {
                StatusChange::Applied(updated) => {
                    tracing::info!(
                        loan_id = id,
                        book_id = updated.book_id,
                        from = %loan.status,
                        to = %updated.status,
                        copies_delta,
                        "Loan status changed"
                    );
                    return Ok(updated);
                }
                StatusChange::Stale(current) => {
                    tracing::debug!(
                        loan_id = id,
                        expected = %loan.status,
                        current = %current,
                        "Loan changed concurrently, re-reading"
                    );
                    loan = self.repository.loans.get_by_id(id).await?;
                }
            }
        }

        Err(AppError::Conflict(format!(
            "Loan {} kept changing while moving it to {}",
            id, next
        )))
    }

    /// Hard delete outside the lifecycle; an approved loan returns its copy
    pub async fn delete_loan(&self, id: i32) -> AppResult<Loan> {
        let loan = self.repository.loans.delete(id).await?;
        tracing::info!(
            loan_id = id,
            book_id = loan.book_id,
            status = %loan.status,
            "Loan deleted"
        );
        Ok(loan)
    }
}
