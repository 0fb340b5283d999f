//! Loans repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use super::{books::shift_available_copies, LoanStore, StatusChange};
use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{Loan, LoanDetails, LoanStatus},
        page::{like_pattern, Page, PageRequest},
    },
};

const DETAILS_SELECT: &str = r#"
    SELECT l.id, l.member_id, l.book_id, l.issued_date, l.status,
           b.title AS book_title, m.username, m.email
    FROM loans l
    JOIN books b ON b.id = l.book_id
    JOIN members m ON m.id = l.member_id
"#;

const PENDING_FILTER: &str = r#"
    l.status = 'pending'
    AND ($1::text IS NULL
         OR LOWER(b.title) LIKE $1
         OR LOWER(m.username) LIKE $1
         OR LOWER(m.email) LIKE $1)
"#;

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn not_found(id: i32) -> AppError {
        AppError::NotFound(format!("Loan with id {} not found", id))
    }
}

#[async_trait]
impl LoanStore for LoansRepository {
    async fn create(
        &self,
        member_id: i32,
        book_id: i32,
        issued_date: DateTime<Utc>,
    ) -> AppResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (member_id, book_id, issued_date, status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING *
            "#,
        )
        .bind(member_id)
        .bind(book_id)
        .bind(issued_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(loan)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Self::not_found(id))
    }

    async fn find_open(&self, member_id: i32, book_id: i32) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            SELECT * FROM loans
            WHERE member_id = $1 AND book_id = $2 AND status IN ('pending', 'approved')
            ORDER BY issued_date DESC
            LIMIT 1
            "#,
        )
        .bind(member_id)
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(loan)
    }

    async fn transition(
        &self,
        id: i32,
        from: LoanStatus,
        to: LoanStatus,
        copies_delta: i32,
        at: DateTime<Utc>,
    ) -> AppResult<StatusChange> {
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans SET status = $3, updated_at = $4
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(loan) = moved else {
            let current: Option<LoanStatus> =
                sqlx::query_scalar("SELECT status FROM loans WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return current.map(StatusChange::Stale).ok_or_else(|| Self::not_found(id));
        };

        if copies_delta != 0
            && shift_available_copies(&mut *tx, loan.book_id, copies_delta, at)
                .await?
                .is_none()
        {
            tx.rollback().await?;
            return Err(AppError::Invariant(format!(
                "Book {} cannot move its available copies by {}",
                loan.book_id, copies_delta
            )));
        }

        tx.commit().await?;
        Ok(StatusChange::Applied(loan))
    }

    async fn list_by_member(&self, member_id: i32) -> AppResult<Vec<LoanDetails>> {
        let loans = sqlx::query_as::<_, LoanDetails>(&format!(
            "{} WHERE l.member_id = $1 ORDER BY l.issued_date DESC, l.id DESC",
            DETAILS_SELECT
        ))
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    async fn list_pending(&self, request: &PageRequest) -> AppResult<Page<LoanDetails>> {
        let pattern = request.search_term().map(|t| like_pattern(&t));

        let total: i64 = sqlx::query_scalar(&format!(
            r#"
            SELECT COUNT(*)
            FROM loans l
            JOIN books b ON b.id = l.book_id
            JOIN members m ON m.id = l.member_id
            WHERE {}
            "#,
            PENDING_FILTER
        ))
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        let loans = sqlx::query_as::<_, LoanDetails>(&format!(
            "{} WHERE {} ORDER BY l.issued_date {}, l.id ASC LIMIT $2 OFFSET $3",
            DETAILS_SELECT,
            PENDING_FILTER,
            request.order().as_sql()
        ))
        .bind(&pattern)
        .bind(request.limit())
        .bind(request.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(loans, total, request))
    }

    async fn list_approved(
        &self,
        issued_from: Option<DateTime<Utc>>,
        issued_until: DateTime<Utc>,
    ) -> AppResult<Vec<LoanDetails>> {
        let loans = sqlx::query_as::<_, LoanDetails>(&format!(
            r#"
            {}
            WHERE l.status = 'approved'
              AND ($1::timestamptz IS NULL OR l.issued_date >= $1)
              AND l.issued_date < $2
            ORDER BY l.issued_date ASC, l.id ASC
            "#,
            DETAILS_SELECT
        ))
        .bind(issued_from)
        .bind(issued_until)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    async fn delete(&self, id: i32) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        let loan = sqlx::query_as::<_, Loan>("DELETE FROM loans WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Self::not_found(id))?;

        if loan.status == LoanStatus::Approved
            && shift_available_copies(&mut *tx, loan.book_id, 1, Utc::now())
                .await?
                .is_none()
        {
            tx.rollback().await?;
            return Err(AppError::Invariant(format!(
                "Book {} cannot take back the copy held by loan {}",
                loan.book_id, id
            )));
        }

        tx.commit().await?;
        Ok(loan)
    }

    async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loans")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_by_status(&self, status: LoanStatus) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE status = $1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
