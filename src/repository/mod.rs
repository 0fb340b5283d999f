//! Repository layer: store ports and their adapters
//!
//! Services only see the traits below. `books`, `members` and `loans` hold the
//! PostgreSQL adapters; `memory` holds an in-process adapter that keeps every
//! table behind one lock.

pub mod books;
pub mod loans;
pub mod members;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, CreateBook, UpdateBook},
        loan::{Loan, LoanDetails, LoanStatus},
        member::{Member, MemberChanges, NewMember, TopUp},
        page::{Page, PageRequest},
    },
};

/// Catalog store: books and their copy counters
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Insert a book with `available_copies = total_copies`
    async fn create(&self, book: &CreateBook) -> AppResult<Book>;

    async fn get_by_id(&self, id: i32) -> AppResult<Book>;

    /// Partial update; a new total shifts the available count by the same delta
    async fn update(&self, id: i32, changes: &UpdateBook) -> AppResult<Book>;

    /// Delete a book unless open loans reference it
    async fn delete(&self, id: i32) -> AppResult<Book>;

    /// Atomically add `delta` to `available_copies`, keeping it within
    /// `0..=total_copies - approved loans`
    async fn adjust_available_copies(&self, id: i32, delta: i32) -> AppResult<Book>;

    async fn list(&self, request: &PageRequest) -> AppResult<Page<Book>>;

    async fn count(&self) -> AppResult<i64>;
}

/// Membership store: members, roles and wallet balances
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn create(&self, member: &NewMember) -> AppResult<Member>;

    async fn get_by_id(&self, id: i32) -> AppResult<Member>;

    /// Case-insensitive email lookup
    async fn find_by_email(&self, email: &str) -> AppResult<Option<Member>>;

    async fn update(&self, id: i32, changes: &MemberChanges) -> AppResult<Member>;

    /// Delete a member unless open loans reference them
    async fn delete(&self, id: i32) -> AppResult<Member>;

    async fn list(&self, request: &PageRequest) -> AppResult<Page<Member>>;

    async fn count(&self) -> AppResult<i64>;

    /// Record the top-up and increment the balance in one unit of work.
    /// A payment id that was already credited is a `Conflict`.
    async fn credit_wallet(&self, top_up: &TopUp) -> AppResult<Decimal>;
}

/// Result of a compare-and-set on a loan's status
#[derive(Debug, Clone, PartialEq)]
pub enum StatusChange {
    /// The loan moved and any copy adjustment was committed with it
    Applied(Loan),
    /// The loan was no longer in the expected status; nothing was written
    Stale(LoanStatus),
}

/// Loan ledger store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoanStore: Send + Sync {
    /// Insert a `pending` loan
    async fn create(&self, member_id: i32, book_id: i32, issued_date: DateTime<Utc>)
        -> AppResult<Loan>;

    async fn get_by_id(&self, id: i32) -> AppResult<Loan>;

    /// Pending or approved loan of this member for this book, if any
    async fn find_open(&self, member_id: i32, book_id: i32) -> AppResult<Option<Loan>>;

    /// Move a loan from `from` to `to` and shift the book's available copies by
    /// `copies_delta`, all in one unit of work. A counter guard failure rolls
    /// the status change back and reports `AppError::Invariant`.
    async fn transition(
        &self,
        id: i32,
        from: LoanStatus,
        to: LoanStatus,
        copies_delta: i32,
        at: DateTime<Utc>,
    ) -> AppResult<StatusChange>;

    /// Newest first
    async fn list_by_member(&self, member_id: i32) -> AppResult<Vec<LoanDetails>>;

    /// Oldest first; search matches book title, username or email
    async fn list_pending(&self, request: &PageRequest) -> AppResult<Page<LoanDetails>>;

    /// Approved loans issued in `[issued_from, issued_until)`, oldest first
    async fn list_approved(
        &self,
        issued_from: Option<DateTime<Utc>>,
        issued_until: DateTime<Utc>,
    ) -> AppResult<Vec<LoanDetails>>;

    /// Hard delete; an approved loan gives its copy back in the same unit of work
    async fn delete(&self, id: i32) -> AppResult<Loan>;

    async fn count(&self) -> AppResult<i64>;

    async fn count_by_status(&self, status: LoanStatus) -> AppResult<i64>;
}

/// Store container injected into services
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BookStore>,
    pub members: Arc<dyn MemberStore>,
    pub loans: Arc<dyn LoanStore>,
}

impl Repository {
    pub fn new(
        books: Arc<dyn BookStore>,
        members: Arc<dyn MemberStore>,
        loans: Arc<dyn LoanStore>,
    ) -> Self {
        Self { books, members, loans }
    }

    /// Repository backed by PostgreSQL
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::BooksRepository::new(pool.clone())),
            members: Arc::new(members::MembersRepository::new(pool.clone())),
            loans: Arc::new(loans::LoansRepository::new(pool)),
        }
    }

    /// Repository backed by one in-process store
    pub fn in_memory() -> Self {
        let store = memory::MemoryStore::new();
        Self {
            books: Arc::new(store.clone()),
            members: Arc::new(store.clone()),
            loans: Arc::new(store),
        }
    }

    /// Cheap round trip used by the readiness probe
    pub async fn ping(&self) -> AppResult<()> {
        self.books.count().await.map(|_| ())
    }
}

/// Turn a unique-constraint violation into a `Conflict`, pass anything else through
pub(crate) fn unique_violation(err: sqlx::Error, message: impl Into<String>) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            AppError::Conflict(message.into())
        }
        _ => AppError::Database(err),
    }
}
