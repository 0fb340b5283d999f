//! Books repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgExecutor, Pool, Postgres};

use super::BookStore;
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{normalize_isbn, Book, BookSortKey, CreateBook, UpdateBook},
        page::{like_pattern, Page, PageRequest},
    },
};

const SEARCH_FILTER: &str = r#"
    ($1::text IS NULL
     OR LOWER(title) LIKE $1
     OR LOWER(author) LIKE $1
     OR LOWER(COALESCE(genre, '')) LIKE $1
     OR LOWER(COALESCE(isbn, '')) LIKE $1)
"#;

/// Guarded counter shift shared with the loan ledger's transactions.
/// Returns `None` when the book is missing or the guard rejects the delta.
pub(crate) async fn shift_available_copies<'e, E>(
    executor: E,
    id: i32,
    delta: i32,
    at: DateTime<Utc>,
) -> AppResult<Option<Book>>
where
    E: PgExecutor<'e>,
{
    let book = sqlx::query_as::<_, Book>(
        r#"
        UPDATE books
        SET available_copies = available_copies + $2, updated_at = $3
        WHERE id = $1
          AND available_copies::bigint + $2 BETWEEN 0 AND total_copies
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(delta)
    .bind(at)
    .fetch_optional(executor)
    .await?;

    Ok(book)
}

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    fn not_found(id: i32) -> AppError {
        AppError::NotFound(format!("Book with id {} not found", id))
    }
}

#[async_trait]
impl BookStore for BooksRepository {
    async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, author, publisher, genre, isbn, pages,
                               total_copies, available_copies, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $8)
            RETURNING *
            "#,
        )
        .bind(book.title.trim())
        .bind(book.author.trim())
        .bind(&book.publisher)
        .bind(&book.genre)
        .bind(book.isbn.as_deref().map(normalize_isbn))
        .bind(book.pages)
        .bind(book.total_copies)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Self::not_found(id))
    }

    async fn update(&self, id: i32, changes: &UpdateBook) -> AppResult<Book> {
        // Every right-hand side sees the pre-update row, so the available
        // count moves by exactly (new total - old total).
        let updated = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                publisher = COALESCE($4, publisher),
                genre = COALESCE($5, genre),
                isbn = COALESCE($6, isbn),
                pages = COALESCE($7, pages),
                total_copies = COALESCE($8, total_copies),
                available_copies = available_copies + (COALESCE($8, total_copies) - total_copies),
                updated_at = $9
            WHERE id = $1
              AND available_copies + (COALESCE($8, total_copies) - total_copies) >= 0
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.title.as_deref().map(str::trim))
        .bind(changes.author.as_deref().map(str::trim))
        .bind(&changes.publisher)
        .bind(&changes.genre)
        .bind(changes.isbn.as_deref().map(normalize_isbn))
        .bind(changes.pages)
        .bind(changes.total_copies)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(book) => Ok(book),
            None if self.exists(id).await? => Err(AppError::Invariant(format!(
                "Book {} has more copies on loan than the requested total",
                id
            ))),
            None => Err(Self::not_found(id)),
        }
    }

    async fn delete(&self, id: i32) -> AppResult<Book> {
        let deleted = sqlx::query_as::<_, Book>(
            r#"
            DELETE FROM books b
            WHERE b.id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM loans l
                  WHERE l.book_id = b.id AND l.status IN ('pending', 'approved')
              )
            RETURNING b.*
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match deleted {
            Some(book) => Ok(book),
            None if self.exists(id).await? => Err(AppError::Referential(format!(
                "Book {} is referenced by open loans",
                id
            ))),
            None => Err(Self::not_found(id)),
        }
    }

    async fn adjust_available_copies(&self, id: i32, delta: i32) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        // Approvals, returns and loan deletes all write this row, so holding
        // its lock keeps the approved count below stable until commit.
        let locked: Option<i32> =
            sqlx::query_scalar("SELECT id FROM books WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(Self::not_found(id));
        }

        let book = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books b
            SET available_copies = b.available_copies + $2, updated_at = $3
            WHERE b.id = $1
              AND b.available_copies::bigint + $2 BETWEEN 0 AND b.total_copies - (
                  SELECT COUNT(*) FROM loans l
                  WHERE l.book_id = b.id AND l.status = 'approved'
              )
            RETURNING b.*
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(book) = book else {
            tx.rollback().await?;
            return Err(AppError::Invariant(format!(
                "Adjusting book {} by {} would leave its available copies out of range",
                id, delta
            )));
        };

        tx.commit().await?;
        Ok(book)
    }

    async fn list(&self, request: &PageRequest) -> AppResult<Page<Book>> {
        let sort = BookSortKey::parse(request.sort.as_deref())?;
        let pattern = request.search_term().map(|t| like_pattern(&t));

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM books WHERE {}", SEARCH_FILTER))
                .bind(&pattern)
                .fetch_one(&self.pool)
                .await?;

        let query = format!(
            "SELECT * FROM books WHERE {} ORDER BY {} {}, id ASC LIMIT $2 OFFSET $3",
            SEARCH_FILTER,
            sort.column(),
            request.order().as_sql()
        );

        let books = sqlx::query_as::<_, Book>(&query)
            .bind(&pattern)
            .bind(request.limit())
            .bind(request.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(books, total, request))
    }

    async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
