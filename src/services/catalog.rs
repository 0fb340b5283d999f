//! Catalog management service

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, CreateBook, UpdateBook},
        page::{Page, PageRequest},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list_books(&self, request: &PageRequest) -> AppResult<Page<Book>> {
        self.repository.books.list(request).await
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.repository.books.get_by_id(id).await
    }

    /// Create a book; every copy starts on the shelf
    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()?;
        let created = self.repository.books.create(&book).await?;
        tracing::info!(
            book_id = created.id,
            copies = created.total_copies,
            "Book added to catalog"
        );
        Ok(created)
    }

    pub async fn update_book(&self, id: i32, changes: UpdateBook) -> AppResult<Book> {
        changes.validate()?;
        self.repository.books.update(id, &changes).await
    }

    pub async fn delete_book(&self, id: i32) -> AppResult<Book> {
        let deleted = self.repository.books.delete(id).await?;
        tracing::info!(book_id = id, "Book removed from catalog");
        Ok(deleted)
    }

    /// Manual shelf correction (lost or found copies)
    pub async fn adjust_copies(&self, id: i32, delta: i32) -> AppResult<Book> {
        if delta == 0 {
            return Err(AppError::Validation("Copy adjustment must not be zero".to_string()));
        }
        let book = self.repository.books.adjust_available_copies(id, delta).await?;
        tracing::info!(
            book_id = id,
            delta,
            available = book.available_copies,
            "Available copies adjusted"
        );
        Ok(book)
    }
}
