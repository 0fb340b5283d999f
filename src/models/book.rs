//! Book model: catalog record with copy counters

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::error::{AppError, AppResult};

/// Book record. `0 <= available_copies <= total_copies` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub publisher: Option<String>,
    pub genre: Option<String>,
    pub isbn: Option<String>,
    pub pages: Option<i32>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Book {
    /// Whether `available_copies + delta` stays within `0..=total_copies`
    pub fn can_adjust(&self, delta: i32) -> bool {
        self.can_adjust_up_to(delta, self.total_copies)
    }

    /// Whether `available_copies + delta` stays within `0..=ceiling`
    pub fn can_adjust_up_to(&self, delta: i32, ceiling: i32) -> bool {
        self.available_copies
            .checked_add(delta)
            .is_some_and(|next| (0..=ceiling.min(self.total_copies)).contains(&next))
    }
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(custom(function = "not_blank", message = "Title is required"))]
    pub title: String,
    #[validate(custom(function = "not_blank", message = "Author is required"))]
    pub author: String,
    pub publisher: Option<String>,
    pub genre: Option<String>,
    #[validate(custom(function = "validate_isbn"))]
    pub isbn: Option<String>,
    #[validate(range(min = 1, message = "Page count must be positive"))]
    pub pages: Option<i32>,
    #[validate(range(min = 0, message = "Total copies cannot be negative"))]
    pub total_copies: i32,
}

/// Update book request. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(custom(function = "not_blank", message = "Title cannot be blank"))]
    pub title: Option<String>,
    #[validate(custom(function = "not_blank", message = "Author cannot be blank"))]
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub genre: Option<String>,
    #[validate(custom(function = "validate_isbn"))]
    pub isbn: Option<String>,
    #[validate(range(min = 1, message = "Page count must be positive"))]
    pub pages: Option<i32>,
    /// Changing the total shifts `available_copies` by the same amount
    #[validate(range(min = 0, message = "Total copies cannot be negative"))]
    pub total_copies: Option<i32>,
}

/// Manual copy-counter adjustment
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AdjustCopies {
    pub delta: i32,
}

static ISBN_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{9}[0-9Xx]|[0-9]{13})$").expect("static ISBN regex"));

/// Strip hyphens and spaces from an ISBN
pub fn normalize_isbn(isbn: &str) -> String {
    isbn.chars().filter(|c| !matches!(c, '-' | ' ')).collect()
}

pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Accepts ISBN-10 (final check char may be `X`) or ISBN-13, checksums included
pub(crate) fn validate_isbn(isbn: &str) -> Result<(), ValidationError> {
    let digits = normalize_isbn(isbn);
    if !ISBN_CHARS.is_match(&digits) {
        return Err(ValidationError::new("isbn_format"));
    }

    let valid = if digits.len() == 10 {
        let sum: u32 = digits
            .chars()
            .enumerate()
            .map(|(i, c)| {
                let value = if c == 'X' || c == 'x' { 10 } else { c.to_digit(10).unwrap_or(0) };
                value * (10 - i as u32)
            })
            .sum();
        sum % 11 == 0
    } else {
        let sum: u32 = digits
            .chars()
            .filter_map(|c| c.to_digit(10))
            .enumerate()
            .map(|(i, d)| if i % 2 == 0 { d } else { d * 3 })
            .sum();
        sum % 10 == 0
    };

    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("isbn_checksum"))
    }
}

/// Sortable book columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSortKey {
    Id,
    Title,
    Author,
    Publisher,
    Genre,
    Isbn,
    Pages,
    TotalCopies,
    AvailableCopies,
    CreatedAt,
}

impl BookSortKey {
    /// Parse a sort key; defaults to title
    pub fn parse(key: Option<&str>) -> AppResult<Self> {
        let Some(key) = key else {
            return Ok(BookSortKey::Title);
        };
        match key.to_lowercase().as_str() {
            "id" => Ok(BookSortKey::Id),
            "title" => Ok(BookSortKey::Title),
            "author" => Ok(BookSortKey::Author),
            "publisher" => Ok(BookSortKey::Publisher),
            "genre" => Ok(BookSortKey::Genre),
            "isbn" => Ok(BookSortKey::Isbn),
            "pages" => Ok(BookSortKey::Pages),
            "total_copies" => Ok(BookSortKey::TotalCopies),
            "available_copies" => Ok(BookSortKey::AvailableCopies),
            "created_at" => Ok(BookSortKey::CreatedAt),
            other => Err(AppError::Validation(format!("Cannot sort books by '{}'", other))),
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            BookSortKey::Id => "id",
            BookSortKey::Title => "LOWER(title)",
            BookSortKey::Author => "LOWER(author)",
            BookSortKey::Publisher => "LOWER(publisher)",
            BookSortKey::Genre => "LOWER(genre)",
            BookSortKey::Isbn => "isbn",
            BookSortKey::Pages => "pages",
            BookSortKey::TotalCopies => "total_copies",
            BookSortKey::AvailableCopies => "available_copies",
            BookSortKey::CreatedAt => "created_at",
        }
    }

    pub fn compare(&self, a: &Book, b: &Book) -> Ordering {
        let lower = |s: &Option<String>| s.as_deref().map(str::to_lowercase);
        match self {
            BookSortKey::Id => a.id.cmp(&b.id),
            BookSortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            BookSortKey::Author => a.author.to_lowercase().cmp(&b.author.to_lowercase()),
            BookSortKey::Publisher => lower(&a.publisher).cmp(&lower(&b.publisher)),
            BookSortKey::Genre => lower(&a.genre).cmp(&lower(&b.genre)),
            BookSortKey::Isbn => a.isbn.cmp(&b.isbn),
            BookSortKey::Pages => a.pages.cmp(&b.pages),
            BookSortKey::TotalCopies => a.total_copies.cmp(&b.total_copies),
            BookSortKey::AvailableCopies => a.available_copies.cmp(&b.available_copies),
            BookSortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(total: i32, available: i32) -> Book {
        Book {
            id: 1,
            title: "Dune".into(),
            author: "Frank Herbert".into(),
            publisher: None,
            genre: Some("Science Fiction".into()),
            isbn: None,
            pages: Some(412),
            total_copies: total,
            available_copies: available,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn adjust_guard_respects_bounds() {
        let book = sample(3, 1);
        assert!(book.can_adjust(-1));
        assert!(!book.can_adjust(-2));
        assert!(book.can_adjust(2));
        assert!(!book.can_adjust(3));
    }

    #[test]
    fn adjust_guard_survives_extreme_deltas() {
        let book = sample(3, 1);
        assert!(!book.can_adjust(i32::MAX));
        assert!(!book.can_adjust(i32::MIN));
    }

    #[test]
    fn restock_ceiling_leaves_room_for_held_copies() {
        let book = sample(3, 1);
        assert!(book.can_adjust_up_to(1, 2));
        assert!(!book.can_adjust_up_to(2, 2));
        // never above the total
        assert!(!book.can_adjust_up_to(3, 10));
    }

    #[test]
    fn isbn_checksums() {
        assert!(validate_isbn("0-306-40615-2").is_ok());
        assert!(validate_isbn("978-0-306-40615-7").is_ok());
        assert!(validate_isbn("080442957X").is_ok());
        assert!(validate_isbn("978-0-306-40615-8").is_err());
        assert!(validate_isbn("12345").is_err());
    }

    #[test]
    fn create_book_requires_title_and_author() {
        let book = CreateBook {
            title: "  ".into(),
            author: String::new(),
            publisher: None,
            genre: None,
            isbn: None,
            pages: None,
            total_copies: 2,
        };
        let errors = book.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("author"));
    }

    #[test]
    fn unknown_sort_key_is_rejected() {
        assert_eq!(BookSortKey::parse(None).unwrap(), BookSortKey::Title);
        assert_eq!(
            BookSortKey::parse(Some("AVAILABLE_COPIES")).unwrap(),
            BookSortKey::AvailableCopies
        );
        assert!(BookSortKey::parse(Some("title; DROP TABLE books")).is_err());
    }
}
