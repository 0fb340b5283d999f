//! In-process store used by the `memory` backend and by tests.
//!
//! All tables live behind a single mutex, so every trait method is one atomic
//! unit of work, including the loan transition and its copy adjustment.

use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use super::{BookStore, LoanStore, MemberStore, StatusChange};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{normalize_isbn, Book, BookSortKey, CreateBook, UpdateBook},
        loan::{Loan, LoanDetails, LoanStatus},
        member::{Member, MemberChanges, MemberSortKey, NewMember, TopUp},
        page::{Page, PageRequest, SortOrder},
    },
};

#[derive(Default)]
struct Tables {
    books: BTreeMap<i32, Book>,
    members: BTreeMap<i32, Member>,
    loans: BTreeMap<i32, Loan>,
    top_ups: BTreeMap<String, TopUp>,
    last_book_id: i32,
    last_member_id: i32,
    last_loan_id: i32,
}

impl Tables {
    fn book_mut(&mut self, id: i32) -> AppResult<&mut Book> {
        self.books
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    fn member_mut(&mut self, id: i32) -> AppResult<&mut Member> {
        self.members
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", id)))
    }

    fn member_by_email(&self, email: &str) -> Option<&Member> {
        self.members.values().find(|m| m.email.eq_ignore_ascii_case(email))
    }

    fn has_open_loans(&self, matches: impl Fn(&Loan) -> bool) -> bool {
        self.loans.values().any(|l| l.status.is_open() && matches(l))
    }

    fn approved_count(&self, book_id: i32) -> i32 {
        self.loans
            .values()
            .filter(|l| l.book_id == book_id && l.status == LoanStatus::Approved)
            .count() as i32
    }

    fn details(&self, loan: &Loan) -> Option<LoanDetails> {
        let book = self.books.get(&loan.book_id)?;
        let member = self.members.get(&loan.member_id)?;
        Some(LoanDetails {
            id: loan.id,
            member_id: loan.member_id,
            book_id: loan.book_id,
            issued_date: loan.issued_date,
            status: loan.status,
            book_title: book.title.clone(),
            username: member.username.clone(),
            email: member.email.clone(),
        })
    }
}

/// Cheap to clone; clones share the same tables
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn contains(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle))
}

fn ordered(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

fn paginate<T>(items: Vec<T>, request: &PageRequest) -> Page<T> {
    let total = items.len() as i64;
    let page = items
        .into_iter()
        .skip(request.offset() as usize)
        .take(request.limit() as usize)
        .collect();
    Page::new(page, total, request)
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let mut tables = self.tables.lock();
        tables.last_book_id += 1;
        let created = Book {
            id: tables.last_book_id,
            title: book.title.trim().to_string(),
            author: book.author.trim().to_string(),
            publisher: book.publisher.clone(),
            genre: book.genre.clone(),
            isbn: book.isbn.as_deref().map(normalize_isbn),
            pages: book.pages,
            total_copies: book.total_copies,
            available_copies: book.total_copies,
            created_at: Utc::now(),
            updated_at: None,
        };
        tables.books.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        let mut tables = self.tables.lock();
        tables.book_mut(id).map(|b| b.clone())
    }

    async fn update(&self, id: i32, changes: &UpdateBook) -> AppResult<Book> {
        let mut tables = self.tables.lock();
        let book = tables.book_mut(id)?;

        let total = changes.total_copies.unwrap_or(book.total_copies);
        let available = book.available_copies + (total - book.total_copies);
        if available < 0 {
            return Err(AppError::Invariant(format!(
                "Book {} has more copies on loan than the requested total",
                id
            )));
        }

        if let Some(title) = &changes.title {
            book.title = title.trim().to_string();
        }
        if let Some(author) = &changes.author {
            book.author = author.trim().to_string();
        }
        if changes.publisher.is_some() {
            book.publisher = changes.publisher.clone();
        }
        if changes.genre.is_some() {
            book.genre = changes.genre.clone();
        }
        if let Some(isbn) = &changes.isbn {
            book.isbn = Some(normalize_isbn(isbn));
        }
        if changes.pages.is_some() {
            book.pages = changes.pages;
        }
        book.total_copies = total;
        book.available_copies = available;
        book.updated_at = Some(Utc::now());

        Ok(book.clone())
    }

    async fn delete(&self, id: i32) -> AppResult<Book> {
        let mut tables = self.tables.lock();
        tables.book_mut(id)?;
        if tables.has_open_loans(|l| l.book_id == id) {
            return Err(AppError::Referential(format!(
                "Book {} is referenced by open loans",
                id
            )));
        }
        tables.loans.retain(|_, l| l.book_id != id);
        tables
            .books
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn adjust_available_copies(&self, id: i32, delta: i32) -> AppResult<Book> {
        let mut tables = self.tables.lock();
        let held = tables.approved_count(id);
        let book = tables.book_mut(id)?;
        if !book.can_adjust_up_to(delta, book.total_copies - held) {
            return Err(AppError::Invariant(format!(
                "Adjusting book {} by {} would leave its available copies out of range",
                id, delta
            )));
        }
        book.available_copies += delta;
        book.updated_at = Some(Utc::now());
        Ok(book.clone())
    }

    async fn list(&self, request: &PageRequest) -> AppResult<Page<Book>> {
        let sort = BookSortKey::parse(request.sort.as_deref())?;
        let term = request.search_term();

        let mut books: Vec<Book> = {
            let tables = self.tables.lock();
            tables
                .books
                .values()
                .filter(|b| match &term {
                    None => true,
                    Some(t) => {
                        contains(Some(b.title.as_str()), t)
                            || contains(Some(b.author.as_str()), t)
                            || contains(b.genre.as_deref(), t)
                            || contains(b.isbn.as_deref(), t)
                    }
                })
                .cloned()
                .collect()
        };

        books.sort_by(|a, b| ordered(sort.compare(a, b), request.order()).then(a.id.cmp(&b.id)));
        Ok(paginate(books, request))
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.tables.lock().books.len() as i64)
    }
}

#[async_trait]
impl MemberStore for MemoryStore {
    async fn create(&self, member: &NewMember) -> AppResult<Member> {
        let mut tables = self.tables.lock();
        if tables.member_by_email(&member.email).is_some() {
            return Err(AppError::Conflict(format!(
                "Email {} is already registered",
                member.email
            )));
        }
        tables.last_member_id += 1;
        let created = Member {
            id: tables.last_member_id,
            username: member.username.clone(),
            email: member.email.clone(),
            password_hash: member.password_hash.clone(),
            role: member.role,
            wallet_balance: Decimal::ZERO,
            image_url: member.image_url.clone(),
            created_at: Utc::now(),
        };
        tables.members.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Member> {
        let mut tables = self.tables.lock();
        tables.member_mut(id).map(|m| m.clone())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<Member>> {
        Ok(self.tables.lock().member_by_email(email).cloned())
    }

    async fn update(&self, id: i32, changes: &MemberChanges) -> AppResult<Member> {
        let mut tables = self.tables.lock();
        if let Some(email) = &changes.email {
            if tables.member_by_email(email).is_some_and(|m| m.id != id) {
                return Err(AppError::Conflict("Email is already registered".to_string()));
            }
        }

        let member = tables.member_mut(id)?;
        if let Some(username) = &changes.username {
            member.username = username.clone();
        }
        if let Some(email) = &changes.email {
            member.email = email.clone();
        }
        if changes.password_hash.is_some() {
            member.password_hash = changes.password_hash.clone();
        }
        if let Some(role) = changes.role {
            member.role = role;
        }
        if changes.image_url.is_some() {
            member.image_url = changes.image_url.clone();
        }
        Ok(member.clone())
    }

    async fn delete(&self, id: i32) -> AppResult<Member> {
        let mut tables = self.tables.lock();
        tables.member_mut(id)?;
        if tables.has_open_loans(|l| l.member_id == id) {
            return Err(AppError::Referential(format!("Member {} has open loans", id)));
        }
        tables.loans.retain(|_, l| l.member_id != id);
        tables
            .members
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", id)))
    }

    async fn list(&self, request: &PageRequest) -> AppResult<Page<Member>> {
        let sort = MemberSortKey::parse(request.sort.as_deref())?;
        let term = request.search_term();

        let mut members: Vec<Member> = {
            let tables = self.tables.lock();
            tables
                .members
                .values()
                .filter(|m| match &term {
                    None => true,
                    Some(t) => {
                        contains(Some(m.username.as_str()), t)
                            || contains(Some(m.email.as_str()), t)
                            || contains(Some(m.role.as_str()), t)
                    }
                })
                .cloned()
                .collect()
        };

        members.sort_by(|a, b| ordered(sort.compare(a, b), request.order()).then(a.id.cmp(&b.id)));
        Ok(paginate(members, request))
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.tables.lock().members.len() as i64)
    }

    async fn credit_wallet(&self, top_up: &TopUp) -> AppResult<Decimal> {
        if top_up.amount <= Decimal::ZERO {
            return Err(AppError::Validation("Top-up amount must be positive".to_string()));
        }

        let mut tables = self.tables.lock();
        tables.member_mut(top_up.member_id)?;
        if tables.top_ups.contains_key(&top_up.payment_id) {
            return Err(AppError::Conflict(format!(
                "Payment {} has already been credited",
                top_up.payment_id
            )));
        }
        tables.top_ups.insert(top_up.payment_id.clone(), top_up.clone());

        let member = tables.member_mut(top_up.member_id)?;
        member.wallet_balance += top_up.amount;
        Ok(member.wallet_balance)
    }
}

#[async_trait]
impl LoanStore for MemoryStore {
    async fn create(
        &self,
        member_id: i32,
        book_id: i32,
        issued_date: DateTime<Utc>,
    ) -> AppResult<Loan> {
        let mut tables = self.tables.lock();
        tables.member_mut(member_id)?;
        tables.book_mut(book_id)?;

        tables.last_loan_id += 1;
        let loan = Loan {
            id: tables.last_loan_id,
            member_id,
            book_id,
            issued_date,
            status: LoanStatus::Pending,
            updated_at: None,
        };
        tables.loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Loan> {
        self.tables
            .lock()
            .loans
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    async fn find_open(&self, member_id: i32, book_id: i32) -> AppResult<Option<Loan>> {
        let tables = self.tables.lock();
        Ok(tables
            .loans
            .values()
            .filter(|l| l.member_id == member_id && l.book_id == book_id && l.status.is_open())
            .max_by_key(|l| l.issued_date)
            .cloned())
    }

    async fn transition(
        &self,
        id: i32,
        from: LoanStatus,
        to: LoanStatus,
        copies_delta: i32,
        at: DateTime<Utc>,
    ) -> AppResult<StatusChange> {
        let mut tables = self.tables.lock();
        let loan = tables
            .loans
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))?;

        if loan.status != from {
            return Ok(StatusChange::Stale(loan.status));
        }

        if copies_delta != 0 {
            let book = tables.book_mut(loan.book_id)?;
            if !book.can_adjust(copies_delta) {
                return Err(AppError::Invariant(format!(
                    "Book {} cannot move its available copies by {}",
                    loan.book_id, copies_delta
                )));
            }
            book.available_copies += copies_delta;
            book.updated_at = Some(at);
        }

        let stored = tables
            .loans
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))?;
        stored.status = to;
        stored.updated_at = Some(at);
        Ok(StatusChange::Applied(stored.clone()))
    }

    async fn list_by_member(&self, member_id: i32) -> AppResult<Vec<LoanDetails>> {
        let tables = self.tables.lock();
        let mut loans: Vec<LoanDetails> = tables
            .loans
            .values()
            .filter(|l| l.member_id == member_id)
            .filter_map(|l| tables.details(l))
            .collect();
        loans.sort_by(|a, b| b.issued_date.cmp(&a.issued_date).then(b.id.cmp(&a.id)));
        Ok(loans)
    }

    async fn list_pending(&self, request: &PageRequest) -> AppResult<Page<LoanDetails>> {
        let term = request.search_term();
        let mut loans: Vec<LoanDetails> = {
            let tables = self.tables.lock();
            tables
                .loans
                .values()
                .filter(|l| l.status == LoanStatus::Pending)
                .filter_map(|l| tables.details(l))
                .filter(|d| match &term {
                    None => true,
                    Some(t) => {
                        contains(Some(d.book_title.as_str()), t)
                            || contains(Some(d.username.as_str()), t)
                            || contains(Some(d.email.as_str()), t)
                    }
                })
                .collect()
        };

        loans.sort_by(|a, b| {
            ordered(a.issued_date.cmp(&b.issued_date), request.order()).then(a.id.cmp(&b.id))
        });
        Ok(paginate(loans, request))
    }

    async fn list_approved(
        &self,
        issued_from: Option<DateTime<Utc>>,
        issued_until: DateTime<Utc>,
    ) -> AppResult<Vec<LoanDetails>> {
        let tables = self.tables.lock();
        let mut loans: Vec<LoanDetails> = tables
            .loans
            .values()
            .filter(|l| l.status == LoanStatus::Approved)
            .filter(|l| issued_from.map_or(true, |from| l.issued_date >= from))
            .filter(|l| l.issued_date < issued_until)
            .filter_map(|l| tables.details(l))
            .collect();
        loans.sort_by(|a, b| a.issued_date.cmp(&b.issued_date).then(a.id.cmp(&b.id)));
        Ok(loans)
    }

    async fn delete(&self, id: i32) -> AppResult<Loan> {
        let mut tables = self.tables.lock();
        let loan = tables
            .loans
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))?;

        if loan.status == LoanStatus::Approved {
            if let Some(book) = tables.books.get_mut(&loan.book_id) {
                if !book.can_adjust(1) {
                    return Err(AppError::Invariant(format!(
                        "Book {} cannot take back the copy held by loan {}",
                        loan.book_id, id
                    )));
                }
                book.available_copies += 1;
            }
        }

        tables.loans.remove(&id);
        Ok(loan)
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.tables.lock().loans.len() as i64)
    }

    async fn count_by_status(&self, status: LoanStatus) -> AppResult<i64> {
        let tables = self.tables.lock();
        Ok(tables.loans.values().filter(|l| l.status == status).count() as i64)
    }
}
