//! Lending engine scenarios against the in-memory store

use std::sync::Arc;

use bibliotheca_server::{
    config::LendingConfig,
    models::{
        book::CreateBook,
        loan::LoanStatus,
        member::{NewMember, Role},
    },
    repository::Repository,
    services::{
        clock::{Clock, FixedClock},
        ledger::LedgerService,
        lending::LendingService,
    },
    AppError,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal_macros::dec;

struct Library {
    repository: Repository,
    ledger: LedgerService,
    lending: LendingService,
    clock: FixedClock,
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

impl Library {
    fn open(now: DateTime<Utc>) -> Self {
        let repository = Repository::in_memory();
        let clock = FixedClock::new(now);
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let ledger = LedgerService::new(repository.clone(), LendingConfig::default(), shared.clone());
        let lending = LendingService::new(repository.clone(), ledger.clone(), shared);
        Self {
            repository,
            ledger,
            lending,
            clock,
        }
    }

    async fn book(&self, title: &str, copies: i32) -> i32 {
        self.repository
            .books
            .create(&CreateBook {
                title: title.into(),
                author: "Anonymous".into(),
                publisher: None,
                genre: None,
                isbn: None,
                pages: None,
                total_copies: copies,
            })
            .await
            .unwrap()
            .id
    }

    async fn member(&self, name: &str) -> i32 {
        self.repository
            .members
            .create(&NewMember {
                username: name.into(),
                email: format!("{}@example.org", name),
                password_hash: None,
                role: Role::User,
                image_url: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn available(&self, book: i32) -> i32 {
        self.repository.books.get_by_id(book).await.unwrap().available_copies
    }

    async fn status(&self, loan: i32) -> LoanStatus {
        self.repository.loans.get_by_id(loan).await.unwrap().status
    }
}

#[tokio::test]
async fn approve_then_return_restores_the_counter() {
    let library = Library::open(Utc::now());
    let book = library.book("Dune", 3).await;
    let member = library.member("paul").await;

    let loan = library.lending.request_loan(member, book).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Pending);
    assert_eq!(library.available(book).await, 3);

    let approved = library.lending.approve(loan.id).await.unwrap();
    assert_eq!(approved.status, LoanStatus::Approved);
    assert_eq!(library.available(book).await, 2);

    let returned = library.lending.return_book(loan.id).await.unwrap();
    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(library.available(book).await, 3);
}

#[tokio::test]
async fn approving_without_copies_fails_and_changes_nothing() {
    let library = Library::open(Utc::now());
    let book = library.book("Solaris", 1).await;
    library.repository.books.adjust_available_copies(book, -1).await.unwrap();
    let member = library.member("kris").await;

    let loan = library.lending.request_loan(member, book).await.unwrap();
    let err = library.lending.approve(loan.id).await.unwrap_err();

    assert!(matches!(err, AppError::Unavailable(_)));
    assert_eq!(library.available(book).await, 0);
    assert_eq!(library.status(loan.id).await, LoanStatus::Pending);
}

#[tokio::test]
async fn repeated_decisions_are_no_ops() {
    let library = Library::open(Utc::now());
    let book = library.book("Neuromancer", 2).await;
    let case = library.member("case").await;
    let molly = library.member("molly").await;

    let loan = library.lending.request_loan(case, book).await.unwrap();
    library.lending.approve(loan.id).await.unwrap();
    library.lending.approve(loan.id).await.unwrap();
    assert_eq!(library.available(book).await, 1);

    library.lending.return_book(loan.id).await.unwrap();
    library.lending.return_book(loan.id).await.unwrap();
    assert_eq!(library.available(book).await, 2);

    let other = library.lending.request_loan(molly, book).await.unwrap();
    library.lending.reject(other.id).await.unwrap();
    let again = library.lending.reject(other.id).await.unwrap();
    assert_eq!(again.status, LoanStatus::Rejected);
    assert_eq!(library.available(book).await, 2);
}

#[tokio::test]
async fn lifecycle_only_moves_forward() {
    let library = Library::open(Utc::now());
    let book = library.book("Ubik", 1).await;
    let member = library.member("joe").await;
    let loan = library.lending.request_loan(member, book).await.unwrap();

    assert!(matches!(
        library.lending.return_book(loan.id).await,
        Err(AppError::Conflict(_))
    ));
    library.lending.approve(loan.id).await.unwrap();
    assert!(matches!(
        library.lending.reject(loan.id).await,
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        library.ledger.update_status(loan.id, LoanStatus::Pending).await,
        Err(AppError::Conflict(_))
    ));
    assert_eq!(library.available(book).await, 0);
}

#[tokio::test]
async fn due_today_and_overdue_follow_the_loan_period() {
    let library = Library::open(at(2024, 1, 1, 0, 0));
    let member = library.member("reader").await;

    let mut approved_at = Vec::new();
    for (title, issued) in [
        ("overdue five days", at(2024, 1, 1, 0, 0)),
        ("overdue one day", at(2024, 1, 4, 23, 59)),
        ("due today", at(2024, 1, 5, 9, 0)),
        ("not yet due", at(2024, 1, 10, 12, 0)),
    ] {
        library.clock.set(issued);
        let book = library.book(title, 1).await;
        let loan = library.lending.request_loan(member, book).await.unwrap();
        library.lending.approve(loan.id).await.unwrap();
        approved_at.push(loan.id);
    }

    // pending and returned loans never show up
    library.clock.set(at(2024, 1, 1, 0, 0));
    let pending_book = library.book("still pending", 1).await;
    library.lending.request_loan(member, pending_book).await.unwrap();
    let returned_book = library.book("returned", 1).await;
    let returned = library.lending.request_loan(member, returned_book).await.unwrap();
    library.lending.approve(returned.id).await.unwrap();
    library.lending.return_book(returned.id).await.unwrap();

    library.clock.set(at(2024, 1, 20, 10, 0));

    let due: Vec<i32> = library
        .ledger
        .list_due_today()
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.id)
        .collect();
    assert_eq!(due, vec![approved_at[2]]);

    let overdue = library.ledger.list_overdue().await.unwrap();
    assert_eq!(overdue.len(), 2);

    assert_eq!(overdue[0].loan.id, approved_at[0]);
    assert_eq!(overdue[0].days_overdue, 5);
    assert_eq!(overdue[0].fine, dec!(50));
    assert_eq!(overdue[0].due_date, at(2024, 1, 16, 0, 0).date_naive());

    assert_eq!(overdue[1].loan.id, approved_at[1]);
    assert_eq!(overdue[1].days_overdue, 1);
    assert_eq!(overdue[1].fine, dec!(10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_never_oversell() {
    let library = Library::open(Utc::now());
    let book = library.book("The Last Copy", 1).await;

    let mut loans = Vec::new();
    for name in ["first", "second"] {
        let member = library.member(name).await;
        loans.push(library.lending.request_loan(member, book).await.unwrap().id);
    }

    let a = tokio::spawn({
        let lending = library.lending.clone();
        let id = loans[0];
        async move { lending.approve(id).await }
    });
    let b = tokio::spawn({
        let lending = library.lending.clone();
        let id = loans[1];
        async move { lending.approve(id).await }
    });
    let results = [a.await.unwrap(), b.await.unwrap()];

    let approved = results.iter().filter(|r| r.is_ok()).count();
    let unavailable = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::Unavailable(_))))
        .count();
    assert_eq!((approved, unavailable), (1, 1));
    assert_eq!(library.available(book).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_approvals_match_the_copy_count() {
    let library = Library::open(Utc::now());
    let book = library.book("Popular", 3).await;

    let mut loans = Vec::new();
    for i in 0..12 {
        let member = library.member(&format!("member{}", i)).await;
        loans.push(library.lending.request_loan(member, book).await.unwrap().id);
    }

    let handles: Vec<_> = loans
        .into_iter()
        .map(|id| {
            let lending = library.lending.clone();
            tokio::spawn(async move { lending.approve(id).await })
        })
        .collect();

    let mut approved = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => approved += 1,
            Err(AppError::Unavailable(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(approved, 3);
    assert_eq!(library.available(book).await, 0);
    assert_eq!(
        library
            .repository
            .loans
            .count_by_status(LoanStatus::Approved)
            .await
            .unwrap(),
        3
    );
}

#[tokio::test]
async fn open_loans_block_deletes_and_closed_ones_go_with_the_book() {
    let library = Library::open(Utc::now());
    let book = library.book("Foundation", 1).await;
    let member = library.member("hari").await;
    let loan = library.lending.request_loan(member, book).await.unwrap();
    library.lending.approve(loan.id).await.unwrap();

    assert!(matches!(
        library.repository.books.delete(book).await,
        Err(AppError::Referential(_))
    ));
    assert!(matches!(
        library.repository.members.delete(member).await,
        Err(AppError::Referential(_))
    ));

    library.lending.return_book(loan.id).await.unwrap();
    library.repository.books.delete(book).await.unwrap();

    assert!(matches!(
        library.repository.loans.get_by_id(loan.id).await,
        Err(AppError::NotFound(_))
    ));
    library.repository.members.delete(member).await.unwrap();
}

#[tokio::test]
async fn deleting_an_approved_loan_releases_its_copy() {
    let library = Library::open(Utc::now());
    let book = library.book("Hyperion", 2).await;
    let member = library.member("sol").await;
    let loan = library.lending.request_loan(member, book).await.unwrap();
    library.lending.approve(loan.id).await.unwrap();
    assert_eq!(library.available(book).await, 1);

    let deleted = library.ledger.delete_loan(loan.id).await.unwrap();
    assert_eq!(deleted.status, LoanStatus::Approved);
    assert_eq!(library.available(book).await, 2);
}

#[tokio::test]
async fn restocking_leaves_room_for_copies_on_loan() {
    let library = Library::open(Utc::now());
    let book = library.book("Gormenghast", 2).await;
    let member = library.member("titus").await;
    let loan = library.lending.request_loan(member, book).await.unwrap();
    library.lending.approve(loan.id).await.unwrap();

    assert!(matches!(
        library.repository.books.adjust_available_copies(book, 1).await,
        Err(AppError::Invariant(_))
    ));
    assert_eq!(library.available(book).await, 1);

    // a copy written off can be restocked, but only up to the free slots
    library.repository.books.adjust_available_copies(book, -1).await.unwrap();
    library.repository.books.adjust_available_copies(book, 1).await.unwrap();

    let returned = library.lending.return_book(loan.id).await.unwrap();
    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(library.available(book).await, 2);
}

#[tokio::test]
async fn loans_are_dated_by_the_clock() {
    let library = Library::open(at(2024, 3, 1, 8, 30));
    let book = library.book("Clockwork", 1).await;
    let member = library.member("alex").await;

    library.clock.advance(Duration::hours(2));
    let loan = library.lending.request_loan(member, book).await.unwrap();
    assert_eq!(loan.issued_date, at(2024, 3, 1, 10, 30));
}
