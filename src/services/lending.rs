//! Lending coordinator: borrow requests and their approval flow

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::loan::{Loan, LoanStatus},
    repository::Repository,
    services::{clock::Clock, ledger::LedgerService},
};

#[derive(Clone)]
pub struct LendingService {
    repository: Repository,
    ledger: LedgerService,
    clock: Arc<dyn Clock>,
}

impl LendingService {
    pub fn new(repository: Repository, ledger: LedgerService, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            ledger,
            clock,
        }
    }

    /// File a pending request. Availability is only checked on approval.
    pub async fn request_loan(&self, member_id: i32, book_id: i32) -> AppResult<Loan> {
        self.repository.members.get_by_id(member_id).await?;
        self.repository.books.get_by_id(book_id).await?;

        if let Some(open) = self.repository.loans.find_open(member_id, book_id).await? {
            return Err(AppError::Conflict(format!(
                "Member {} already has {} loan {} for book {}",
                member_id, open.status, open.id, book_id
            )));
        }

        let loan = self
            .repository
            .loans
            .create(member_id, book_id, self.clock.now())
            .await?;
        tracing::info!(loan_id = loan.id, member_id, book_id, "Loan requested");
        Ok(loan)
    }

    /// `pending -> approved`, taking one copy off the shelf
    pub async fn approve(&self, loan_id: i32) -> AppResult<Loan> {
        self.ledger.update_status(loan_id, LoanStatus::Approved).await
    }

    /// `pending -> rejected`
    pub async fn reject(&self, loan_id: i32) -> AppResult<Loan> {
        self.ledger.update_status(loan_id, LoanStatus::Rejected).await
    }

    /// `approved -> returned`, putting the copy back
    pub async fn return_book(&self, loan_id: i32) -> AppResult<Loan> {
        self.ledger.update_status(loan_id, LoanStatus::Returned).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::LendingConfig,
        models::{book::CreateBook, member::NewMember, member::Role},
        services::clock::SystemClock,
    };

    async fn setup(copies: i32) -> (LendingService, Repository, i32, i32) {
        let repository = Repository::in_memory();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ledger = LedgerService::new(repository.clone(), LendingConfig::default(), clock.clone());
        let lending = LendingService::new(repository.clone(), ledger, clock);

        let book = repository
            .books
            .create(&CreateBook {
                title: "Kindred".into(),
                author: "Octavia E. Butler".into(),
                publisher: None,
                genre: None,
                isbn: None,
                pages: None,
                total_copies: copies,
            })
            .await
            .unwrap();
        let member = repository
            .members
            .create(&NewMember {
                username: "reader".into(),
                email: "reader@example.org".into(),
                password_hash: None,
                role: Role::User,
                image_url: None,
            })
            .await
            .unwrap();

        (lending, repository, member.id, book.id)
    }

    #[tokio::test]
    async fn duplicate_open_request_conflicts() {
        let (lending, _, member, book) = setup(1).await;
        lending.request_loan(member, book).await.unwrap();

        let err = lending.request_loan(member, book).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn request_for_unknown_book_is_not_found() {
        let (lending, _, member, _) = setup(1).await;
        assert!(matches!(
            lending.request_loan(member, 404).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn full_cycle_restores_the_counter() {
        let (lending, repository, member, book) = setup(1).await;
        let loan = lending.request_loan(member, book).await.unwrap();

        lending.approve(loan.id).await.unwrap();
        assert_eq!(repository.books.get_by_id(book).await.unwrap().available_copies, 0);

        let returned = lending.return_book(loan.id).await.unwrap();
        assert_eq!(returned.status, LoanStatus::Returned);
        assert_eq!(repository.books.get_by_id(book).await.unwrap().available_copies, 1);

        // a closed loan no longer blocks a new request
        lending.request_loan(member, book).await.unwrap();
    }

    #[tokio::test]
    async fn rejected_loan_cannot_be_returned() {
        let (lending, _, member, book) = setup(1).await;
        let loan = lending.request_loan(member, book).await.unwrap();
        lending.reject(loan.id).await.unwrap();

        assert!(matches!(
            lending.return_book(loan.id).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            lending.approve(loan.id).await,
            Err(AppError::Conflict(_))
        ));
    }
}
