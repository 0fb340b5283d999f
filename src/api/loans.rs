//! Loan endpoints: requests, decisions and ledger queries

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        loan::{CreateLoanRequest, Loan, LoanDetails, OverdueLoan, UpdateLoanStatus},
        page::{LoanPage, Page, PageRequest},
    },
    AppState,
};

use super::AuthenticatedUser;

/// Request to borrow a book
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CreateLoanRequest,
    responses(
        (status = 201, description = "Pending loan created", body = Loan),
        (status = 404, description = "Member or book not found"),
        (status = 409, description = "An open loan for this book already exists")
    )
)]
pub async fn request_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateLoanRequest>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let member_id = request.member_id.unwrap_or(claims.member_id);
    claims.require_self_or_admin(member_id)?;

    let loan = state
        .services
        .lending
        .request_loan(member_id, request.book_id)
        .await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Get a loan; members may only read their own
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Loan", body = Loan),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Loan>> {
    let loan = state.services.ledger.get_loan(id).await?;
    claims.require_self_or_admin(loan.member_id)?;
    Ok(Json(loan))
}

/// Pending requests, oldest first
#[utoipa::path(
    get,
    path = "/loans/pending",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(PageRequest),
    responses(
        (status = 200, description = "Page of pending loans", body = LoanPage),
        (status = 403, description = "Administrator role required")
    )
)]
pub async fn list_pending(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(request): Query<PageRequest>,
) -> AppResult<Json<Page<LoanDetails>>> {
    claims.require_admin()?;

    let page = state.services.ledger.list_pending(&request).await?;
    Ok(Json(page))
}

/// Approved loans whose last day is today
#[utoipa::path(
    get,
    path = "/loans/due-today",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Loans due today", body = Vec<LoanDetails>),
        (status = 403, description = "Administrator role required")
    )
)]
pub async fn list_due_today(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_admin()?;

    let loans = state.services.ledger.list_due_today().await?;
    Ok(Json(loans))
}

/// Overdue loans with their fines
#[utoipa::path(
    get,
    path = "/loans/overdue",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Overdue loans", body = Vec<OverdueLoan>),
        (status = 403, description = "Administrator role required")
    )
)]
pub async fn list_overdue(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<OverdueLoan>>> {
    claims.require_admin()?;

    let loans = state.services.ledger.list_overdue().await?;
    Ok(Json(loans))
}

/// Move a loan to any status the lifecycle allows
#[utoipa::path(
    patch,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Loan ID")),
    request_body = UpdateLoanStatus,
    responses(
        (status = 200, description = "Loan updated", body = Loan),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Move not allowed or no copy available")
    )
)]
pub async fn update_loan_status(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateLoanStatus>,
) -> AppResult<Json<Loan>> {
    claims.require_admin()?;

    let loan = state.services.ledger.update_status(id, request.status).await?;
    Ok(Json(loan))
}

/// Approve a pending loan
#[utoipa::path(
    post,
    path = "/loans/{id}/approve",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Loan approved", body = Loan),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "No copy available or loan already decided")
    )
)]
pub async fn approve_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Loan>> {
    claims.require_admin()?;

    let loan = state.services.lending.approve(id).await?;
    Ok(Json(loan))
}

/// Reject a pending loan
#[utoipa::path(
    post,
    path = "/loans/{id}/reject",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Loan rejected", body = Loan),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan already decided")
    )
)]
pub async fn reject_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Loan>> {
    claims.require_admin()?;

    let loan = state.services.lending.reject(id).await?;
    Ok(Json(loan))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Book returned", body = Loan),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan is not approved")
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Loan>> {
    claims.require_admin()?;

    let loan = state.services.lending.return_book(id).await?;
    Ok(Json(loan))
}

/// Remove a loan record outside its lifecycle
#[utoipa::path(
    delete,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Loan ID")),
    responses(
        (status = 204, description = "Loan deleted"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn delete_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    claims.require_admin()?;

    state.services.ledger.delete_loan(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
