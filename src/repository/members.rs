//! Members repository for database operations

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres};

use super::{unique_violation, MemberStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        member::{Member, MemberChanges, MemberSortKey, NewMember, TopUp},
        page::{like_pattern, Page, PageRequest},
    },
};

const SEARCH_FILTER: &str = r#"
    ($1::text IS NULL
     OR LOWER(username) LIKE $1
     OR LOWER(email) LIKE $1
     OR role LIKE $1)
"#;

#[derive(Clone)]
pub struct MembersRepository {
    pool: Pool<Postgres>,
}

impl MembersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: i32) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM members WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    fn not_found(id: i32) -> AppError {
        AppError::NotFound(format!("Member with id {} not found", id))
    }
}

#[async_trait]
impl MemberStore for MembersRepository {
    async fn create(&self, member: &NewMember) -> AppResult<Member> {
        sqlx::query_as::<_, Member>(
            r#"
            INSERT INTO members (username, email, password_hash, role, image_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&member.username)
        .bind(&member.email)
        .bind(&member.password_hash)
        .bind(member.role)
        .bind(&member.image_url)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, format!("Email {} is already registered", member.email)))
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Member> {
        sqlx::query_as::<_, Member>("SELECT * FROM members WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Self::not_found(id))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<Member>> {
        let member =
            sqlx::query_as::<_, Member>("SELECT * FROM members WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(member)
    }

    async fn update(&self, id: i32, changes: &MemberChanges) -> AppResult<Member> {
        sqlx::query_as::<_, Member>(
            r#"
            UPDATE members SET
                username = COALESCE($2, username),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                role = COALESCE($5, role),
                image_url = COALESCE($6, image_url)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.username)
        .bind(&changes.email)
        .bind(&changes.password_hash)
        .bind(changes.role)
        .bind(&changes.image_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "Email is already registered"))?
        .ok_or_else(|| Self::not_found(id))
    }

    async fn delete(&self, id: i32) -> AppResult<Member> {
        let deleted = sqlx::query_as::<_, Member>(
            r#"
            DELETE FROM members m
            WHERE m.id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM loans l
                  WHERE l.member_id = m.id AND l.status IN ('pending', 'approved')
              )
            RETURNING m.*
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match deleted {
            Some(member) => Ok(member),
            None if self.exists(id).await? => Err(AppError::Referential(format!(
                "Member {} has open loans",
                id
            ))),
            None => Err(Self::not_found(id)),
        }
    }

    async fn list(&self, request: &PageRequest) -> AppResult<Page<Member>> {
        let sort = MemberSortKey::parse(request.sort.as_deref())?;
        let pattern = request.search_term().map(|t| like_pattern(&t));

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM members WHERE {}", SEARCH_FILTER))
                .bind(&pattern)
                .fetch_one(&self.pool)
                .await?;

        let query = format!(
            "SELECT * FROM members WHERE {} ORDER BY {} {}, id ASC LIMIT $2 OFFSET $3",
            SEARCH_FILTER,
            sort.column(),
            request.order().as_sql()
        );

        let members = sqlx::query_as::<_, Member>(&query)
            .bind(&pattern)
            .bind(request.limit())
            .bind(request.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(members, total, request))
    }

    async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn credit_wallet(&self, top_up: &TopUp) -> AppResult<Decimal> {
        if top_up.amount <= Decimal::ZERO {
            return Err(AppError::Validation("Top-up amount must be positive".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO wallet_top_ups (payment_id, member_id, amount, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&top_up.payment_id)
        .bind(top_up.member_id)
        .bind(top_up.amount)
        .bind(top_up.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            unique_violation(e, format!("Payment {} has already been credited", top_up.payment_id))
        })?;

        let balance = sqlx::query_scalar::<_, Decimal>(
            r#"
            UPDATE members SET wallet_balance = wallet_balance + $2
            WHERE id = $1
            RETURNING wallet_balance
            "#,
        )
        .bind(top_up.member_id)
        .bind(top_up.amount)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(balance) = balance else {
            tx.rollback().await?;
            return Err(Self::not_found(top_up.member_id));
        };

        tx.commit().await?;
        Ok(balance)
    }
}
