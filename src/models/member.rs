//! Member model and related types

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Member role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

super::text_column!(Role);

/// Member record. `password_hash` never leaves the server.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow, ToSchema)]
pub struct Member {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: Role,
    #[schema(value_type = String, example = "150.00")]
    pub wallet_balance: Decimal,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Create member request (admin back-office)
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateMember {
    #[validate(length(min = 3, max = 64, message = "Username must be 3 to 64 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
    pub role: Option<Role>,
    pub image_url: Option<String>,
}

/// Update member request. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateMember {
    #[validate(length(min = 3, max = 64, message = "Username must be 3 to 64 characters"))]
    pub username: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
    pub role: Option<Role>,
    pub image_url: Option<String>,
}

/// Member row to insert, password already hashed
#[derive(Debug, Clone)]
pub struct NewMember {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
    pub image_url: Option<String>,
}

/// Member columns to change, password already hashed
#[derive(Debug, Clone, Default)]
pub struct MemberChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<Role>,
    pub image_url: Option<String>,
}

/// Sortable member columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberSortKey {
    Id,
    Username,
    Email,
    Role,
    WalletBalance,
    CreatedAt,
}

impl MemberSortKey {
    /// Parse a sort key; defaults to username
    pub fn parse(key: Option<&str>) -> AppResult<Self> {
        let Some(key) = key else {
            return Ok(MemberSortKey::Username);
        };
        match key.to_lowercase().as_str() {
            "id" => Ok(MemberSortKey::Id),
            "username" => Ok(MemberSortKey::Username),
            "email" => Ok(MemberSortKey::Email),
            "role" => Ok(MemberSortKey::Role),
            "wallet_balance" => Ok(MemberSortKey::WalletBalance),
            "created_at" => Ok(MemberSortKey::CreatedAt),
            other => Err(AppError::Validation(format!("Cannot sort members by '{}'", other))),
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            MemberSortKey::Id => "id",
            MemberSortKey::Username => "LOWER(username)",
            MemberSortKey::Email => "LOWER(email)",
            MemberSortKey::Role => "role",
            MemberSortKey::WalletBalance => "wallet_balance",
            MemberSortKey::CreatedAt => "created_at",
        }
    }

    pub fn compare(&self, a: &Member, b: &Member) -> Ordering {
        match self {
            MemberSortKey::Id => a.id.cmp(&b.id),
            MemberSortKey::Username => a.username.to_lowercase().cmp(&b.username.to_lowercase()),
            MemberSortKey::Email => a.email.to_lowercase().cmp(&b.email.to_lowercase()),
            MemberSortKey::Role => a.role.as_str().cmp(b.role.as_str()),
            MemberSortKey::WalletBalance => a.wallet_balance.cmp(&b.wallet_balance),
            MemberSortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        }
    }
}

/// Wallet balance response
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WalletBalance {
    pub member_id: i32,
    pub email: String,
    #[schema(value_type = String, example = "150.00")]
    pub balance: Decimal,
}

/// A provider payment credited to a wallet; each payment id is credited once
#[derive(Debug, Clone, PartialEq)]
pub struct TopUp {
    pub payment_id: String,
    pub member_id: i32,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}
