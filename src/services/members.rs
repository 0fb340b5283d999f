//! Membership service: member records and credentials

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::LoanDetails,
        member::{CreateMember, Member, MemberChanges, NewMember, UpdateMember},
        page::{Page, PageRequest},
    },
    repository::Repository,
};

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Check a password against a member's stored hash.
/// Members created without a password can never log in.
pub fn verify_password(member: &Member, password: &str) -> AppResult<bool> {
    let Some(ref hash) = member.password_hash else {
        return Ok(false);
    };
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[derive(Clone)]
pub struct MembersService {
    repository: Repository,
}

impl MembersService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list_members(&self, request: &PageRequest) -> AppResult<Page<Member>> {
        self.repository.members.list(request).await
    }

    pub async fn get_member(&self, id: i32) -> AppResult<Member> {
        self.repository.members.get_by_id(id).await
    }

    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<Member>> {
        self.repository.members.find_by_email(email).await
    }

    pub async fn create_member(&self, member: CreateMember) -> AppResult<Member> {
        member.validate()?;

        let email = member.email.trim().to_string();
        if self.repository.members.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict(format!("Email {} is already registered", email)));
        }

        let password_hash = member.password.as_deref().map(hash_password).transpose()?;
        let created = self
            .repository
            .members
            .create(&NewMember {
                username: member.username.trim().to_string(),
                email,
                password_hash,
                role: member.role.unwrap_or_default(),
                image_url: member.image_url,
            })
            .await?;

        tracing::info!(member_id = created.id, role = %created.role, "Member created");
        Ok(created)
    }

    pub async fn update_member(&self, id: i32, changes: UpdateMember) -> AppResult<Member> {
        changes.validate()?;

        let password_hash = changes.password.as_deref().map(hash_password).transpose()?;
        self.repository
            .members
            .update(
                id,
                &MemberChanges {
                    username: changes.username.map(|u| u.trim().to_string()),
                    email: changes.email.map(|e| e.trim().to_string()),
                    password_hash,
                    role: changes.role,
                    image_url: changes.image_url,
                },
            )
            .await
    }

    pub async fn delete_member(&self, id: i32) -> AppResult<Member> {
        let deleted = self.repository.members.delete(id).await?;
        tracing::info!(member_id = id, "Member deleted");
        Ok(deleted)
    }

    /// Loan history of a member, newest first
    pub async fn member_loans(&self, id: i32) -> AppResult<Vec<LoanDetails>> {
        self.repository.members.get_by_id(id).await?;
        self.repository.loans.list_by_member(id).await
    }
}
