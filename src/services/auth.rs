//! Authentication service: registration, login and session tokens

use chrono::Utc;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{
        auth::{LoginRequest, LoginResponse, MemberClaims, RegisterRequest},
        member::{CreateMember, Member, Role},
    },
    services::members::{verify_password, MembersService},
};

#[derive(Clone)]
pub struct AuthService {
    members: MembersService,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(members: MembersService, config: AuthConfig) -> Self {
        Self { members, config }
    }

    /// Self-service sign-up; the new member is always a plain user
    pub async fn register(&self, request: RegisterRequest) -> AppResult<Member> {
        request.validate()?;
        self.members
            .create_member(CreateMember {
                username: request.username,
                email: request.email,
                password: Some(request.password),
                role: Some(Role::User),
                image_url: request.image_url,
            })
            .await
    }

    /// Check credentials and issue a JWT
    pub async fn login(&self, request: LoginRequest) -> AppResult<LoginResponse> {
        request.validate()?;

        let member = self
            .members
            .find_by_email(request.email.trim())
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid email or password".to_string()))?;

        if !verify_password(&member, &request.password)? {
            tracing::info!(member_id = member.id, "Rejected login attempt");
            return Err(AppError::Authentication("Invalid email or password".to_string()));
        }

        let token = self.issue_token(&member)?;
        Ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.jwt_expiration_hours as i64 * 3600,
            member,
        })
    }

    pub fn issue_token(&self, member: &Member) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = MemberClaims {
            sub: member.email.clone(),
            member_id: member.id,
            role: member.role,
            exp: now + self.config.jwt_expiration_hours as i64 * 3600,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    pub fn verify_token(&self, token: &str) -> AppResult<MemberClaims> {
        MemberClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))
    }
}
