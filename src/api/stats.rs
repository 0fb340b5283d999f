//! Statistics endpoints

use axum::{extract::State, Json};

use crate::{error::AppResult, services::stats::DashboardCounts, AppState};

use super::AuthenticatedUser;

/// Dashboard counts
#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Dashboard counts", body = DashboardCounts),
        (status = 403, description = "Administrator role required")
    )
)]
pub async fn get_stats(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<DashboardCounts>> {
    claims.require_admin()?;

    Ok(Json(state.services.stats.dashboard().await))
}
