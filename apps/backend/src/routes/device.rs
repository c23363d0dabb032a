//! Device registration and status endpoints

use axum::{extract::State, Extension, Json};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::{DeviceStatusResponse, RegisterRequest, RegisterResponse};
use crate::routes::auth::AuthenticatedDevice;
use crate::AppState;

/// POST /api/device/register
/// Creates a device, joining `account_id` when given, and returns its token
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<Option<RegisterRequest>>,
) -> Result<Json<RegisterResponse>> {
    let payload = payload.unwrap_or_default();

    let account_id = match payload.account_id.as_deref() {
        Some(raw) => {
            let account_id = Uuid::parse_str(raw)
                .map_err(|_| ApiError::BadRequest(format!("invalid account id '{}'", raw)))?;
            if !state.db.account_exists(account_id).await? {
                return Err(ApiError::NotFound(format!("account {}", account_id)));
            }
            account_id
        }
        None => state.db.create_account().await?,
    };

    let device = state
        .db
        .create_device(account_id, payload.name.as_deref())
        .await?;

    tracing::info!(device = %device.id, account = %account_id, "registered device");

    Ok(Json(RegisterResponse {
        device_id: device.id.to_string(),
        account_id: account_id.to_string(),
        token: device.token,
    }))
}

/// GET /api/device/status
pub async fn status(
    Extension(auth): Extension<AuthenticatedDevice>,
    State(state): State<AppState>,
) -> Result<Json<DeviceStatusResponse>> {
    let device = state
        .db
        .get_device_by_token(&auth.token)
        .await?
        .ok_or_else(|| ApiError::NotFound("Device not found".to_string()))?;

    Ok(Json(DeviceStatusResponse {
        device_id: device.id,
        account_id: device.account_id,
        name: device.name,
        last_seen_at: device.last_seen_at,
    }))
}
