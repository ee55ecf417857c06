//! OP Code validation and lookup. Display masking follows the
//! directory's privacy rules: couriers with scope over the code and admins
//! see it in full, everyone else sees the point masked.

use axum::extract::{Path, Query, State};
use axum::Json;
use openpenpal_errors::DomainError;
use openpenpal_hierarchy::CourierRepository;
use openpenpal_types::{ApiResponse, OpCode, OpCodePrivacy};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid_format: bool,
    pub exists: bool,
}

pub async fn validate(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> Result<Json<ApiResponse<ValidateResponse>>, DomainError> {
    let parsed = OpCode::parse(&query.code);
    let exists = match &parsed {
        Ok(code) => state.directory.exists(code.as_str()).await?,
        Err(_) => false,
    };
    Ok(Json(ApiResponse::ok(ValidateResponse {
        valid_format: parsed.is_ok(),
        exists,
    })))
}

#[derive(Debug, Serialize)]
pub struct OpCodeDetails {
    pub code: String,
    pub school: String,
    pub area: String,
    pub exists: bool,
}

pub async fn details(
    State(state): State<AppState>,
    user: AuthUser,
    Path(raw): Path<String>,
) -> Result<Json<ApiResponse<OpCodeDetails>>, DomainError> {
    let code = OpCode::parse(&raw).map_err(|e| DomainError::BadOpCode(e.to_string()))?;
    let exists = state.directory.exists(code.as_str()).await?;

    let full_view = if user.is_admin() {
        true
    } else {
        match state.couriers.get_by_user(user.user_id).await {
            Ok(courier) => openpenpal_hierarchy::can_manage_op_code(&courier, &code),
            Err(_) => false,
        }
    };

    let privacy = if full_view { OpCodePrivacy::Public } else { OpCodePrivacy::Partial };
    let displayed = code
        .display_for(privacy, full_view)
        .unwrap_or_else(|| code.mask_point());

    Ok(Json(ApiResponse::ok(OpCodeDetails {
        code: displayed,
        school: code.school().to_string(),
        area: code.area().to_string(),
        exists,
    })))
}
