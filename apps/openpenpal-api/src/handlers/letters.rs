//! Letter authoring: draft creation, barcode generation, and the gated
//! read path.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use openpenpal_errors::DomainError;
use openpenpal_letters::state_machine;
use openpenpal_letters::{compose_reply, BarcodeRepository, LetterRepository, ReplyDraft, TaskStore};
use openpenpal_types::{
    ApiResponse, Barcode, BarcodeStatus, Letter, LetterId, LetterStatus, LetterVisibility, OpCode,
    Task, TaskId, TaskPriority, TaskStatus,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateLetterRequest {
    pub title: String,
    pub content: String,
    pub visibility: LetterVisibility,
    pub recipient_op_code: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub style: Option<String>,
    pub reply_to: Option<LetterId>,
}

pub async fn create_letter(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateLetterRequest>,
) -> Result<Json<ApiResponse<Letter>>, DomainError> {
    if req.title.trim().is_empty() {
        return Err(DomainError::MissingField("title".to_string()));
    }
    let recipient_op_code = req
        .recipient_op_code
        .map(|raw| OpCode::parse(&raw).map_err(|e| DomainError::BadOpCode(e.to_string())))
        .transpose()?;

    let now = Utc::now();
    let letter = if let Some(reply_to) = req.reply_to {
        // Reply threading validates the source letter and links back to it.
        let mut reply = compose_reply(
            state.letters.as_ref(),
            reply_to,
            ReplyDraft {
                author_id: user.user_id,
                title: req.title,
                content: req.content,
                visibility: req.visibility,
                style: req.style,
            },
        )
        .await?;
        if recipient_op_code.is_some() || req.scheduled_at.is_some() {
            reply.recipient_op_code = recipient_op_code;
            reply.scheduled_at = req.scheduled_at;
            reply.updated_at = now;
            state.letters.save(&reply).await?;
        }
        reply
    } else {
        let letter = Letter {
            id: LetterId::new(),
            author_id: user.user_id,
            title: req.title,
            content: req.content,
            visibility: req.visibility,
            status: LetterStatus::Draft,
            scheduled_at: req.scheduled_at,
            recipient_op_code,
            style: req.style,
            reply_to: None,
            created_at: now,
            updated_at: now,
        };
        state.letters.save(&letter).await?;
        letter
    };
    Ok(Json(ApiResponse::ok(letter)))
}

/// The author backs out: legal from DRAFT or GENERATED only.
pub async fn cancel_letter(
    State(state): State<AppState>,
    user: AuthUser,
    Path(letter_id): Path<LetterId>,
) -> Result<Json<ApiResponse<Letter>>, DomainError> {
    let mut letter = state.letters.get(letter_id).await?;
    if letter.author_id != user.user_id {
        return Err(DomainError::NotFound);
    }
    if !state_machine::can_cancel(letter.status) {
        return Err(DomainError::IllegalTransition);
    }
    letter.status = LetterStatus::Canceled;
    letter.updated_at = Utc::now();
    state.letters.save(&letter).await?;
    Ok(Json(ApiResponse::ok(letter)))
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub pickup_op_code: String,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub letter: Letter,
    pub barcode: Barcode,
    pub task: Task,
}

fn new_barcode_code() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..10)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("OPP{suffix}")
}

/// Binds a fresh barcode to the letter and opens its delivery task. A
/// letter scheduled for the future keeps its pre-release status until
/// `future_letter_unlock` promotes it; its task exists but is not routable
/// until then.
pub async fn generate(
    State(state): State<AppState>,
    user: AuthUser,
    Path(letter_id): Path<LetterId>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<ApiResponse<GenerateResponse>>, DomainError> {
    let mut letter = state.letters.get(letter_id).await?;
    if letter.author_id != user.user_id {
        return Err(DomainError::NotFound);
    }
    if !state_machine::can_submit(letter.status) {
        return Err(DomainError::IllegalTransition);
    }
    let recipient = letter.recipient_op_code.ok_or_else(|| {
        DomainError::MissingField("recipient_op_code".to_string())
    })?;
    let pickup = OpCode::parse(&req.pickup_op_code).map_err(|e| DomainError::BadOpCode(e.to_string()))?;

    let now = Utc::now();
    let barcode = Barcode {
        code: new_barcode_code(),
        batch_id: Uuid::new_v4(),
        letter_id: Some(letter.id),
        status: BarcodeStatus::Bound,
        recipient_op_code: Some(recipient),
    };
    state.barcodes.save(&barcode).await?;

    let task = Task {
        id: TaskId::new(),
        letter_id: letter.id,
        pickup_op_code: pickup,
        delivery_op_code: recipient,
        assigned_courier_id: None,
        status: TaskStatus::Available,
        priority: req.priority.unwrap_or(TaskPriority::Normal),
        reward_points: 10,
        created_at: now,
        accepted_at: None,
        completed_at: None,
    };
    state.delivery_tasks.save(&task).await?;

    if !letter.is_future(now) {
        letter.status = LetterStatus::Generated;
    }
    letter.updated_at = now;
    state.letters.save(&letter).await?;

    Ok(Json(ApiResponse::ok(GenerateResponse { letter, barcode, task })))
}

/// Scheduled letters are gated; a recipient opening a delivered
/// letter advances it to READ.
pub async fn get_letter(
    State(state): State<AppState>,
    user: AuthUser,
    Path(letter_id): Path<LetterId>,
) -> Result<Json<ApiResponse<Letter>>, DomainError> {
    let mut letter = state.letters.get(letter_id).await?;
    let now = Utc::now();

    if letter.author_id == user.user_id {
        return Ok(Json(ApiResponse::ok(letter)));
    }

    // Non-authors never see an unreleased letter.
    if letter.is_future(now) {
        return Err(DomainError::NotFound);
    }

    let readable = match letter.visibility {
        LetterVisibility::Public | LetterVisibility::School => true,
        LetterVisibility::Private => state_machine::can_mark_read(letter.status) || letter.status == LetterStatus::Read,
    };
    if !readable {
        return Err(DomainError::NotFound);
    }

    if state_machine::can_mark_read(letter.status) {
        letter.status = LetterStatus::Read;
        letter.updated_at = now;
        state.letters.save(&letter).await?;
    }

    Ok(Json(ApiResponse::ok(letter)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barcode_codes_carry_the_platform_prefix_and_no_ambiguous_chars() {
        for _ in 0..50 {
            let code = new_barcode_code();
            assert!(code.starts_with("OPP"));
            assert_eq!(code.len(), 13);
            assert!(!code[3..].contains(['0', '1', 'I', 'O']), "{code}");
        }
    }
}
