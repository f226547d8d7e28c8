use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::AuthUser;
use crate::extractors::JsonBody;
use crate::response::{created, AppError};
use crate::services::reviews::record_review;
use crate::srs::QualityRating;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(submit_review))
}

/// Fields stay loosely typed so that a missing or mistyped value is reported
/// as `INVALID_INPUT` rather than as an unreadable body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReviewRequest {
    pub flashcard_id: Option<Value>,
    pub quality_rating: Option<Value>,
}

fn parse_flashcard_id(raw: Option<&Value>) -> Result<String, AppError> {
    match raw {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(id.trim().to_string()),
        _ => Err(AppError::bad_request(
            "INVALID_INPUT",
            "flashcardId is required and must be a non-empty string",
        )),
    }
}

fn parse_quality(raw: Option<&Value>) -> Result<QualityRating, AppError> {
    let value = raw.and_then(Value::as_i64).ok_or_else(|| {
        AppError::bad_request(
            "INVALID_INPUT",
            "qualityRating is required and must be an integer between 0 and 5",
        )
    })?;
    Ok(QualityRating::try_from(value)?)
}

async fn submit_review(
    auth_user: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SubmitReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    let flashcard_id = parse_flashcard_id(req.flashcard_id.as_ref())?;
    let quality = parse_quality(req.quality_rating.as_ref())?;

    let record = record_review(
        state.store(),
        state.scheduler(),
        state.clock(),
        &auth_user.user_id,
        &flashcard_id,
        quality,
    )?;

    Ok(created(record))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn quality_must_be_integer_in_range() {
        assert_eq!(parse_quality(Some(&json!(0))).unwrap().value(), 0);
        assert_eq!(parse_quality(Some(&json!(5))).unwrap().value(), 5);
        for bad in [json!(6), json!(-1), json!(3.5), json!("4"), json!(null)] {
            let err = parse_quality(Some(&bad)).unwrap_err();
            assert_eq!(err.code, "INVALID_INPUT", "{bad}");
        }
        assert!(parse_quality(None).is_err());
    }

    #[test]
    fn flashcard_id_must_be_string() {
        assert_eq!(parse_flashcard_id(Some(&json!(" c1 "))).unwrap(), "c1");
        assert!(parse_flashcard_id(Some(&json!(42))).is_err());
        assert!(parse_flashcard_id(Some(&json!(""))).is_err());
        assert!(parse_flashcard_id(None).is_err());
    }
}
