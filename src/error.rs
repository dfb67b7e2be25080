use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

pub type AppResult<T> = Result<T, AppError>;

/// 状态机拒绝迁移的具体原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionReason {
    Disabled,
    Expired,
    NotYetAvailable,
    NotRevealed,
    AlreadyRevealed,
    AlreadyDelivered,
    AlreadyRedeemed,
}

impl std::fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransitionReason::Disabled => "token is disabled",
            TransitionReason::Expired => "token has expired",
            TransitionReason::NotYetAvailable => "token is not yet available",
            TransitionReason::NotRevealed => "token has not been revealed",
            TransitionReason::AlreadyRevealed => "token was already revealed",
            TransitionReason::AlreadyDelivered => "token was already delivered",
            TransitionReason::AlreadyRedeemed => "token was already redeemed",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Prize not found: {0}")]
    PrizeNotFound(i64),

    #[error("Invalid expiration for prize {prize_id}: {days} days")]
    InvalidExpiration { prize_id: i64, days: i64 },

    #[error("Race condition while consuming stock of prize {0}")]
    RaceCondition(i64),

    #[error("Invalid transition for token {token_id}: {reason}")]
    InvalidTransition {
        token_id: String,
        reason: TransitionReason,
    },

    #[error("Signature mismatch for token {0}")]
    SignatureMismatch(String),

    #[error("Token not found: {0}")]
    TokenNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl AppError {
    pub fn invalid_transition(token_id: &str, reason: TransitionReason) -> Self {
        AppError::InvalidTransition {
            token_id: token_id.to_string(),
            reason,
        }
    }

    /// RaceCondition 属于瞬时错误，整个请求可以安全重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::RaceCondition(_))
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;

        let message = self.to_string();
        let (status_code, error_code) = match self {
            AppError::PrizeNotFound(_) => (StatusCode::NOT_FOUND, "PRIZE_NOT_FOUND"),
            AppError::TokenNotFound(_) => (StatusCode::NOT_FOUND, "TOKEN_NOT_FOUND"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::InvalidExpiration { .. } => {
                log::warn!("{message}");
                (StatusCode::BAD_REQUEST, "INVALID_EXPIRATION")
            }
            AppError::ValidationError(_) => {
                log::warn!("{message}");
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
            AppError::RaceCondition(_) => {
                log::warn!("{message}");
                (StatusCode::CONFLICT, "RACE_CONDITION")
            }
            AppError::InvalidTransition { reason, .. } => {
                return HttpResponse::Conflict().json(json!({
                    "success": false,
                    "error": {
                        "code": "INVALID_TRANSITION",
                        "reason": reason,
                        "message": message
                    }
                }));
            }
            AppError::SignatureMismatch(_) => {
                log::warn!("{message}");
                (StatusCode::FORBIDDEN, "SIGNATURE_MISMATCH")
            }
            AppError::DatabaseError(err) => {
                log::error!("Database error: {err}");
                return HttpResponse::InternalServerError().json(json!({
                    "success": false,
                    "error": {
                        "code": "DATABASE_ERROR",
                        "message": "Database error"
                    }
                }));
            }
            _ => {
                log::error!("Internal error: {self}");
                return HttpResponse::InternalServerError().json(json!({
                    "success": false,
                    "error": {
                        "code": "INTERNAL_ERROR",
                        "message": "Internal server error"
                    }
                }));
            }
        };

        HttpResponse::build(status_code).json(json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message
            }
        }))
    }
}
