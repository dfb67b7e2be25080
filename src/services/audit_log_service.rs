use crate::entities::event_log_entity as event_logs;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::Value;

pub const STOCK_CONSUMED: &str = "stock consumed";

/// 审计日志（只追加，尽力而为）
/// 写入失败只记录 warn，不影响它所描述的业务操作
#[derive(Clone)]
pub struct AuditLogService {
    pool: DatabaseConnection,
}

impl AuditLogService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    pub async fn record(&self, kind: &str, message: String, metadata: Value) {
        let result = event_logs::ActiveModel {
            kind: Set(kind.to_string()),
            message: Set(message),
            metadata: Set(Some(metadata)),
            created_at: Set(Some(Utc::now())),
            ..Default::default()
        }
        .insert(&self.pool)
        .await;

        if let Err(e) = result {
            log::warn!("Failed to write audit log ({kind}): {e}");
        }
    }
}
