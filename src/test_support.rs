//! 测试辅助：内存 SQLite + 迁移 + 种子数据

use crate::entities::{
    PrizeKind, batch_entity as batches, prize_entity as prizes, reservation_entity as reservations,
    token_entity as tokens,
};
use crate::utils::{TokenSigner, generate_token_id};
use chrono::{DateTime, FixedOffset, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use std::collections::HashMap;

pub async fn setup_db() -> DatabaseConnection {
    // 内存库每个连接各自独立，必须固定为单连接
    let mut options = ConnectOptions::new("sqlite::memory:".to_string());
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

pub fn test_signer() -> TokenSigner {
    let mut keys = HashMap::new();
    keys.insert(1, b"test-secret-v1".to_vec());
    keys.insert(2, b"test-secret-v2".to_vec());
    TokenSigner::new(keys, 2).unwrap()
}

pub fn venue_offset() -> FixedOffset {
    FixedOffset::west_opt(5 * 3600).unwrap()
}

pub async fn seed_prize(
    db: &DatabaseConnection,
    key: &str,
    kind: PrizeKind,
    stock: Option<i64>,
) -> prizes::Model {
    prizes::ActiveModel {
        key: Set(key.to_string()),
        label: Set(format!("{key} label")),
        color: Set(Some("#ff00aa".to_string())),
        kind: Set(kind),
        stock: Set(stock),
        emitted_total: Set(0),
        last_emitted_at: Set(None),
        is_active: Set(true),
        created_at: Set(Some(Utc::now())),
        updated_at: Set(Some(Utc::now())),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_batch(db: &DatabaseConnection) -> batches::Model {
    batches::ActiveModel {
        description: Set(Some("seed".to_string())),
        functional_date: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_reservation(
    db: &DatabaseConnection,
    host_arrived_at: Option<DateTime<Utc>>,
) -> reservations::Model {
    reservations::ActiveModel {
        host_name: Set("Host".to_string()),
        host_arrived_at: Set(host_arrived_at),
        created_at: Set(Some(Utc::now())),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

/// 直接插入一张已签名 token（绕过库存），用于状态机相关测试
pub async fn seed_token(
    db: &DatabaseConnection,
    signer: &TokenSigner,
    prize_id: i64,
    batch_id: i64,
    expires_at: DateTime<Utc>,
) -> tokens::Model {
    let id = generate_token_id();
    let (signature, signature_version) = signer.sign_token(&id, prize_id, expires_at).unwrap();
    tokens::ActiveModel {
        id: Set(id),
        prize_id: Set(prize_id),
        batch_id: Set(batch_id),
        expires_at: Set(expires_at),
        signed_expires_at: Set(expires_at),
        signature: Set(signature),
        signature_version: Set(signature_version),
        disabled: Set(false),
        available_from: Set(None),
        revealed_at: Set(None),
        delivered_at: Set(None),
        redeemed_at: Set(None),
        assigned_prize_id: Set(None),
        paired_next_token_id: Set(None),
        reservation_id: Set(None),
        created_at: Set(Some(Utc::now())),
    }
    .insert(db)
    .await
    .unwrap()
}
