//! Token 签名
//!
//! 签名为 HMAC-SHA256，绑定 (token_id, prize_id, expires_at)。
//! 每个 token 记录 signature_version，校验时只按存储的版本分发，
//! 这样轮换算法或密钥不会使已发放的 token 失效。

use crate::config::SigningConfig;
use crate::entities::token_entity as tokens;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// v1: "{id}|{prize_id}|{expires_at 毫秒时间戳}"
pub const SIGNATURE_V1: i16 = 1;
/// v2: "v2:{id}:{prize_id}:{expires_at RFC3339 毫秒, Z}"
pub const SIGNATURE_V2: i16 = 2;

fn payload(
    token_id: &str,
    prize_id: i64,
    expires_at: DateTime<Utc>,
    version: i16,
) -> Option<String> {
    match version {
        SIGNATURE_V1 => Some(format!(
            "{token_id}|{prize_id}|{}",
            expires_at.timestamp_millis()
        )),
        SIGNATURE_V2 => Some(format!(
            "v2:{token_id}:{prize_id}:{}",
            expires_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        )),
        _ => None,
    }
}

/// 计算签名；不支持的版本返回 None
pub fn sign(
    secret: &[u8],
    token_id: &str,
    prize_id: i64,
    expires_at: DateTime<Utc>,
    version: i16,
) -> Option<String> {
    let payload = payload(token_id, prize_id, expires_at, version)?;
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// 校验签名；任何格式错误都返回 false，不会 panic
pub fn verify(
    secret: &[u8],
    token_id: &str,
    prize_id: i64,
    expires_at: DateTime<Utc>,
    version: i16,
    signature: &str,
) -> bool {
    let Some(computed) = sign(secret, token_id, prize_id, expires_at, version) else {
        return false;
    };
    let (Ok(expected), Ok(actual)) = (hex::decode(signature), hex::decode(computed)) else {
        return false;
    };
    if expected.len() != actual.len() {
        return false;
    }
    expected.ct_eq(actual.as_slice()).into()
}

/// 按版本寻址的密钥环
#[derive(Clone)]
pub struct TokenSigner {
    keys: Arc<HashMap<i16, Vec<u8>>>,
    current_version: i16,
}

impl TokenSigner {
    pub fn new(keys: HashMap<i16, Vec<u8>>, current_version: i16) -> AppResult<Self> {
        if payload("", 0, DateTime::<Utc>::UNIX_EPOCH, current_version).is_none() {
            return Err(AppError::ConfigError(format!(
                "Unsupported signature version {current_version}"
            )));
        }
        if !keys.contains_key(&current_version) {
            return Err(AppError::ConfigError(format!(
                "Missing signing secret for version {current_version}"
            )));
        }
        Ok(Self {
            keys: Arc::new(keys),
            current_version,
        })
    }

    pub fn from_config(config: &SigningConfig) -> AppResult<Self> {
        let keys = config
            .keys
            .iter()
            .map(|k| (k.version, k.secret.as_bytes().to_vec()))
            .collect();
        Self::new(keys, config.current_version)
    }

    pub fn current_version(&self) -> i16 {
        self.current_version
    }

    /// 使用当前版本签名，返回 (signature, version)
    pub fn sign_token(
        &self,
        token_id: &str,
        prize_id: i64,
        expires_at: DateTime<Utc>,
    ) -> AppResult<(String, i16)> {
        let secret = self.keys.get(&self.current_version).ok_or_else(|| {
            AppError::ConfigError(format!(
                "Missing signing secret for version {}",
                self.current_version
            ))
        })?;
        let signature = sign(secret, token_id, prize_id, expires_at, self.current_version)
            .ok_or_else(|| {
                AppError::InternalError(format!(
                    "Failed to sign token with version {}",
                    self.current_version
                ))
            })?;
        Ok((signature, self.current_version))
    }

    /// 按 token 存储的版本校验；没有对应版本密钥时视为校验失败
    pub fn verify_token(&self, token: &tokens::Model) -> bool {
        match self.keys.get(&token.signature_version) {
            Some(secret) => verify(
                secret,
                &token.id,
                token.prize_id,
                token.signed_expires_at,
                token.signature_version,
                &token.signature,
            ),
            None => false,
        }
    }
}
