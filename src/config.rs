use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub signing: SigningConfig,
    #[serde(default)]
    pub venue: VenueConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// 签名密钥环：按版本寻址，新发放的 token 使用 current_version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    pub current_version: i16,
    #[serde(default)]
    pub keys: Vec<SigningKeyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningKeyConfig {
    pub version: i16,
    pub secret: String,
}

impl SigningConfig {
    pub fn secret_for(&self, version: i16) -> Option<&str> {
        self.keys
            .iter()
            .find(|k| k.version == version)
            .map(|k| k.secret.as_str())
    }

    fn set_secret(&mut self, version: i16, secret: String) {
        match self.keys.iter_mut().find(|k| k.version == version) {
            Some(k) => k.secret = secret,
            None => self.keys.push(SigningKeyConfig { version, secret }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// 场地固定 UTC 偏移（分钟），例如 -300 = UTC-05:00
    pub utc_offset_minutes: i32,
    /// 到场后 token 过期的分钟数
    pub arrival_expiration_minutes: i64,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            arrival_expiration_minutes: 45,
        }
    }
}

impl VenueConfig {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TasksConfig {
    /// 配对失效扫描间隔（秒），0 表示不启动
    #[serde(default)]
    pub paired_sweep_interval_secs: u64,
}

/// 支持的签名版本，对应环境变量 TOKEN_SIGNING_SECRET_V{n}
const KNOWN_SIGNING_VERSIONS: [i16; 2] = [1, 2];

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        let config_result = std::fs::read_to_string(&config_path);

        let mut config: Config = match config_result {
            Ok(config_str) => toml::from_str(&config_str)
                .map_err(|e| format!("Failed to parse config file: {e}"))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // 无配置文件：使用环境变量与默认值构建
                let database_url = get_env("DATABASE_URL")
                    .ok_or("DATABASE_URL is required when config.toml is missing")?;

                Config {
                    server: ServerConfig {
                        host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                        port: get_env_parse("SERVER_PORT", 8080u16),
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                    },
                    signing: SigningConfig {
                        current_version: get_env_parse("TOKEN_SIGNING_CURRENT_VERSION", 2i16),
                        keys: Vec::new(),
                    },
                    venue: VenueConfig {
                        utc_offset_minutes: get_env_parse("VENUE_UTC_OFFSET_MINUTES", 0i32),
                        arrival_expiration_minutes: get_env_parse(
                            "ARRIVAL_EXPIRATION_MINUTES",
                            45i64,
                        ),
                    },
                    tasks: TasksConfig {
                        paired_sweep_interval_secs: get_env_parse(
                            "PAIRED_SWEEP_INTERVAL_SECS",
                            0u64,
                        ),
                    },
                }
            }
            Err(e) => {
                return Err(format!("Cannot read config file {config_path}: {e}").into());
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 环境变量覆盖（即便文件存在时也覆盖）
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("SERVER_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT")
            && let Ok(p) = v.parse()
        {
            self.server.port = p;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            self.database.max_connections = mc;
        }
        if let Ok(v) = env::var("TOKEN_SIGNING_CURRENT_VERSION")
            && let Ok(n) = v.parse()
        {
            self.signing.current_version = n;
        }
        for version in KNOWN_SIGNING_VERSIONS {
            if let Ok(v) = env::var(format!("TOKEN_SIGNING_SECRET_V{version}")) {
                self.signing.set_secret(version, v);
            }
        }
        if let Ok(v) = env::var("VENUE_UTC_OFFSET_MINUTES")
            && let Ok(n) = v.parse()
        {
            self.venue.utc_offset_minutes = n;
        }
        if let Ok(v) = env::var("ARRIVAL_EXPIRATION_MINUTES")
            && let Ok(n) = v.parse()
        {
            self.venue.arrival_expiration_minutes = n;
        }
        if let Ok(v) = env::var("PAIRED_SWEEP_INTERVAL_SECS")
            && let Ok(n) = v.parse()
        {
            self.tasks.paired_sweep_interval_secs = n;
        }
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        let current = self.signing.current_version;
        match self.signing.secret_for(current) {
            Some(secret) if !secret.is_empty() => {}
            _ => {
                return Err(format!(
                    "No signing secret configured for current version {current} \
                     (TOKEN_SIGNING_SECRET_V{current})"
                )
                .into());
            }
        }
        if FixedOffset::east_opt(self.venue.utc_offset_minutes * 60).is_none() {
            return Err(format!(
                "Invalid venue UTC offset: {} minutes",
                self.venue.utc_offset_minutes
            )
            .into());
        }
        if self.venue.arrival_expiration_minutes <= 0 {
            return Err("arrival_expiration_minutes must be positive".into());
        }
        Ok(())
    }
}

fn get_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
