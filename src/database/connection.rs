use crate::config::DatabaseConfig;
use crate::error::AppResult;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;

pub type DbPool = DatabaseConnection;

/// 创建数据库连接（启动时构造一次，显式注入到各个 service）
pub async fn create_pool(config: &DatabaseConfig) -> AppResult<DbPool> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    let pool = Database::connect(options).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &DbPool) -> AppResult<()> {
    Migrator::up(pool, None).await?;
    Ok(())
}
