use actix_web::{App, HttpServer, middleware::Logger, web};
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use chrono::Local;  // timestamp in log lines

use prize_token_backend::{
    config::Config,
    database::{create_pool, run_migrations},
    handlers,
    middlewares::create_cors,
    services::*,
    swagger::swagger_config,
    tasks,
    utils::TokenSigner,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置
    let config = Config::from_toml().expect("Failed to load configuration file");

    // 创建数据库连接池
    let pool = create_pool(&config.database)
        .await
        .expect("Failed to create database connection pool");

    // 运行数据库迁移
    run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    // 签名密钥环
    let signer = TokenSigner::from_config(&config.signing).expect("Invalid signing configuration");
    log::info!(
        "Token signer ready (current version v{})",
        signer.current_version()
    );

    // 创建服务
    let batch_service = BatchService::new(pool.clone(), signer.clone(), config.venue.offset());
    let redemption_service = RedemptionService::new(pool.clone(), signer);
    let expiration_service = ExpirationService::new(pool.clone(), config.venue.clone());
    let paired_retry_service = PairedRetryService::new(pool.clone());

    // 启动后台任务
    tasks::spawn_all(&config.tasks, paired_retry_service.clone());

    // 启动HTTP服务器
    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(create_cors())
            .app_data(web::Data::new(batch_service.clone()))
            .app_data(web::Data::new(redemption_service.clone()))
            .app_data(web::Data::new(expiration_service.clone()))
            .app_data(web::Data::new(paired_retry_service.clone()))
            .configure(swagger_config)
            .service(
                web::scope("/api/v1")
                    .configure(handlers::batch_config)
                    .configure(handlers::token_config)
                    .configure(handlers::reservation_config)
                    .configure(handlers::admin_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
