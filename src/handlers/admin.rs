use actix_web::{web, HttpResponse, Result, ResponseError};
use crate::models::*;
use crate::services::{BatchService, ExpirationService, RedemptionService};

#[utoipa::path(
    post,
    path = "/admin/backfill/two-phase",
    tag = "admin",
    responses(
        (status = 200, description = "旧版兑换数据回填完成", body = BackfillResponse),
        (status = 500, description = "回填失败")
    )
)]
pub async fn backfill_two_phase(
    redemption_service: web::Data<RedemptionService>,
) -> Result<HttpResponse> {
    match redemption_service.backfill_two_phase().await {
        Ok(updated) => Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
            BackfillResponse { updated },
            "两阶段字段回填完成".to_string(),
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/backfill/functional-dates",
    tag = "admin",
    responses(
        (status = 200, description = "批次营业日回填完成", body = BackfillResponse),
        (status = 500, description = "回填失败")
    )
)]
pub async fn backfill_functional_dates(
    batch_service: web::Data<BatchService>,
) -> Result<HttpResponse> {
    match batch_service.backfill_functional_dates().await {
        Ok(updated) => Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
            BackfillResponse { updated },
            "营业日回填完成".to_string(),
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/backfill/expirations",
    tag = "admin",
    responses(
        (status = 200, description = "已到场预订的过期时间重算完成", body = [ExpirationUpdate]),
        (status = 500, description = "重算失败")
    )
)]
pub async fn backfill_expirations(
    expiration_service: web::Data<ExpirationService>,
) -> Result<HttpResponse> {
    match expiration_service.recalculate_all().await {
        Ok(updates) => Ok(HttpResponse::Ok().json(ApiResponse::success(updates))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn admin_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/backfill/two-phase", web::post().to(backfill_two_phase))
            .route("/backfill/functional-dates", web::post().to(backfill_functional_dates))
            .route("/backfill/expirations", web::post().to(backfill_expirations))
    );
}
