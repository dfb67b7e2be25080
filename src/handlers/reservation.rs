use actix_web::{web, HttpResponse, Result, ResponseError};
use crate::models::*;
use crate::services::ExpirationService;

#[utoipa::path(
    post,
    path = "/reservations/{id}/arrival",
    tag = "reservation",
    params(
        ("id" = i64, Path, description = "预订 ID")
    ),
    request_body = RecordArrivalRequest,
    responses(
        (status = 200, description = "记录到场并重算过期时间", body = RecalculateResponse),
        (status = 404, description = "预订不存在")
    )
)]
pub async fn record_arrival(
    expiration_service: web::Data<ExpirationService>,
    path: web::Path<i64>,
    request: Option<web::Json<RecordArrivalRequest>>,
) -> Result<HttpResponse> {
    let reservation_id = path.into_inner();
    let arrived_at = request.and_then(|r| r.into_inner().arrived_at);

    match expiration_service.record_arrival(reservation_id, arrived_at).await {
        Ok(update) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            RecalculateResponse::new(reservation_id, update),
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/reservations/{id}/recalculate-expiration",
    tag = "reservation",
    params(
        ("id" = i64, Path, description = "预订 ID")
    ),
    responses(
        (status = 200, description = "重算完成（未到场时不做修改）", body = RecalculateResponse),
        (status = 404, description = "预订不存在")
    )
)]
pub async fn recalculate_expiration(
    expiration_service: web::Data<ExpirationService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let reservation_id = path.into_inner();

    match expiration_service.recalculate(reservation_id).await {
        Ok(update) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            RecalculateResponse::new(reservation_id, update),
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn reservation_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/reservations")
            .route("/{id}/arrival", web::post().to(record_arrival))
            .route("/{id}/recalculate-expiration", web::post().to(recalculate_expiration))
    );
}
