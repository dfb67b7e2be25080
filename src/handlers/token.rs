use actix_web::{web, HttpResponse, Result, ResponseError};
use crate::models::*;
use crate::services::{PairedRetryService, RedemptionService};

#[utoipa::path(
    get,
    path = "/tokens/{id}",
    tag = "token",
    params(
        ("id" = String, Path, description = "Token ID")
    ),
    responses(
        (status = 200, description = "获取 token 状态成功", body = TokenStatusResponse),
        (status = 404, description = "Token 不存在")
    )
)]
pub async fn get_token(
    redemption_service: web::Data<RedemptionService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    match redemption_service.status(&path.into_inner()).await {
        Ok(status) => Ok(HttpResponse::Ok().json(ApiResponse::success(status))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/tokens/{id}/reveal",
    tag = "token",
    params(
        ("id" = String, Path, description = "Token ID")
    ),
    responses(
        (status = 200, description = "揭晓奖品", body = RevealResponse),
        (status = 403, description = "签名校验失败"),
        (status = 404, description = "Token 不存在"),
        (status = 409, description = "状态不允许揭晓")
    )
)]
pub async fn reveal_token(
    redemption_service: web::Data<RedemptionService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    match redemption_service.reveal(&path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/tokens/{id}/deliver",
    tag = "token",
    params(
        ("id" = String, Path, description = "Token ID")
    ),
    responses(
        (status = 200, description = "确认交付", body = RedemptionTimestamps),
        (status = 403, description = "签名校验失败"),
        (status = 404, description = "Token 不存在"),
        (status = 409, description = "未揭晓、已交付、已禁用或已过期")
    )
)]
pub async fn deliver_token(
    redemption_service: web::Data<RedemptionService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    match redemption_service.deliver(&path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/tokens/{id}/redeem",
    tag = "token",
    params(
        ("id" = String, Path, description = "Token ID")
    ),
    responses(
        (status = 200, description = "一阶段兑换（旧版）", body = RedemptionTimestamps),
        (status = 403, description = "签名校验失败"),
        (status = 404, description = "Token 不存在"),
        (status = 409, description = "状态不允许兑换")
    )
)]
pub async fn redeem_token(
    redemption_service: web::Data<RedemptionService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    match redemption_service.redeem(&path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/tokens/{id}/disable",
    tag = "token",
    params(
        ("id" = String, Path, description = "Token ID")
    ),
    responses(
        (status = 200, description = "Token 已禁用", body = TokenStatusResponse),
        (status = 404, description = "Token 不存在")
    )
)]
pub async fn disable_token(
    redemption_service: web::Data<RedemptionService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    match redemption_service.disable(&path.into_inner()).await {
        Ok(status) => Ok(HttpResponse::Ok().json(ApiResponse::success(status))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/tokens/pairs",
    tag = "token",
    request_body = LinkPairRequest,
    responses(
        (status = 200, description = "链接成功", body = LinkPairRequest),
        (status = 400, description = "不是 retry token、自链接或已有链接"),
        (status = 404, description = "Token 不存在")
    )
)]
pub async fn link_pair(
    paired_retry_service: web::Data<PairedRetryService>,
    request: web::Json<LinkPairRequest>,
) -> Result<HttpResponse> {
    match paired_retry_service
        .link_pair(&request.retry_token_id, &request.next_token_id)
        .await
    {
        Ok(pair) => Ok(HttpResponse::Ok().json(ApiResponse::success(pair))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/tokens/invalidate-paired",
    tag = "token",
    responses(
        (status = 200, description = "配对失效扫描完成", body = SweepResponse)
    )
)]
pub async fn invalidate_paired(
    paired_retry_service: web::Data<PairedRetryService>,
) -> Result<HttpResponse> {
    match paired_retry_service.invalidate_paired().await {
        Ok(disabled_count) => Ok(HttpResponse::Ok().json(ApiResponse::success(SweepResponse {
            disabled_count,
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn token_config(cfg: &mut web::ServiceConfig) {
    // 固定路径需要先于 /{id} 注册
    cfg.service(
        web::scope("/tokens")
            .route("/pairs", web::post().to(link_pair))
            .route("/invalidate-paired", web::post().to(invalidate_paired))
            .route("/{id}", web::get().to(get_token))
            .route("/{id}/reveal", web::post().to(reveal_token))
            .route("/{id}/deliver", web::post().to(deliver_token))
            .route("/{id}/redeem", web::post().to(redeem_token))
            .route("/{id}/disable", web::post().to(disable_token))
    );
}
