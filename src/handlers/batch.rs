use actix_web::{web, HttpResponse, Result, ResponseError};
use crate::models::*;
use crate::services::BatchService;

#[utoipa::path(
    post,
    path = "/batches",
    tag = "batch",
    request_body = GenerateBatchRequest,
    responses(
        (status = 200, description = "批次生成成功", body = GenerateResponse),
        (status = 400, description = "参数错误或过期天数无效"),
        (status = 404, description = "奖品不存在"),
        (status = 409, description = "库存被并发消耗，可重试")
    )
)]
pub async fn generate_batch(
    batch_service: web::Data<BatchService>,
    request: web::Json<GenerateBatchRequest>,
) -> Result<HttpResponse> {
    let request = request.into_inner();

    match batch_service.generate(&request.prizes, &request.options).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn batch_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/batches")
            .route("", web::post().to(generate_batch))
    );
}
