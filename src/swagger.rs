use actix_web::web;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::{PrizeKind, TokenState};
use crate::error::TransitionReason;
use crate::handlers;
use crate::models::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::batch::generate_batch,
        handlers::token::get_token,
        handlers::token::reveal_token,
        handlers::token::deliver_token,
        handlers::token::redeem_token,
        handlers::token::disable_token,
        handlers::token::link_pair,
        handlers::token::invalidate_paired,
        handlers::reservation::record_arrival,
        handlers::reservation::recalculate_expiration,
        handlers::admin::backfill_two_phase,
        handlers::admin::backfill_functional_dates,
        handlers::admin::backfill_expirations,
    ),
    components(
        schemas(
            PrizeRequest,
            GenerateOptions,
            GenerateBatchRequest,
            BatchResponse,
            GeneratedToken,
            GenerateMeta,
            GenerateResponse,
            PrizeKind,
            TokenState,
            TransitionReason,
            RevealedPrize,
            RevealResponse,
            RedemptionTimestamps,
            TokenStatusResponse,
            LinkPairRequest,
            SweepResponse,
            BackfillResponse,
            RecordArrivalRequest,
            ExpirationUpdate,
            RecalculateResponse,
            ApiError,
        )
    ),
    tags(
        (name = "batch", description = "Token batch generation API"),
        (name = "token", description = "Token reveal / delivery API"),
        (name = "reservation", description = "Reservation arrival and expiration API"),
        (name = "admin", description = "Maintenance and backfill API"),
    ),
    info(
        title = "Prize Token API",
        version = "1.0.0",
        description = "Prize token issuance and redemption REST API documentation",
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_token_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/batches",
            "/tokens/{id}/reveal",
            "/tokens/{id}/deliver",
            "/reservations/{id}/recalculate-expiration",
        ] {
            assert!(paths.iter().any(|p| p.as_str() == expected), "missing {expected}");
        }
    }
}
