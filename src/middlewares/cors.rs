use actix_cors::Cors;

/// 前台兑换页与员工端均为独立域名部署
pub fn create_cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_any_header()
        .max_age(3600)
}
