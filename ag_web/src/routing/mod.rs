//! ABOUTME: Actix-web route configuration and app factory
//! ABOUTME: Wires the Control API routes under rate-limiting and body-size middleware

use crate::{middleware, routes::control, AppState};
use actix_web::{web, App, HttpRequest, HttpResponse};
use serde_json::json;
use tracing::info;

/// Create the main web application service factory.
pub fn create_app(
    state: AppState,
) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let rate_limit_config = state.rate_limit_config.clone();
    let body_limits_config = state.body_limits_config.clone();

    App::new()
        .app_data(web::Data::new(state))
        .wrap(actix_web::middleware::Logger::default())
        .wrap(actix_web::middleware::NormalizePath::new(
            actix_web::middleware::TrailingSlash::Trim,
        ))
        .wrap(middleware::bodylimits::BodyLimits::new(body_limits_config))
        .service(control::health)
        .service(
            web::scope("/api")
                .wrap(middleware::ratelimit::RateLimit::new(rate_limit_config))
                .service(control::list_controls)
                .service(control::get_control)
                .service(control::add_control)
                .service(control::cancel_control)
                .default_service(web::to(|req: HttpRequest| async move {
                    let p = req.path().to_string();
                    info!(path = %p, "unmatched control API route");
                    HttpResponse::NotFound().json(json!({
                        "code": crate::models::CODE_NOT_FOUND,
                        "msg": format!("no such route: {p}"),
                    }))
                })),
        )
}
