use actix_web::error::InternalError;
use actix_web::web::*;
use actix_web::ResponseError;

use crate::handlers::error::HttpErrorResponse;
use crate::handlers::send;

use super::RouteLimiters;

const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

pub fn configure(cfg: &mut ServiceConfig, limiters: RouteLimiters) {
    let json_config = JsonConfig::default()
        .limit(MAX_BODY_BYTES)
        .content_type_required(false)
        .error_handler(|err, _req| {
            log::debug!("Failed to decode send request: {err}");

            let resp = HttpErrorResponse::IncorrectlyFormed(err.to_string());
            let http_resp = resp.error_response();
            InternalError::from_response(err, http_resp).into()
        });

    cfg.service(
        resource("/send")
            .app_data(json_config)
            .route(post().to(send::send).wrap(limiters.send)),
    );
}
