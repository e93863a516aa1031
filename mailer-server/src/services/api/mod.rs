use std::time::Duration;

use actix_web::web::*;

use crate::middleware::Limiter;

mod send;

#[derive(Clone)]
pub struct RouteLimiters {
    pub send: Limiter,
}

impl RouteLimiters {
    pub fn new(warn_every_over_limit: u32) -> Self {
        const CLEAR_FREQUENCY: Duration = Duration::from_secs(3600);

        Self {
            send: Limiter::new(
                5,
                Duration::from_secs(60),
                CLEAR_FREQUENCY,
                warn_every_over_limit,
                "POST /api/send",
            ),
        }
    }
}

impl Default for RouteLimiters {
    fn default() -> Self {
        Self::new(0)
    }
}

pub fn configure(cfg: &mut ServiceConfig, limiters: RouteLimiters) {
    cfg.service(scope("/api").configure(|cfg| send::configure(cfg, limiters)));
}
