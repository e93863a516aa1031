use std::{
    future::{ready, Ready},
    net::IpAddr,
    rc::Rc,
    time::{Duration, Instant},
};

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, ResponseError,
};
use futures::future::LocalBoxFuture;
use tokio::sync::RwLock;

use crate::handlers::error::HttpErrorResponse;
use crate::utils::limiter_table::{self, CheckAndRecordResult, LimiterTable};

const SHARDS: usize = 16;

/// Per-client fixed-window rate limiter, keyed by the peer's IP address.
///
/// Only responses with a success status consume quota: when the wrapped service answers with
/// anything else, the slot taken for the request is handed back.
#[derive(Clone)]
pub struct Limiter {
    max_per_period: u32,
    period: Duration,
    clear_frequency: Duration,
    warn_every_over_limit: u32,
    limiter_tables: &'static [RwLock<LimiterTable<IpAddr>>; SHARDS],
    name: &'static str,
}

impl Limiter {
    /// Should be created on a single thread and cloned into each worker so that every worker
    /// shares the same tables. Panics if period is greater than clear frequency.
    pub fn new(
        max_per_period: u32,
        period: Duration,
        clear_frequency: Duration,
        warn_every_over_limit: u32,
        name: &'static str,
    ) -> Self {
        if period > clear_frequency {
            panic!("Period cannot be greater than clear frequency");
        }

        Limiter {
            max_per_period,
            period,
            clear_frequency,
            warn_every_over_limit,
            limiter_tables: limiter_table::new_sharded_tables::<IpAddr, SHARDS>(),
            name,
        }
    }

    fn shard_for(&self, ip: &IpAddr) -> &'static RwLock<LimiterTable<IpAddr>> {
        let distinguishing_octet = match ip {
            IpAddr::V4(ip) => ip.octets()[3],
            IpAddr::V6(ip) => ip.octets()[15],
        };

        &self.limiter_tables[distinguishing_octet as usize % SHARDS]
    }

    fn maybe_warn(&self, ip: &IpAddr, over_limit: u32) {
        if self.warn_every_over_limit == 0 {
            return;
        }

        if (over_limit - 1) % self.warn_every_over_limit == 0 {
            log::warn!(
                "Rate-limited request (key={}, over_limit={}, limit={}, warn_every={}, limiter_name={})",
                ip,
                over_limit,
                self.max_per_period,
                self.warn_every_over_limit,
                self.name,
            );
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Limiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = LimiterMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LimiterMiddleware {
            service: Rc::new(service),
            limiter: self.clone(),
        }))
    }
}

pub struct LimiterMiddleware<S> {
    service: Rc<S>,
    limiter: Limiter,
}

impl<S, B> Service<ServiceRequest> for LimiterMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let limiter = self.limiter.clone();

        // peer_addr() is only absent for requests that didn't come over a socket
        let ip = req.peer_addr().map(|addr| addr.ip().to_canonical());

        Box::pin(async move {
            let Some(ip) = ip else {
                return Ok(service.call(req).await?.map_into_boxed_body());
            };

            let shard = limiter.shard_for(&ip);

            let result = limiter_table::check_and_record(
                shard,
                ip,
                Instant::now(),
                limiter.max_per_period,
                limiter.period,
                limiter.clear_frequency,
            )
            .await;

            let window_start = match result {
                CheckAndRecordResult::Allowed { window_start } => window_start,
                CheckAndRecordResult::Blocked {
                    over_limit,
                    retry_after,
                } => {
                    limiter.maybe_warn(&ip, over_limit);

                    let res = HttpErrorResponse::TooManyRequests(retry_after).error_response();
                    return Ok(req.into_response(res));
                }
            };

            let res = service.call(req).await;

            let succeeded = matches!(&res, Ok(res) if res.status().is_success());
            if !succeeded {
                limiter_table::release(shard, &ip, window_start).await;
            }

            Ok(res?.map_into_boxed_body())
        })
    }
}
