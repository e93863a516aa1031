use std::future::{ready, Ready};

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::{
        header::{self, HeaderValue},
        Method,
    },
    Error, HttpResponse,
};
use futures::future::LocalBoxFuture;

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const PREFLIGHT_MAX_AGE_SECS: &str = "86400";

/// CORS middleware that validates origins and sets appropriate headers.
///
/// An allowed origin of `*` accepts every origin. Otherwise the `Origin` header must match one
/// of the configured origins exactly. Preflight requests are answered here and never reach the
/// wrapped service.
#[derive(Clone)]
pub struct CorsMiddleware {
    allow_any_origin: bool,
    allowed_origin_headers: Vec<(String, HeaderValue)>,
}

impl CorsMiddleware {
    pub fn new(allowed_origins: &[String]) -> Self {
        let allow_any_origin = allowed_origins.iter().any(|origin| origin == "*");

        let allowed_origin_headers = allowed_origins
            .iter()
            .filter(|origin| *origin != "*")
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(hv) => Some((origin.clone(), hv)),
                Err(_) => {
                    log::warn!("Ignoring CORS origin that isn't a valid header value: {origin}");
                    None
                }
            })
            .collect();

        Self {
            allow_any_origin,
            allowed_origin_headers,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for CorsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = CorsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CorsMiddlewareService {
            service,
            allow_any_origin: self.allow_any_origin,
            allowed_origin_headers: self.allowed_origin_headers.clone(),
        }))
    }
}

pub struct CorsMiddlewareService<S> {
    service: S,
    allow_any_origin: bool,
    allowed_origin_headers: Vec<(String, HeaderValue)>,
}

impl<S> CorsMiddlewareService<S> {
    /// Value for `Access-Control-Allow-Origin`, or `None` if the origin isn't allowed.
    fn allow_origin_header(&self, origin: &str) -> Option<HeaderValue> {
        if self.allow_any_origin {
            return Some(HeaderValue::from_static("*"));
        }

        self.allowed_origin_headers
            .iter()
            .find(|(allowed, _)| allowed == origin)
            .map(|(_, hv)| hv.clone())
    }
}

impl<S, B> Service<ServiceRequest> for CorsMiddlewareService<S>
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
        let origin = req
            .headers()
            .get(header::ORIGIN)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string());

        let Some(origin) = origin else {
            let req_fut = self.service.call(req);
            return Box::pin(async move { Ok(req_fut.await?.map_into_boxed_body()) });
        };

        let allow_origin = self.allow_origin_header(&origin);
        let vary_on_origin = !self.allow_any_origin;

        let is_preflight = req.method() == Method::OPTIONS
            && req
                .headers()
                .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);

        if is_preflight {
            let requested_headers = req
                .headers()
                .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
                .cloned();

            let (req_parts, _) = req.into_parts();
            let mut res = HttpResponse::NoContent();

            if let Some(origin_header) = allow_origin {
                res.insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, origin_header));
                res.insert_header((
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static(ALLOWED_METHODS),
                ));
                if let Some(requested_headers) = requested_headers {
                    res.insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, requested_headers));
                }
                res.insert_header((
                    header::ACCESS_CONTROL_MAX_AGE,
                    HeaderValue::from_static(PREFLIGHT_MAX_AGE_SECS),
                ));
            }

            if vary_on_origin {
                res.insert_header((header::VARY, HeaderValue::from_static("Origin")));
            }

            let res = ServiceResponse::new(req_parts, res.finish());
            return Box::pin(async move { Ok(res) });
        }

        let req_fut = self.service.call(req);

        Box::pin(async move {
            let mut res = req_fut.await?.map_into_boxed_body();

            if let Some(origin_header) = allow_origin {
                res.headers_mut()
                    .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin_header);
            }

            if vary_on_origin {
                res.headers_mut()
                    .append(header::VARY, HeaderValue::from_static("Origin"));
            }

            Ok(res)
        })
    }
}
