use actix_web::body::EitherBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{web, Error};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;

use crate::error::ApiError;
use crate::rate_limit::{Bucket, Decision};
use crate::routes::AppState;

/// Per-scope rate limiting keyed by `bucket:client_ip`. Does nothing when the
/// app state carries no limiter.
#[derive(Clone, Copy)]
pub struct RateLimit {
    bucket: Bucket,
}

impl RateLimit {
    pub fn new(bucket: Bucket) -> Self {
        Self { bucket }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware { service: Rc::new(service), bucket: self.bucket }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    bucket: Bucket,
}

/// The socket peer, unless forwarding headers are trusted.
fn client_key(req: &ServiceRequest, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        return req.connection_info().realip_remote_addr().unwrap_or("unknown").to_string();
    }
    req.peer_addr().map(|a| a.ip().to_string()).unwrap_or_else(|| "unknown".into())
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();
        let bucket = self.bucket;
        Box::pin(async move {
            let checked = req.app_data::<web::Data<AppState>>().and_then(|state| {
                let key = client_key(&req, state.config.trust_proxy_headers);
                state.rate_limiter.as_ref().map(|limiter| (limiter.check(bucket, &key), key))
            });

            if let Some((Decision::Limited { retry_after }, key)) = checked {
                metrics::increment_counter!("freshpick_rate_limited_total", "bucket" => bucket.name());
                log::warn!("rate limited {key} on {} bucket", bucket.name());
                // round up so clients never retry inside the window
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                let err = ApiError::TooManyRequests { retry_after_secs: secs.max(1) };
                return Ok(req.error_response(err).map_into_right_body());
            }
            svc.call(req).await.map(ServiceResponse::map_into_left_body)
        })
    }
}
