//! Access-token middleware.
//!
//! Validates the `Authorization: Bearer` header on every request in the scope it wraps and
//! stores the decoded [`JwtClaims`] in the request extensions, where the `JwtClaims` extractor
//! and the ACL middleware pick them up. Requests without a valid token are rejected before they
//! reach a handler.
use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error,
    HttpMessage,
};
use futures::future::LocalBoxFuture;
use log::trace;

use crate::{
    auth::JwtVerifier,
    errors::{AuthError, ServerError},
};

pub struct JwtMiddlewareFactory {
    verifier: JwtVerifier,
}

impl JwtMiddlewareFactory {
    pub fn new(verifier: JwtVerifier) -> Self {
        Self { verifier }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = JwtMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtMiddlewareService { verifier: self.verifier.clone(), service: Rc::new(service) }))
    }
}

pub struct JwtMiddlewareService<S> {
    verifier: JwtVerifier,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let verifier = self.verifier.clone();
        Box::pin(async move {
            let token = req
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .ok_or_else(|| {
                    Error::from(ServerError::AuthenticationError(AuthError::ValidationError(
                        "No access token presented".to_string(),
                    )))
                })?;
            let claims = verifier
                .verify_claims(token)
                .map_err(|e| Error::from(ServerError::AuthenticationError(e)))?;
            trace!("💻️ Request authenticated for user {}", claims.user_id);
            req.extensions_mut().insert(claims);
            service.call(req).await
        })
    }
}
