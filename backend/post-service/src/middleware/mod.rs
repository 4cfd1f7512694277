/// HTTP middleware for post-service
///
/// Caller identity comes from an [`IdentityProvider`]. The middleware runs it
/// on every request and stores the result in request extensions; routes that
/// need a caller take a [`UserId`] argument, which rejects anonymous requests
/// with 401. Public routes simply don't ask for one.
use crate::error::AppError;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

/// Resolves the caller of a request
pub trait IdentityProvider: Send + Sync {
    fn authenticate(&self, req: &HttpRequest) -> Option<Uuid>;
}

/// JWT claims. Tokens minted by the legacy API carry `userId` instead of `sub`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    #[serde(alias = "userId")]
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub iat: Option<usize>,
}

/// HS256 bearer-token verifier
pub struct JwtIdentity {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
}

impl JwtIdentity {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Sign a token for `user_id`, valid for `ttl_seconds`
    pub fn issue(&self, user_id: Uuid, ttl_seconds: i64) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + ttl_seconds).max(0) as usize,
            iat: Some(now as usize),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }

    pub fn verify(&self, token: &str) -> Option<Uuid> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).ok()?;
        Uuid::parse_str(&data.claims.sub).ok()
    }
}

impl IdentityProvider for JwtIdentity {
    fn authenticate(&self, req: &HttpRequest) -> Option<Uuid> {
        let token = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())?
            .strip_prefix("Bearer ")?
            .trim();
        self.verify(token)
    }
}

/// Extracted user identifier stored in request extensions after auth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

impl FromRequest for UserId {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<UserId>()
                .copied()
                .ok_or_else(|| AppError::Unauthorized("missing or invalid token".to_string()).into()),
        )
    }
}

/// Users allowed to call operator routes
#[derive(Debug, Clone, Default)]
pub struct Operators(HashSet<Uuid>);

impl Operators {
    pub fn new(ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self(ids.into_iter().collect())
    }

    pub fn require(&self, user: UserId) -> Result<(), AppError> {
        if self.0.contains(&user.0) {
            Ok(())
        } else {
            Err(AppError::Forbidden("operator access required".to_string()))
        }
    }
}

/// Actix middleware that attaches the caller's [`UserId`] when one can be resolved.
pub struct IdentityMiddleware {
    provider: Arc<dyn IdentityProvider>,
}

impl IdentityMiddleware {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }
}

impl<S, B> Transform<S, ServiceRequest> for IdentityMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = IdentityMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(IdentityMiddlewareService {
            service: Rc::new(service),
            provider: self.provider.clone(),
        }))
    }
}

pub struct IdentityMiddlewareService<S> {
    service: Rc<S>,
    provider: Arc<dyn IdentityProvider>,
}

impl<S, B> Service<ServiceRequest> for IdentityMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(user_id) = self.provider.authenticate(req.request()) {
            req.extensions_mut().insert(UserId(user_id));
        }

        let service = self.service.clone();
        Box::pin(async move { service.call(req).await })
    }
}
