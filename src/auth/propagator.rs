//! Service-identity propagation for outbound internal calls.
//!
//! Every outbound call between services carries a freshly minted SERVICE
//! token plus the inbound request's distributed-tracing headers, copied
//! through unchanged.

use std::sync::Arc;

use rocket::Request;
use rocket::request::{FromRequest, Outcome};
use rocket_okapi::request::OpenApiFromRequest;

use crate::auth::AuthResult;
use crate::auth::tokens::TokenService;

/// Fixed allow-list of tracing correlation headers propagated verbatim.
pub const TRACING_HEADERS: [&str; 7] = [
    "X-B3-TraceId",
    "X-B3-SpanId",
    "X-B3-ParentSpanId",
    "X-B3-Sampled",
    "X-B3-Flags",
    "X-Request-Id",
    "X-Correlation-Id",
];

/// Tracing correlation headers captured from the inbound request.
///
/// The guard never fails; a request without tracing headers yields an
/// empty set.
#[derive(Debug, Clone, Default, OpenApiFromRequest)]
pub struct TracingHeaders(Vec<(&'static str, String)>);

impl TracingHeaders {
    pub fn empty() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: Vec<(&'static str, String)>) -> Self {
        Self(pairs)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(name, value)| (*name, value.as_str()))
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for TracingHeaders {
    type Error = std::convert::Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let captured = TRACING_HEADERS
            .iter()
            .filter_map(|name| {
                request
                    .headers()
                    .get_one(name)
                    .map(|value| (*name, value.to_string()))
            })
            .collect();
        Outcome::Success(TracingHeaders(captured))
    }
}

/// Attaches machine identity to outbound internal calls.
///
/// Tokens are never cached or reused: each call gets its own short-lived
/// credential, so a captured service token is only worth its lifetime.
#[derive(Clone)]
pub struct ServiceIdentityPropagator {
    token_service: Arc<TokenService>,
    service_name: String,
}

impl ServiceIdentityPropagator {
    pub fn new(token_service: Arc<TokenService>, service_name: impl Into<String>) -> Self {
        Self {
            token_service,
            service_name: service_name.into(),
        }
    }

    /// Mint a fresh SERVICE token, set the bearer header, and copy the
    /// inbound tracing headers onto the outbound request.
    pub fn authorize(
        &self,
        builder: reqwest::RequestBuilder,
        tracing: &TracingHeaders,
    ) -> AuthResult<reqwest::RequestBuilder> {
        let token = self.token_service.issue_service_token(&self.service_name)?;
        let mut builder = builder.bearer_auth(token.token);
        for (name, value) in tracing.iter() {
            builder = builder.header(name, value);
        }
        Ok(builder)
    }
}
