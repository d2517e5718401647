use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::responses::Role;
use crate::auth::{AuthConfig, AuthError, AuthResult};

/// Token kind, carried as a claim so the pipeline can discriminate by kind
/// instead of inferring it from where the token showed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenKind {
    /// Short-lived bearer token for end-user API calls.
    Access,
    /// Long-lived token, only good for minting a new access/refresh pair.
    Refresh,
    /// Very short-lived machine credential, minted fresh per internal call.
    Service,
}

/// Identity claims embedded in every issued token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Opaque account id, or the calling service's name for SERVICE tokens.
    pub sub: String,
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
    pub kind: TokenKind,
}

impl TokenClaims {
    pub fn is_access_token(&self) -> bool {
        self.kind == TokenKind::Access
    }

    pub fn is_refresh_token(&self) -> bool {
        self.kind == TokenKind::Refresh
    }

    pub fn is_service_token(&self) -> bool {
        self.kind == TokenKind::Service
    }
}

#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies the platform's signed bearer tokens.
///
/// One shared symmetric secret per deployment; a token is valid iff this
/// codec says so.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
    service_token_ttl: Duration,
}

impl TokenService {
    pub fn from_config(config: &AuthConfig) -> Self {
        let secret_bytes = config.signing_secret.as_bytes();
        let encoding_key = EncodingKey::from_secret(secret_bytes);
        let decoding_key = DecodingKey::from_secret(secret_bytes);

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.clone()]);
        // No leeway: an expired token is expired.
        validation.leeway = 0;

        Self {
            encoding_key,
            decoding_key,
            validation,
            issuer: config.issuer.clone(),
            access_token_ttl: Duration::seconds(config.access_token_ttl_secs),
            refresh_token_ttl: Duration::seconds(config.refresh_token_ttl_secs),
            service_token_ttl: Duration::seconds(config.service_token_ttl_secs),
        }
    }

    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        email: &str,
        role: Role,
    ) -> AuthResult<SignedToken> {
        self.issue(
            user_id.to_string(),
            Some(email.to_string()),
            role,
            TokenKind::Access,
            self.access_token_ttl,
        )
    }

    pub fn issue_refresh_token(
        &self,
        user_id: Uuid,
        email: &str,
        role: Role,
    ) -> AuthResult<SignedToken> {
        self.issue(
            user_id.to_string(),
            Some(email.to_string()),
            role,
            TokenKind::Refresh,
            self.refresh_token_ttl,
        )
    }

    /// Mint a machine credential for service-to-service calls.
    ///
    /// The subject is the calling service's own name and the role is the
    /// reserved SERVICE value, which is how downstream services tell a
    /// legitimate internal caller apart from an end user holding a stolen
    /// access token.
    pub fn issue_service_token(&self, service_name: &str) -> AuthResult<SignedToken> {
        self.issue(
            service_name.to_string(),
            Some(format!("{service_name}@internal")),
            Role::Service,
            TokenKind::Service,
            self.service_token_ttl,
        )
    }

    fn issue(
        &self,
        sub: String,
        email: Option<String>,
        role: Role,
        kind: TokenKind,
        ttl: Duration,
    ) -> AuthResult<SignedToken> {
        let now = Utc::now();
        let expires_at = now + ttl;

        let claims = TokenClaims {
            sub,
            iss: self.issuer.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            email,
            role,
            kind,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(SignedToken { token, expires_at })
    }

    /// Verify signature, structure, issuer, and expiry.
    ///
    /// Every failure collapses into the one `TokenInvalid` error so a
    /// caller cannot probe whether a token is expired versus forged.
    pub fn verify(&self, token: &str) -> AuthResult<TokenClaims> {
        decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                log::debug!("token rejected: {err}");
                AuthError::TokenInvalid
            })
    }
}
