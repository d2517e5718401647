//! Authentication and authorization core: credential hashing, token
//! issuance and verification, the account lockout state machine, per-request
//! identity guards, and service-identity propagation for internal calls.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod guards;
pub mod lockout;
pub mod passwords;
pub mod propagator;
pub mod responses;
pub mod routes;
pub mod store;
pub mod tokens;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use guards::{AuthenticatedUser, ClientIdentity, RequestIdentity, RequireAdmin, ServiceCaller};
pub use lockout::{Authenticator, LockoutPolicy};
pub use passwords::PasswordService;
pub use propagator::ServiceIdentityPropagator;
pub use store::CredentialStore;
pub use tokens::TokenService;

/// Managed state wiring the auth core together for one service process.
#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub password_service: Arc<PasswordService>,
    pub token_service: Arc<TokenService>,
    pub store: Arc<dyn CredentialStore>,
    pub authenticator: Arc<Authenticator>,
    pub propagator: ServiceIdentityPropagator,
}

impl AuthState {
    pub fn new(config: AuthConfig, store: Arc<dyn CredentialStore>) -> AuthResult<Self> {
        let password_service = Arc::new(PasswordService::new(config.hash_memory_kib)?);
        let token_service = Arc::new(TokenService::from_config(&config));
        let authenticator = Arc::new(Authenticator::new(
            store.clone(),
            password_service.clone(),
            LockoutPolicy::from_config(&config),
        ));
        let propagator =
            ServiceIdentityPropagator::new(token_service.clone(), config.service_name.clone());

        Ok(Self {
            config,
            password_service,
            token_service,
            store,
            authenticator,
            propagator,
        })
    }
}
