#[macro_use]
extern crate rocket;

pub mod auth;
pub mod db;
pub mod request_logger;
pub mod routes;

use std::sync::{Arc, Once};

use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};

use crate::auth::store::PgCredentialStore;
use crate::auth::{AuthConfig, AuthState};
use crate::db::AccountsDb;
use crate::request_logger::RequestLogger;

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

/// Build the account/auth service Rocket instance.
///
/// The same library types back the edge gateway and every internal
/// service; this binary wires them to Postgres and mounts the first-party
/// credential endpoints.
pub fn rocket() -> Rocket<Build> {
    init_logger();

    rocket::build()
        .attach(RequestLogger)
        .attach(AccountsDb::init())
        // Run database migrations on startup
        .attach(AdHoc::try_on_ignite("Run Migrations", |rocket| async move {
            match AccountsDb::fetch(&rocket) {
                Some(database) => {
                    let pool = (**database).clone();
                    match db::run_migrations(&pool).await {
                        Ok(_) => {
                            log::info!("database migrations successful");
                            Ok(rocket)
                        }
                        Err(err) => {
                            log::error!("database migrations failed: {err}");
                            Err(rocket)
                        }
                    }
                }
                None => {
                    log::error!("database pool not available for migrations");
                    Err(rocket)
                }
            }
        }))
        // Assemble the auth core over the Postgres-backed credential store
        .attach(AdHoc::try_on_ignite("Auth State", |rocket| async move {
            let config = match AuthConfig::from_env() {
                Ok(config) => config,
                Err(err) => {
                    log::error!("auth configuration invalid: {err}");
                    return Err(rocket);
                }
            };

            let pool = match AccountsDb::fetch(&rocket) {
                Some(database) => (**database).clone(),
                None => {
                    log::error!("database pool not available for auth state");
                    return Err(rocket);
                }
            };

            let store = Arc::new(PgCredentialStore::new(pool));
            match AuthState::new(config, store) {
                Ok(state) => Ok(rocket.manage(state)),
                Err(err) => {
                    log::error!("failed to assemble auth state: {err}");
                    Err(rocket)
                }
            }
        }))
        .mount(
            "/api/v1",
            openapi_get_routes![
                routes::health::health_check,
                auth::routes::register,
                auth::routes::login,
                auth::routes::refresh,
                auth::routes::me,
                auth::routes::suspend_account,
                auth::routes::reactivate_account,
                auth::routes::account_status,
            ],
        )
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../v1/openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Account Auth API", "../../v1/openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use std::sync::Arc;

    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket};
    use rocket_okapi::openapi_get_routes;

    use crate::auth::store::MemoryCredentialStore;
    use crate::auth::{AuthConfig, AuthState, CredentialStore};
    use crate::{auth, routes};

    /// Configuration with fast hashing for tests; semantics identical to
    /// production defaults.
    pub fn test_auth_config() -> AuthConfig {
        AuthConfig {
            issuer: "ecommerce-platform-test".into(),
            signing_secret: "0123456789abcdef0123456789abcdef".into(),
            service_name: "customer-service".into(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 604_800,
            service_token_ttl_secs: 300,
            max_failed_attempts: 5,
            lock_duration_secs: 1800,
            hash_memory_kib: 8 * 1024,
        }
    }

    /// Builder for constructing Rocket instances tailored for integration
    /// tests: in-memory credential store, random port, logging disabled.
    pub struct TestRocketBuilder {
        figment: Figment,
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
    }

    impl TestRocketBuilder {
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                config: test_auth_config(),
                store: Arc::new(MemoryCredentialStore::new()),
            }
        }

        pub fn with_config(mut self, config: AuthConfig) -> Self {
            self.config = config;
            self
        }

        pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
            self.store = store;
            self
        }

        /// The auth state the instance will be managed with; lets tests
        /// issue tokens or seed accounts directly.
        pub fn auth_state(&self) -> AuthState {
            AuthState::new(self.config.clone(), self.store.clone())
                .expect("valid test auth state")
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let state = self.auth_state();
            rocket::custom(self.figment).manage(state).mount(
                "/api/v1",
                openapi_get_routes![
                    routes::health::health_check,
                    auth::routes::register,
                    auth::routes::login,
                    auth::routes::refresh,
                    auth::routes::me,
                    auth::routes::suspend_account,
                    auth::routes::reactivate_account,
                    auth::routes::account_status,
                ],
            )
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }
    }

    impl Default for TestRocketBuilder {
        fn default() -> Self {
            Self::new()
        }
    }
}
