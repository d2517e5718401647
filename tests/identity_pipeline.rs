use account_auth_service::auth::responses::AuthResponse;
use account_auth_service::test_support::TestRocketBuilder;
use rocket::http::{Header, Status};
use rocket::local::blocking::Client;
use rocket::serde::json::json;
use serde_json::Value;

fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {token}"))
}

fn register_and_login(client: &Client, email: &str, password: &str) -> AuthResponse {
    let response = client
        .post("/api/v1/auth/register")
        .json(&json!({ "email": email, "password": password, "name": "Test User" }))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);

    let response = client
        .post("/api/v1/auth/login")
        .json(&json!({ "email": email, "password": password }))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    response.into_json().expect("auth response")
}

#[test]
fn service_token_establishes_a_machine_identity() {
    let builder = TestRocketBuilder::new();
    let state = builder.auth_state();
    let client = builder.blocking_client();

    let machine = state
        .token_service
        .issue_service_token("order-service")
        .expect("service token");

    let response = client
        .get("/api/v1/auth/me")
        .header(bearer(&machine.token))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);

    let identity: Value = response.into_json().expect("identity");
    assert_eq!(identity["user_id"], "order-service");
    assert_eq!(identity["email"], "order-service@internal");
    assert_eq!(identity["role"], "SERVICE");
    assert_eq!(identity["is_service_caller"], true);
}

#[test]
fn internal_status_lookup_requires_a_service_token() {
    let builder = TestRocketBuilder::new();
    let state = builder.auth_state();
    let client = builder.blocking_client();
    let tokens = register_and_login(&client, "shopper@example.com", "Sup3rSecret");
    let account_id = tokens.user.id;

    let anonymous = client
        .get(format!("/api/v1/internal/accounts/{account_id}/status"))
        .dispatch();
    assert_eq!(anonymous.status(), Status::Unauthorized);

    // An end-user access token is authenticated but not a machine caller.
    let as_customer = client
        .get(format!("/api/v1/internal/accounts/{account_id}/status"))
        .header(bearer(&tokens.access_token))
        .dispatch();
    assert_eq!(as_customer.status(), Status::Unauthorized);

    let machine = state
        .token_service
        .issue_service_token("order-service")
        .expect("service token");
    let as_service = client
        .get(format!("/api/v1/internal/accounts/{account_id}/status"))
        .header(bearer(&machine.token))
        .dispatch();
    assert_eq!(as_service.status(), Status::Ok);

    let body: Value = as_service.into_json().expect("status body");
    assert_eq!(body["status"], "ACTIVE");
    assert_eq!(body["failed_attempts"], 0);
}

#[test]
fn service_tokens_never_satisfy_the_admin_guard() {
    let builder = TestRocketBuilder::new();
    let state = builder.auth_state();
    let client = builder.blocking_client();
    let tokens = register_and_login(&client, "shopper@example.com", "Sup3rSecret");

    let machine = state
        .token_service
        .issue_service_token("order-service")
        .expect("service token");

    let response = client
        .post(format!("/api/v1/accounts/{}/suspend", tokens.user.id))
        .header(bearer(&machine.token))
        .dispatch();
    assert_eq!(response.status(), Status::Forbidden);
}

#[test]
fn tampered_access_token_is_anonymous_and_rejected_by_hard_guards() {
    let client = TestRocketBuilder::new().blocking_client();
    let tokens = register_and_login(&client, "shopper@example.com", "Sup3rSecret");

    let mut tampered = tokens.access_token.clone();
    tampered.pop();

    let response = client
        .get("/api/v1/auth/me")
        .header(bearer(&tampered))
        .dispatch();
    assert_eq!(response.status(), Status::Unauthorized);

    // The same tampered token leaves public routes reachable.
    let response = client
        .get("/api/v1/health")
        .header(bearer(&tampered))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
}

#[test]
fn malformed_authorization_schemes_resolve_to_anonymous() {
    let client = TestRocketBuilder::new().blocking_client();
    let tokens = register_and_login(&client, "shopper@example.com", "Sup3rSecret");

    for header in [
        format!("Basic {}", tokens.access_token),
        "Bearer".to_string(),
        "Bearer ".to_string(),
        tokens.access_token.clone(),
    ] {
        let response = client
            .get("/api/v1/auth/me")
            .header(Header::new("Authorization", header.clone()))
            .dispatch();
        assert_eq!(
            response.status(),
            Status::Unauthorized,
            "scheme {header:?} must not authenticate"
        );
    }
}
