use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use http::StatusCode;
use jsonwebtoken::{EncodingKey, Header};
use keygate::client::{AuthOrchestrator, AuthStatus};
use keygate::common::{HttpClient, MemorySessionStore, SessionStore};
use keygate::oauth::store::{STATE_KEY, TOKEN_KEY};
use keygate::oauth::{
    AccessToken, BearerHandling, CallbackRequest, FlowOutcome, OAuthError, ProviderConfig,
};
use serde_json::{Value, json};
use smol_str::SmolStr;
use url::Url;

#[derive(Clone, Default)]
struct MockClient {
    queue: Arc<tokio::sync::Mutex<VecDeque<http::Response<Vec<u8>>>>>,
    requests: Arc<tokio::sync::Mutex<Vec<http::Request<Vec<u8>>>>>,
}

impl MockClient {
    async fn push(&self, status: StatusCode, body: Value) {
        self.queue.lock().await.push_back(
            http::Response::builder()
                .status(status)
                .body(serde_json::to_vec(&body).unwrap())
                .unwrap(),
        );
    }

    async fn sent(&self) -> usize {
        self.requests.lock().await.len()
    }

    async fn path(&self, index: usize) -> String {
        self.requests.lock().await[index].uri().path().to_owned()
    }

    async fn grant_type(&self, index: usize) -> String {
        let form: Vec<(String, String)> =
            serde_html_form::from_bytes(self.requests.lock().await[index].body()).unwrap();
        form.into_iter()
            .find(|(k, _)| k == "grant_type")
            .map(|(_, v)| v)
            .unwrap()
    }
}

impl HttpClient for MockClient {
    type Error = std::convert::Infallible;
    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl core::future::Future<
        Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>,
    > + Send {
        let queue = self.queue.clone();
        let requests = self.requests.clone();
        async move {
            requests.lock().await.push(request);
            Ok(queue.lock().await.pop_front().expect("no queued response"))
        }
    }
}

type Session = MemorySessionStore<SmolStr, Value>;

fn config() -> ProviderConfig {
    ProviderConfig::builder()
        .auth_server_url(Url::parse("http://localhost:8080/auth").unwrap())
        .realm("master")
        .client_id("api-server")
        .client_secret("secret")
        .redirect_uri(Url::parse("http://app/callback").unwrap())
        .post_login_redirect(Url::parse("http://app/home").unwrap())
        .build()
}

fn setup() -> (MockClient, Session, AuthOrchestrator<MockClient, Session>) {
    let client = MockClient::default();
    let session = Session::default();
    let auth = AuthOrchestrator::new(client.clone(), config(), session.clone()).unwrap();
    (client, session, auth)
}

fn jwt(claims: Value) -> String {
    jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(b"key")).unwrap()
}

fn token_body(access: &str) -> Value {
    json!({
        "access_token": access,
        "expires_in": 300,
        "refresh_expires_in": 1800,
        "refresh_token": format!("{access}-refresh"),
        "token_type": "bearer",
        "session_state": "abc"
    })
}

fn expired(access: &str) -> AccessToken {
    let mut token = AccessToken::new(access);
    token.refresh_token = Some(format!("{access}-refresh").into());
    token.expires_at = Some(Utc::now() - TimeDelta::seconds(10));
    token
}

fn bearer(token: &str) -> CallbackRequest {
    CallbackRequest {
        bearer: Some(token.into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn login_then_roles_and_permissions() {
    let (client, _session, auth) = setup();

    let status = auth
        .ensure_authenticated(&CallbackRequest::default())
        .await
        .unwrap();
    let AuthStatus::Flow(FlowOutcome::Redirect(url)) = status else {
        panic!("expected login redirect, got {status:?}");
    };
    let state = url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let access = jwt(json!({
        "exp": (Utc::now() + TimeDelta::seconds(300)).timestamp(),
        "realm_access": {"roles": ["admin", "uma_authorization"]},
        "resource_access": {"api-server": {"roles": ["uma_protection"]}}
    }));
    client.push(StatusCode::OK, token_body(&access)).await;
    let status = auth
        .ensure_authenticated(&CallbackRequest {
            code: Some("the-code".into()),
            state: Some(state.into()),
            bearer: None,
        })
        .await
        .unwrap();
    assert_eq!(status.token().map(AccessToken::value), Some(access.as_str()));
    assert_eq!(
        status.redirect().map(Url::as_str),
        Some("http://app/home")
    );
    assert_eq!(client.grant_type(0).await, "authorization_code");

    assert!(auth.has_role("uma_protection").await.unwrap());
    assert!(!auth.has_role("missing").await.unwrap());
    assert!(auth.has_realm_role("admin").await.unwrap());
    assert!(!auth.has_realm_role("not_existed").await.unwrap());
    assert!(auth.has_resource_role("uma_protection", None).await.unwrap());
    assert!(
        !auth
            .has_resource_role("uma_protection", Some("other-client"))
            .await
            .unwrap()
    );

    let rpt = jwt(json!({
        "authorization": {"permissions": [
            {"resource_set_id": "5", "resource_set_name": "res:campaign", "scopes": ["scopes:create", "scopes:view"]}
        ]}
    }));
    for _ in 0..3 {
        client.push(StatusCode::OK, json!({"rpt": rpt})).await;
    }
    assert!(
        auth.has_permission("res:campaign", "scopes:view")
            .await
            .unwrap()
    );
    assert!(auth.has_scope_permission("scopes:view").await.unwrap());
    assert!(!auth.has_resource_permission("res:report").await.unwrap());
    assert_eq!(client.sent().await, 4);
    assert_eq!(
        client.path(1).await,
        "/auth/realms/master/authz/entitlement/api-server"
    );
    let requests = client.requests.lock().await;
    assert_eq!(
        requests[1].headers()[http::header::AUTHORIZATION],
        format!("Bearer {access}").as_str()
    );
    drop(requests);

    // a live token short-circuits everything
    let status = auth
        .ensure_authenticated(&CallbackRequest::default())
        .await
        .unwrap();
    assert!(matches!(status, AuthStatus::Authenticated(_)));
    assert_eq!(client.sent().await, 4);
}

#[tokio::test]
async fn expired_token_is_refreshed_before_bearer() {
    let (client, _session, auth) = setup();
    auth.store().set(expired("tok-1")).await.unwrap();

    client.push(StatusCode::OK, token_body("tok-2")).await;
    let status = auth.ensure_authenticated(&bearer("inbound")).await.unwrap();

    let AuthStatus::Authenticated(token) = status else {
        panic!("expected refreshed token, got {status:?}");
    };
    assert_eq!(token.value(), "tok-2");
    assert_eq!(client.sent().await, 1);
    assert_eq!(client.grant_type(0).await, "refresh_token");
}

#[tokio::test]
async fn failed_refresh_falls_back_to_bearer_exchange() {
    let (client, session, auth) = setup();
    auth.store().set(expired("tok-1")).await.unwrap();

    client
        .push(
            StatusCode::BAD_REQUEST,
            json!({"error": "invalid_grant", "error_description": "Token is not active"}),
        )
        .await;
    client.push(StatusCode::OK, token_body("svc")).await;
    let status = auth.ensure_authenticated(&bearer("inbound")).await.unwrap();

    assert_eq!(status.token().map(AccessToken::value), Some("svc"));
    assert_eq!(client.sent().await, 2);
    assert_eq!(client.grant_type(0).await, "refresh_token");
    assert_eq!(client.grant_type(1).await, "client_credentials");
    let stored = session.get(&SmolStr::new_static(TOKEN_KEY)).await.unwrap();
    assert_eq!(stored["access_token"], "svc");
}

#[tokio::test]
async fn adopted_bearer_without_expiry_is_rechecked() {
    let client = MockClient::default();
    let mut config = config();
    config.bearer_handling = BearerHandling::Adopt;
    let auth = AuthOrchestrator::new(client.clone(), config, Session::default()).unwrap();

    for _ in 0..2 {
        client.push(StatusCode::OK, json!({"sub": "u-1"})).await;
        let status = auth.ensure_authenticated(&bearer("opaque")).await.unwrap();
        assert_eq!(status.token().map(AccessToken::value), Some("opaque"));
    }
    // no refresh token, so the second pass validates the bearer again
    assert_eq!(client.sent().await, 2);
    assert_eq!(
        client.path(1).await,
        "/auth/realms/master/protocol/openid-connect/userinfo"
    );
}

#[tokio::test]
async fn failed_bearer_exchange_falls_back_to_login() {
    let (client, session, auth) = setup();

    client
        .push(
            StatusCode::UNAUTHORIZED,
            json!({"error": "unauthorized_client"}),
        )
        .await;
    let status = auth.ensure_authenticated(&bearer("inbound")).await.unwrap();

    assert!(matches!(status, AuthStatus::Flow(FlowOutcome::Redirect(_))));
    assert_eq!(client.sent().await, 1);
    assert!(session.get(&SmolStr::new_static(STATE_KEY)).await.is_some());
    assert!(session.get(&SmolStr::new_static(TOKEN_KEY)).await.is_none());
}

#[tokio::test]
async fn code_callback_is_state_checked_even_with_bearer() {
    let (client, session, auth) = setup();

    let status = auth
        .ensure_authenticated(&CallbackRequest {
            code: Some("forged".into()),
            state: Some("guess".into()),
            bearer: Some("inbound".into()),
        })
        .await
        .unwrap();

    let AuthStatus::Flow(FlowOutcome::Failed { failure, redirect }) = status else {
        panic!("expected state failure, got {status:?}");
    };
    assert_eq!(failure.code, 500);
    assert!(redirect.as_str().contains("state="));
    assert_eq!(client.sent().await, 0);
    assert!(session.get(&SmolStr::new_static(TOKEN_KEY)).await.is_none());
}

#[tokio::test]
async fn no_token_answers_no() {
    let (client, _session, auth) = setup();

    assert!(!auth.has_role("admin").await.unwrap());
    assert!(!auth.has_realm_role("admin").await.unwrap());
    assert!(!auth.has_resource_role("admin", None).await.unwrap());
    assert!(!auth.has_permission("res:campaign", "scopes:view").await.unwrap());
    assert!(!auth.has_resource_permission("res:campaign").await.unwrap());
    assert!(!auth.has_scope_permission("scopes:view").await.unwrap());
    assert!(auth.load_permissions().await.unwrap().is_empty());
    assert!(auth.current_identity().await.unwrap().is_none());
    assert_eq!(client.sent().await, 0);
}

#[tokio::test]
async fn identity_is_fetched_once_per_token() {
    let (client, _session, auth) = setup();
    auth.store().set(AccessToken::new("tok-1")).await.unwrap();

    client
        .push(
            StatusCode::OK,
            json!({"sub": "u-1", "preferred_username": "alice", "email": "alice@example.com"}),
        )
        .await;
    let first = auth.current_identity().await.unwrap().unwrap();
    let again = auth.current_identity().await.unwrap().unwrap();
    assert_eq!(first, again);
    assert_eq!(first.username(), Some("alice"));
    assert_eq!(client.sent().await, 1);
    assert_eq!(
        client.path(0).await,
        "/auth/realms/master/protocol/openid-connect/userinfo"
    );

    auth.store().set(AccessToken::new("tok-2")).await.unwrap();
    client
        .push(StatusCode::OK, json!({"sub": "u-1", "preferred_username": "alice2"}))
        .await;
    let renewed = auth.current_identity().await.unwrap().unwrap();
    assert_eq!(renewed.username(), Some("alice2"));
    assert_eq!(client.sent().await, 2);
}

#[tokio::test]
async fn rejected_identity_logs_out() {
    let (client, session, auth) = setup();
    auth.store().set(AccessToken::new("tok-1")).await.unwrap();

    client
        .push(
            StatusCode::UNAUTHORIZED,
            json!({"error": "invalid_token", "error_description": "Token verification failed"}),
        )
        .await;
    let err = auth.current_identity().await.unwrap_err();
    assert!(matches!(err, OAuthError::Request(_)));
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert!(auth.token().await.is_none());
    assert!(session.is_empty().await);
}

#[tokio::test]
async fn logout_forgets_everything() {
    let (_client, session, auth) = setup();
    auth.store().set(AccessToken::new("tok-1")).await.unwrap();
    auth.login_url().await.unwrap();
    assert_eq!(session.len().await, 2);

    auth.logout().await.unwrap();
    assert!(session.is_empty().await);
    assert!(auth.token().await.is_none());
}
