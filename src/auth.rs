use std::time::Duration;

use log::{debug, info};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use crate::api::{check_status, excerpt, from_value, parse};
use crate::error::{ApiError, Result};
use crate::models::{Session, User};

/// Password auth against a GoTrue-compatible provider (Supabase auth).
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: Client,
    base: Url,
    anon_key: String,
}

/// What a successful sign-in or sign-up produced. Sign-up yields no session
/// while the provider waits for the email to be confirmed.
#[derive(Debug, Clone)]
pub enum SignedIn {
    Session(Session),
    PendingConfirmation(User),
}

#[derive(Deserialize)]
struct ProviderUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<ProviderMetadata>,
}

#[derive(Deserialize, Default)]
struct ProviderMetadata {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

impl From<ProviderUser> for User {
    fn from(p: ProviderUser) -> Self {
        let meta = p.user_metadata.unwrap_or_default();
        User {
            id: p.id,
            email: p.email,
            display_name: meta.display_name,
            avatar_url: meta.avatar_url,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: ProviderUser,
}

impl AuthClient {
    pub fn new(base: Url, anon_key: String, timeout: Duration) -> Result<Self> {
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base.to_string()));
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(AuthClient { http, base, anon_key })
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<SignedIn> {
        let req = self.request(Method::POST, "signup")?.json(&json!({
            "email": email,
            "password": password,
            "data": { "display_name": display_name },
        }));
        let value = self.send(req).await?;

        if value.get("access_token").and_then(Value::as_str).is_some() {
            let token: TokenResponse = from_value(value)?;
            info!("Signed up and signed in as {}", token.user.id);
            return Ok(SignedIn::Session(session_from(token)));
        }
        // Without a session the provider answers with the bare user, or wraps it.
        let user = value.get("user").cloned().unwrap_or(value);
        let user: ProviderUser = from_value(user)?;
        info!("Signed up {}, confirmation pending", user.id);
        Ok(SignedIn::PendingConfirmation(user.into()))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let req = self
            .request(Method::POST, "token")?
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));
        let token: TokenResponse = from_value(self.send(req).await?)?;
        info!("Signed in as {}", token.user.id);
        Ok(session_from(token))
    }

    pub async fn sign_out(&self, access_token: &str) -> Result<()> {
        let req = self.request(Method::POST, "logout")?.bearer_auth(access_token);
        self.send(req).await?;
        Ok(())
    }

    pub async fn current_user(&self, access_token: &str) -> Result<User> {
        let req = self.request(Method::GET, "user")?.bearer_auth(access_token);
        let user: ProviderUser = from_value(self.send(req).await?)?;
        Ok(user.into())
    }

    fn request(&self, method: Method, action: &str) -> Result<RequestBuilder> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(["auth", "v1", action]);
        debug!("{method} {url}");
        Ok(self.http.request(method, url).header("apikey", &self.anon_key))
    }

    async fn send(&self, req: RequestBuilder) -> Result<Value> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if is_rejection(status) {
            return Err(ApiError::Auth(provider_message(&body)));
        }
        check_status(status, &body)?;
        if body.is_empty() {
            return Ok(Value::Null);
        }
        parse(&body)
    }
}

fn session_from(token: TokenResponse) -> Session {
    Session {
        access_token: token.access_token,
        user: token.user.into(),
    }
}

fn is_rejection(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST
            | StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN
            | StatusCode::UNPROCESSABLE_ENTITY
    )
}

fn provider_message(body: &[u8]) -> String {
    let from_json = serde_json::from_slice::<Value>(body).ok().and_then(|v| {
        ["error_description", "msg", "message", "error"]
            .into_iter()
            .find_map(|key| v.get(key).and_then(Value::as_str).map(str::to_owned))
    });
    match from_json {
        Some(message) => message,
        None => excerpt(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve;
    use axum::{
        Json, Router,
        extract::Query,
        http::{HeaderMap, StatusCode as HttpStatus},
        routing::{get, post},
    };
    use std::collections::HashMap;

    fn provider_user() -> Value {
        json!({
            "id": "u1",
            "email": "ada@example.com",
            "user_metadata": { "display_name": "Ada", "avatar_url": "https://img/ada.png" }
        })
    }

    async fn client_for(router: Router) -> AuthClient {
        let base = serve(router).await;
        AuthClient::new(base, "anon".into(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn sign_in_uses_password_grant_and_maps_metadata() {
        let router = Router::new().route(
            "/auth/v1/token",
            post(
                |headers: HeaderMap,
                 Query(q): Query<HashMap<String, String>>,
                 Json(body): Json<Value>| async move {
                    assert_eq!(q.get("grant_type").map(String::as_str), Some("password"));
                    assert_eq!(headers.get("apikey").unwrap(), "anon");
                    assert_eq!(body["email"], "ada@example.com");
                    Json(json!({
                        "access_token": "jwt",
                        "token_type": "bearer",
                        "expires_in": 3600,
                        "refresh_token": "r",
                        "user": provider_user()
                    }))
                },
            ),
        );
        let client = client_for(router).await;

        let session = client.sign_in("ada@example.com", "pw").await.unwrap();
        assert_eq!(session.access_token, "jwt");
        assert_eq!(session.user.id, "u1");
        assert_eq!(session.user.display_name.as_deref(), Some("Ada"));
        assert_eq!(session.user.avatar_url.as_deref(), Some("https://img/ada.png"));
    }

    #[tokio::test]
    async fn rejected_credentials_are_auth_errors_with_provider_message() {
        let router = Router::new().route(
            "/auth/v1/token",
            post(|| async {
                (
                    HttpStatus::BAD_REQUEST,
                    Json(json!({
                        "error": "invalid_grant",
                        "error_description": "Invalid login credentials"
                    })),
                )
            }),
        );
        let client = client_for(router).await;

        match client.sign_in("ada@example.com", "bad").await {
            Err(ApiError::Auth(msg)) => assert_eq!(msg, "Invalid login credentials"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn sign_up_with_and_without_session() {
        let router = Router::new().route(
            "/auth/v1/signup",
            post(|Json(body): Json<Value>| async move {
                if body["data"]["display_name"] == "Ada" {
                    Json(json!({ "access_token": "jwt", "user": provider_user() }))
                } else if body["email"] == "cy@example.com" {
                    Json(json!({ "access_token": null, "user": { "id": "u3" } }))
                } else {
                    Json(json!({ "id": "u2", "email": "bob@example.com" }))
                }
            }),
        );
        let client = client_for(router).await;

        match client.sign_up("ada@example.com", "pw", Some("Ada")).await.unwrap() {
            SignedIn::Session(s) => assert_eq!(s.user.id, "u1"),
            other => panic!("unexpected {other:?}"),
        }
        match client.sign_up("bob@example.com", "pw", None).await.unwrap() {
            SignedIn::PendingConfirmation(u) => {
                assert_eq!(u.id, "u2");
                assert_eq!(u.display_name, None);
            }
            other => panic!("unexpected {other:?}"),
        }
        match client.sign_up("cy@example.com", "pw", None).await.unwrap() {
            SignedIn::PendingConfirmation(u) => assert_eq!(u.id, "u3"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn sign_out_and_current_user_send_bearer() {
        let router = Router::new()
            .route(
                "/auth/v1/logout",
                post(|headers: HeaderMap| async move {
                    assert_eq!(headers.get("authorization").unwrap(), "Bearer jwt");
                    HttpStatus::NO_CONTENT
                }),
            )
            .route("/auth/v1/user", get(|| async { Json(provider_user()) }));
        let client = client_for(router).await;

        client.sign_out("jwt").await.unwrap();
        assert_eq!(client.current_user("jwt").await.unwrap().email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn provider_message_falls_back_to_body() {
        assert_eq!(provider_message(br#"{"msg":"User already registered"}"#), "User already registered");
        assert_eq!(provider_message(b"nope"), "nope");
    }
}
