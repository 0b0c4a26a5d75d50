use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::User;
use crate::error::Error;

/// Resolves a bearer credential to the user it was issued to.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> Result<User, Error>;
}

pub type DynIdentityProvider = Arc<dyn IdentityProvider>;

/// Extracts the credential from an `Authorization` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();

    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[derive(Clone, Debug, Deserialize)]
struct TokenInfo {
    #[serde(alias = "uid", alias = "user_id")]
    sub: String,
    name: Option<String>,
    email: Option<String>,
    picture: Option<String>,
}

impl From<TokenInfo> for User {
    fn from(info: TokenInfo) -> Self {
        let mut user = User::from_subject(&info.sub);
        user.name = info.name;
        user.email = info.email;
        user.picture = info.picture;
        user
    }
}

/// Verifies tokens against the identity provider's token-info endpoint.
#[derive(Clone, Debug)]
pub struct RemoteIdentityProvider {
    client: reqwest::Client,
    verify_url: String,
}

impl RemoteIdentityProvider {
    pub fn new(verify_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            verify_url: verify_url.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for RemoteIdentityProvider {
    #[tracing::instrument(skip_all)]
    async fn verify(&self, token: &str) -> Result<User, Error> {
        let res = self
            .client
            .get(&self.verify_url)
            .bearer_auth(token)
            .send()
            .await?;

        match res.status() {
            status if status.is_success() => {
                let info: TokenInfo = res.json().await?;
                Ok(info.into())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST => {
                tracing::info!("identity provider rejected token");
                Err(Error::unauthenticated_error())
            }
            status => {
                tracing::warn!(%status, "identity provider failure");
                Err(Error::upstream_error())
            }
        }
    }
}

/// Fixed token table, for development and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, User>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, token: impl Into<String>, user: User) -> Self {
        self.tokens.insert(token.into(), user);
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn verify(&self, token: &str) -> Result<User, Error> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(Error::unauthenticated_error)
    }
}

#[test]
fn bearer_token_test() {
    assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
    assert_eq!(bearer_token("bearer  abc "), Some("abc"));
    assert_eq!(bearer_token("Basic abc"), None);
    assert_eq!(bearer_token("Bearer "), None);
    assert_eq!(bearer_token("abc"), None);
}

#[test]
fn token_info_aliases_test() {
    let info: TokenInfo =
        serde_json::from_str(r#"{"uid": "u-1", "email": "a@example.com"}"#).unwrap();
    let user: User = info.into();

    assert_eq!(user.id, User::from_subject("u-1").id);
    assert_eq!(user.email.as_deref(), Some("a@example.com"));
    assert!(user.name.is_none());
}

#[test]
fn static_provider_test() {
    use tokio_test::block_on;
    use uuid::Uuid;

    let user = User::new(Uuid::new_v4());
    let provider = StaticIdentityProvider::new().with_user("t-1", user.clone());

    assert_eq!(block_on(provider.verify("t-1")).unwrap().id, user.id);

    let err = block_on(provider.verify("t-2")).unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::Unauthenticated);
}
