use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequest, RequestParts},
    http::header::AUTHORIZATION,
};

use crate::auth::{bearer_token, DynIdentityProvider, User};
use crate::error::Error;

// Browsers cannot set headers on a websocket handshake.
const TOKEN_QUERY_PARAM: &str = "access_token";

fn query_token(query: &str) -> Option<&str> {
    query.split('&').find_map(|pair| {
        pair.strip_prefix(TOKEN_QUERY_PARAM)
            .and_then(|rest| rest.strip_prefix('='))
            .filter(|token| !token.is_empty())
    })
}

/// Resolves the request's credential into the caller's `User`. Every
/// command receives the caller this way rather than from shared state.
#[async_trait]
impl<B> FromRequest<B> for User
where
    B: Send,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let Extension(identity) = Extension::<DynIdentityProvider>::from_request(req)
            .await
            .map_err(|_| {
                tracing::error!("identity provider is not configured");
                Error::unexpected_error()
            })?;

        let header_token = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token);

        let token = header_token
            .or_else(|| req.uri().query().and_then(query_token))
            .ok_or_else(Error::unauthenticated_error)?
            .to_string();

        identity.verify(&token).await
    }
}

#[test]
fn query_token_test() {
    assert_eq!(query_token("access_token=abc"), Some("abc"));
    assert_eq!(query_token("ride=1&access_token=abc"), Some("abc"));
    assert_eq!(query_token("access_token="), None);
    assert_eq!(query_token("access_tokens=abc"), None);
    assert_eq!(query_token("token=abc"), None);
}
