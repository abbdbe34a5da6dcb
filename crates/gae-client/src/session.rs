use std::sync::Arc;

use serde_json::json;

use gae_types::{Credential, EngineConfig, GaeError, Result};

use crate::fields;
use crate::transport::{EngineRequest, EngineTransport, HttpMethod};

/// Acquires the bearer credential used for every engine call of a run.
///
/// There is no retry and no refresh: an authentication failure is fatal.
pub struct Session {
    transport: Arc<dyn EngineTransport>,
}

impl Session {
    pub fn new(transport: Arc<dyn EngineTransport>) -> Self {
        Self { transport }
    }

    pub async fn acquire(&self, endpoint: &str, username: &str, password: &str) -> Result<Credential> {
        let auth_error = |message: String| GaeError::AuthError {
            endpoint: endpoint.to_string(),
            message,
        };

        let request = EngineRequest::new(HttpMethod::Post, endpoint)
            .with_body(json!({ "username": username, "password": password }));
        let resp = self
            .transport
            .execute(request)
            .await
            .map_err(|e| auth_error(e.to_string()))?;

        if !resp.is_success() {
            return Err(auth_error(format!("HTTP {}: {}", resp.status, resp.body)));
        }

        let body: serde_json::Value = serde_json::from_str(&resp.body)
            .map_err(|e| auth_error(format!("malformed response body: {e}")))?;
        let token = fields::TOKEN
            .require_str(&body)
            .map_err(|_| auth_error("response carries no token".to_string()))?;
        if token.is_empty() {
            return Err(auth_error("response carries an empty token".to_string()));
        }

        let credential = Credential::new(token);
        tracing::info!(
            endpoint = %endpoint,
            user = %username,
            transport = self.transport.name(),
            issued_at = %credential.issued_at(),
            "Acquired engine credential"
        );
        Ok(credential)
    }

    /// Acquire using the endpoint and identity from `config`.
    pub async fn acquire_for(&self, config: &EngineConfig) -> Result<Credential> {
        self.acquire(&config.auth_url, &config.username, &config.password)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RawResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedTransport {
        response: RawResponse,
        seen: Mutex<Vec<EngineRequest>>,
    }

    impl CannedTransport {
        fn new(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                response: RawResponse::new(status, body),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl EngineTransport for CannedTransport {
        async fn execute(&self, request: EngineRequest) -> Result<RawResponse> {
            self.seen.lock().unwrap().push(request);
            Ok(self.response.clone())
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    #[tokio::test]
    async fn acquires_jwt_token() {
        let transport = CannedTransport::new(200, r#"{"jwt": "tok-1"}"#);
        let session = Session::new(transport.clone());
        let cred = session
            .acquire("http://db/_open/auth", "root", "pw")
            .await
            .unwrap();
        assert_eq!(cred.token(), "tok-1");

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, HttpMethod::Post);
        assert!(seen[0].authorization.is_none());
        let body = seen[0].body.as_ref().unwrap();
        assert_eq!(body["username"], "root");
        assert_eq!(body["password"], "pw");
    }

    #[tokio::test]
    async fn accepts_token_field_variant() {
        let session = Session::new(CannedTransport::new(200, r#"{"token": "tok-2"}"#));
        let cred = session.acquire("http://db/auth", "u", "p").await.unwrap();
        assert_eq!(cred.token(), "tok-2");
    }

    #[tokio::test]
    async fn non_2xx_is_auth_error() {
        let session = Session::new(CannedTransport::new(401, "wrong credentials"));
        let err = session.acquire("http://db/auth", "u", "p").await.unwrap_err();
        match err {
            GaeError::AuthError { message, .. } => {
                assert!(message.contains("401"));
                assert!(message.contains("wrong credentials"));
            }
            other => panic!("expected AuthError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_token_is_auth_error() {
        let session = Session::new(CannedTransport::new(200, r#"{"user": "root"}"#));
        let err = session.acquire("http://db/auth", "u", "p").await.unwrap_err();
        assert!(matches!(err, GaeError::AuthError { .. }));
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn non_json_body_is_auth_error() {
        let session = Session::new(CannedTransport::new(200, "<html>"));
        let err = session.acquire("http://db/auth", "u", "p").await.unwrap_err();
        assert!(matches!(err, GaeError::AuthError { .. }));
    }
}
