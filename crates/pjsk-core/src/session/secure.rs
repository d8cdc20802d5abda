//! Authenticated exchange with the upstream game server.
//!
//! One transparent retry on a version-mismatch response, nothing else: all
//! other failures are surfaced to the caller untouched. The server enforces
//! a cooldown after each successful full account pull; this layer tracks it
//! and refuses to issue a second pull inside the window.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::http::REQUEST_TIMEOUT;
use crate::config::staleness::PULL_COOLDOWN;
use crate::config::{KeySet, RegionConfig};
use crate::error::{Error, Result};
use crate::region::Region;
use crate::session::crypto::PayloadCipher;

/// Status the upstream answers with when it wants a newer app version.
const VERSION_MISMATCH_STATUS: u16 = 426;

#[derive(Debug, Clone)]
pub struct ProtocolHeaders {
    pub app_version: String,
    pub session_token: Option<String>,
    pub digest: String,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// App version the upstream expects, echoed on a mismatch response.
    pub expected_version: Option<String>,
    pub session_token: Option<String>,
}

/// Outbound seam for the encrypted exchange, mockable in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(
        &self,
        path: &str,
        body: &[u8],
        headers: &ProtocolHeaders,
    ) -> Result<TransportResponse>;
}

/// reqwest-backed transport against the region's API host.
pub struct HttpTransport {
    client: Client,
    api_base: String,
}

impl HttpTransport {
    pub fn new(api_base: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, api_base })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn exchange(
        &self,
        path: &str,
        body: &[u8],
        headers: &ProtocolHeaders,
    ) -> Result<TransportResponse> {
        let url = format!("{}{}", self.api_base, path);
        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/octet-stream")
            .header("X-App-Version", &headers.app_version)
            .header("X-Data-Digest", &headers.digest)
            .body(body.to_vec());
        if let Some(token) = &headers.session_token {
            request = request.header("X-Session-Token", token);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let expected_version = response
            .headers()
            .get("X-Expected-App-Version")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let session_token = response
            .headers()
            .get("X-Session-Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        Ok(TransportResponse {
            status,
            body,
            expected_version,
            session_token,
        })
    }
}

/// One-time-use account transfer credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCredential {
    pub transfer_id: String,
    pub transfer_password: String,
}

struct SessionState {
    app_version: String,
    session_token: Option<String>,
    cooldown_until: Option<DateTime<Utc>>,
    /// User ids this session has pulled full data for; prerequisite for
    /// best-effort suite fetches.
    authorized: HashMap<u64, ()>,
}

pub struct SecureSession {
    region: Region,
    cipher: PayloadCipher,
    transport: Arc<dyn Transport>,
    state: Mutex<SessionState>,
}

impl SecureSession {
    pub fn new(
        region: Region,
        keys: &KeySet,
        app_version: String,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        Ok(Self {
            region,
            cipher: PayloadCipher::from_keys(keys)?,
            transport,
            state: Mutex::new(SessionState {
                app_version,
                session_token: None,
                cooldown_until: None,
                authorized: HashMap::new(),
            }),
        })
    }

    pub fn from_config(region: Region, config: &RegionConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config.api_base.clone())?);
        Self::new(region, &config.keys, config.app_version.clone(), transport)
    }

    /// Seconds until the next full account pull is allowed, if any.
    pub async fn time_left(&self) -> Option<i64> {
        let state = self.state.lock().await;
        state
            .cooldown_until
            .map(|until| (until - Utc::now()).num_seconds())
            .filter(|&s| s > 0)
    }

    async fn headers_for(&self, body: &[u8]) -> ProtocolHeaders {
        let state = self.state.lock().await;
        ProtocolHeaders {
            app_version: state.app_version.clone(),
            session_token: state.session_token.clone(),
            digest: PayloadCipher::digest(body),
        }
    }

    /// Encrypted request/response exchange with exactly one version retry.
    async fn exchange(&self, path: &str, payload: &Value) -> Result<TransportResponse> {
        let body = self.cipher.encrypt(payload)?;
        let headers = self.headers_for(&body).await;
        let attempted = headers.app_version.clone();

        let response = self.transport.exchange(path, &body, &headers).await?;
        if response.status != VERSION_MISMATCH_STATUS {
            self.absorb_session_token(&response).await;
            return Ok(response);
        }

        let corrected = response.expected_version.clone().ok_or_else(|| {
            Error::ProtocolVersion {
                attempted: attempted.clone(),
                retried: "<none advertised>".to_string(),
            }
        })?;
        info!(
            "{} rejected app version {}, retrying once with {}",
            self.region, attempted, corrected
        );
        {
            let mut state = self.state.lock().await;
            state.app_version = corrected.clone();
        }

        let headers = self.headers_for(&body).await;
        let response = self.transport.exchange(path, &body, &headers).await?;
        if response.status == VERSION_MISMATCH_STATUS {
            return Err(Error::ProtocolVersion {
                attempted,
                retried: corrected,
            });
        }
        self.absorb_session_token(&response).await;
        Ok(response)
    }

    async fn absorb_session_token(&self, response: &TransportResponse) {
        if let Some(token) = &response.session_token {
            let mut state = self.state.lock().await;
            state.session_token = Some(token.clone());
        }
    }

    /// Decrypted call that treats any non-2xx status as an HTTP error.
    pub async fn call(&self, path: &str, payload: &Value) -> Result<Value> {
        let response = self.exchange(path, payload).await?;
        if !(200..300).contains(&response.status) {
            return Err(Error::Http(format!(
                "{} returned HTTP {} for {}",
                self.region, response.status, path
            )));
        }
        self.cipher.decrypt(&response.body)
    }

    /// Like [`call`](Self::call) but a 404 comes back as `None` so callers
    /// can type the miss instead of parsing an HTTP error.
    pub async fn call_optional(&self, path: &str, payload: &Value) -> Result<Option<Value>> {
        let response = self.exchange(path, payload).await?;
        if response.status == 404 {
            return Ok(None);
        }
        if !(200..300).contains(&response.status) {
            return Err(Error::Http(format!(
                "{} returned HTTP {} for {}",
                self.region, response.status, path
            )));
        }
        Ok(Some(self.cipher.decrypt(&response.body)?))
    }

    /// Exchange one-time transfer credentials for a full account snapshot.
    ///
    /// With `inherit` the upstream also rotates the credentials; the old pair
    /// is dead either way, so this is never retried. Returns the decoded
    /// snapshot, the new credentials when rotated, and the raw encrypted
    /// response blob for external proxying.
    pub async fn get_user_data(
        &self,
        transfer_id: &str,
        transfer_password: &str,
        inherit: bool,
    ) -> Result<(Value, Option<TransferCredential>, Vec<u8>)> {
        if let Some(remaining) = self.time_left().await {
            return Err(Error::Cooldown { remaining });
        }

        let payload = json!({
            "transferId": transfer_id,
            "transferPassword": transfer_password,
            "inherit": inherit,
        });
        let response = self.exchange("/api/inherit", &payload).await?;
        if !(200..300).contains(&response.status) {
            return Err(Error::Http(format!(
                "{} inherit exchange returned HTTP {}",
                self.region, response.status
            )));
        }

        let data: Value = self.cipher.decrypt(&response.body)?;
        let user_id = data
            .get("userId")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::MalformedPayload("account snapshot missing userId".into()))?;

        let new_credentials = if inherit {
            let credential = data.get("credential").ok_or_else(|| {
                Error::MalformedPayload("inherit response missing rotated credential".into())
            })?;
            Some(TransferCredential {
                transfer_id: credential
                    .get("transferId")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                transfer_password: credential
                    .get("transferPassword")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
        } else {
            None
        };

        let cooldown_until = data
            .get("refreshableAt")
            .and_then(Value::as_i64)
            .map(|ms| DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now))
            .unwrap_or_else(|| {
                Utc::now() + ChronoDuration::from_std(PULL_COOLDOWN).unwrap_or_default()
            });

        {
            let mut state = self.state.lock().await;
            state.cooldown_until = Some(cooldown_until);
            state.authorized.insert(user_id, ());
        }
        debug!("{} pulled account {} (cooldown until {})", self.region, user_id, cooldown_until);

        Ok((data, new_credentials, response.body))
    }

    /// Best-effort fetch of an already-authorized account's current data.
    /// `None` means "nothing available right now" (no session, or inside the
    /// cooldown window) and is expected, not exceptional.
    pub async fn attempt_get_user_data(&self, user_id: u64) -> Result<Option<Value>> {
        {
            let state = self.state.lock().await;
            if !state.authorized.contains_key(&user_id) {
                return Ok(None);
            }
            if state
                .cooldown_until
                .map(|until| until > Utc::now())
                .unwrap_or(false)
            {
                return Ok(None);
            }
        }

        let path = format!("/api/suite/user/{}", user_id);
        match self.call(&path, &json!({})).await {
            Ok(data) => Ok(Some(data)),
            Err(Error::Http(message)) => {
                warn!("{} suite fetch for {} failed: {}", self.region, user_id, message);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Ingest an externally-proxied encrypted account update: decrypt,
    /// validate, and hand back `(user_id, snapshot)` for the profile cache.
    pub async fn save_user_data_raw(&self, bytes: &[u8]) -> Result<(u64, Value)> {
        let data: Value = self.cipher.decrypt(bytes)?;
        let user_id = data
            .get("userId")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::MalformedPayload("proxied update missing userId".into()))?;

        let mut state = self.state.lock().await;
        state.authorized.insert(user_id, ());
        Ok((user_id, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn keys() -> KeySet {
        KeySet {
            key: "30313233343536373839616263646566".to_string(), // "0123456789abcdef"
            iv: "66656463626139383736353433323130".to_string(),
        }
    }

    fn cipher() -> PayloadCipher {
        PayloadCipher::from_keys(&keys()).unwrap()
    }

    /// Transport scripted per call: list of (status, payload, expected_version).
    struct MockTransport {
        script: Vec<(u16, Value, Option<String>)>,
        calls: AtomicUsize,
        seen_versions: std::sync::Mutex<Vec<String>>,
    }

    impl MockTransport {
        fn new(script: Vec<(u16, Value, Option<String>)>) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
                seen_versions: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn exchange(
            &self,
            _path: &str,
            _body: &[u8],
            headers: &ProtocolHeaders,
        ) -> Result<TransportResponse> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_versions
                .lock()
                .unwrap()
                .push(headers.app_version.clone());
            let (status, payload, expected) =
                self.script.get(index).cloned().unwrap_or((500, json!({}), None));
            Ok(TransportResponse {
                status,
                body: cipher().encrypt(&payload).unwrap(),
                expected_version: expected,
                session_token: None,
            })
        }
    }

    fn session(transport: Arc<dyn Transport>) -> SecureSession {
        SecureSession::new(Region::Jp, &keys(), "4.0.0".to_string(), transport).unwrap()
    }

    #[tokio::test]
    async fn test_call_decrypts_response() {
        let transport = Arc::new(MockTransport::new(vec![(
            200,
            json!({"ok": true}),
            None,
        )]));
        let session = session(transport);
        let value = session.call("/api/ping", &json!({})).await.unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_version_mismatch_retries_exactly_once() {
        let transport = Arc::new(MockTransport::new(vec![
            (426, json!({}), Some("4.1.0".to_string())),
            (200, json!({"ok": true}), None),
        ]));
        let session = session(transport.clone());
        let value = session.call("/api/ping", &json!({})).await.unwrap();
        assert_eq!(value, json!({"ok": true}));
        assert_eq!(
            *transport.seen_versions.lock().unwrap(),
            vec!["4.0.0".to_string(), "4.1.0".to_string()]
        );
    }

    #[tokio::test]
    async fn test_second_mismatch_is_fatal() {
        let transport = Arc::new(MockTransport::new(vec![
            (426, json!({}), Some("4.1.0".to_string())),
            (426, json!({}), Some("4.2.0".to_string())),
        ]));
        let session = session(transport.clone());
        let err = session.call("/api/ping", &json!({})).await.unwrap_err();
        assert!(matches!(err, Error::ProtocolVersion { .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_pull_inside_cooldown_is_refused() {
        let snapshot = json!({"userId": 42, "credential": {
            "transferId": "new-id", "transferPassword": "new-pw"
        }});
        let transport = Arc::new(MockTransport::new(vec![
            (200, snapshot.clone(), None),
            (200, snapshot, None),
        ]));
        let session = session(transport.clone());

        let (data, credentials, raw) = session
            .get_user_data("old-id", "old-pw", true)
            .await
            .unwrap();
        assert_eq!(data["userId"], json!(42));
        assert_eq!(credentials.unwrap().transfer_id, "new-id");
        assert!(!raw.is_empty());

        let err = session
            .get_user_data("new-id", "new-pw", true)
            .await
            .unwrap_err();
        match err {
            Error::Cooldown { remaining } => assert!(remaining > 0 && remaining <= 300),
            other => panic!("expected cooldown, got {:?}", other),
        }
        // The refusal never reached the transport.
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_get_user_data_none_without_session() {
        let transport = Arc::new(MockTransport::new(vec![]));
        let session = session(transport);
        assert!(session.attempt_get_user_data(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_user_data_raw_roundtrip() {
        let transport = Arc::new(MockTransport::new(vec![]));
        let session = session(transport);
        let blob = cipher().encrypt(&json!({"userId": 7, "xp": 100})).unwrap();
        let (user_id, data) = session.save_user_data_raw(&blob).await.unwrap();
        assert_eq!(user_id, 7);
        assert_eq!(data["xp"], json!(100));
    }

    #[tokio::test]
    async fn test_save_user_data_raw_rejects_garbage() {
        let transport = Arc::new(MockTransport::new(vec![]));
        let session = session(transport);
        let err = session.save_user_data_raw(b"not ciphertext!").await.unwrap_err();
        assert!(matches!(err, Error::Decryption(_)));
    }
}
