//! Connection lifecycle and state machine
//!
//! Owns candidate-URL probing, version negotiation, credential-based
//! re-authentication, and device registration. Connection state is
//! published through a watch channel; the live [`Session`] is handed to
//! consumers through the [`ApiProvider`] seam.

use crate::api::{ApiProvider, CatalogApi};
use crate::client::ApiClient;
use crate::models::DeviceRegistration;
use crate::session::Session;
use crate::RemoteError;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;

/// Servers below this version have no device API
const MIN_DEVICE_API_VERSION: &str = "4.7.0";

const BASE_LOGIN_SCOPE: &str = "me.read me.write platforms.read roms.read assets.read \
     assets.write roms.user.read roms.user.write collections.read collections.write \
     firmware.read";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected { version: String },
    Failed { reason: String },
}

/// Credentials and device identity persisted between runs
#[derive(Debug, Clone, Default)]
pub struct SavedConnection {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub username: Option<String>,
    pub device_id: Option<String>,
    pub device_client_version: Option<String>,
}

/// Durable storage for connection credentials
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> SavedConnection;
    fn save_server(&self, base_url: &str, token: Option<&str>);
    fn save_login(&self, base_url: &str, token: &str, username: &str);
    fn save_device(&self, device_id: &str, client_version: &str);
}

/// In-memory credential store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    inner: Mutex<SavedConnection>,
}

impl CredentialStore for MemoryCredentials {
    fn load(&self) -> SavedConnection {
        self.inner.lock().expect("credentials mutex poisoned").clone()
    }

    fn save_server(&self, base_url: &str, token: Option<&str>) {
        let mut saved = self.inner.lock().expect("credentials mutex poisoned");
        saved.base_url = Some(base_url.to_string());
        saved.token = token.map(str::to_string);
    }

    fn save_login(&self, base_url: &str, token: &str, username: &str) {
        let mut saved = self.inner.lock().expect("credentials mutex poisoned");
        saved.base_url = Some(base_url.to_string());
        saved.token = Some(token.to_string());
        saved.username = Some(username.to_string());
    }

    fn save_device(&self, device_id: &str, client_version: &str) {
        let mut saved = self.inner.lock().expect("credentials mutex poisoned");
        saved.device_id = Some(device_id.to_string());
        saved.device_client_version = Some(client_version.to_string());
    }
}

/// Identity reported when registering this client as a device
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub client_version: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            name: "Romdeck".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

pub struct ConnectionManager {
    creds: Arc<dyn CredentialStore>,
    device: DeviceInfo,
    session: RwLock<Option<Arc<Session>>>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(creds: Arc<dyn CredentialStore>, device: DeviceInfo) -> Self {
        Self {
            creds,
            device,
            session: RwLock::new(None),
            state_tx: watch::Sender::new(ConnectionState::Disconnected),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// Observe connection state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.read().expect("session lock poisoned").clone()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state(), ConnectionState::Connected { .. })
    }

    pub fn connected_version(&self) -> Option<String> {
        match self.state() {
            ConnectionState::Connected { version } => Some(version),
            _ => None,
        }
    }

    pub fn is_version_at_least(&self, min_version: &str) -> bool {
        self.session()
            .map(|s| s.is_version_at_least(min_version))
            .unwrap_or(false)
    }

    pub fn device_id(&self) -> Option<String> {
        self.creds.load().device_id
    }

    /// Re-establish a connection from stored credentials, if any
    pub async fn initialize(&self) {
        let saved = self.creds.load();
        let Some(base_url) = saved.base_url.filter(|url| !url.trim().is_empty()) else {
            return;
        };
        tracing::info!("initialize: reconnecting to stored server");
        if let Err(err) = self.connect(&base_url, saved.token.as_deref()).await {
            tracing::info!("initialize: reconnect failed: {err}");
        }
    }

    /// Probe candidate URLs and establish a session at the first one whose
    /// heartbeat succeeds. Returns the normalized base URL.
    pub async fn connect(&self, url: &str, token: Option<&str>) -> Result<String, RemoteError> {
        self.set_state(ConnectionState::Connecting);

        let mut last_error: Option<String> = None;

        for candidate in candidate_urls(url) {
            let normalized = format!("{}/", candidate.trim_end_matches('/'));
            let api = match ApiClient::new(&normalized, token) {
                Ok(api) => api,
                Err(err) => {
                    last_error = Some(err.to_string());
                    continue;
                }
            };

            match api.heartbeat().await {
                Ok(heartbeat) => {
                    let version = heartbeat.version().unwrap_or("unknown").to_string();
                    let session = Arc::new(Session::new(
                        normalized.clone(),
                        version.clone(),
                        api,
                    ));
                    *self.session.write().expect("session lock poisoned") = Some(session);
                    self.creds.save_server(&normalized, token);
                    self.set_state(ConnectionState::Connected {
                        version: version.clone(),
                    });
                    tracing::info!("connect: success at {normalized}, version={version}");

                    if token.is_some() && self.is_version_at_least(MIN_DEVICE_API_VERSION) {
                        self.register_device_if_needed().await;
                    }
                    return Ok(normalized);
                }
                Err(err) => {
                    tracing::info!("connect: heartbeat failed at {normalized}: {err}");
                    last_error = Some(err.to_string());
                }
            }
        }

        let reason = last_error.unwrap_or_else(|| "Connection failed".to_string());
        self.set_state(ConnectionState::Failed {
            reason: reason.clone(),
        });
        Err(RemoteError::Connection(reason))
    }

    /// Exchange credentials for a bearer token and rebuild the session
    /// with it. Requires an established connection.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, RemoteError> {
        let session = self.session().ok_or(RemoteError::NotConnected)?;

        let scope = login_scope(session.is_version_at_least(MIN_DEVICE_API_VERSION));
        let response = session.client().login(username, password, &scope).await?;
        let token = response.access_token;

        let api = ApiClient::new(session.base_url(), Some(&token))?;
        let authed = Arc::new(Session::new(
            session.base_url().to_string(),
            session.version().to_string(),
            api,
        ));
        *self.session.write().expect("session lock poisoned") = Some(authed);
        self.creds.save_login(session.base_url(), &token, username);

        if self.is_version_at_least(MIN_DEVICE_API_VERSION) {
            self.register_device_if_needed().await;
        }

        Ok(token)
    }

    /// Drop all connection state without touching the network
    pub fn disconnect(&self) {
        *self.session.write().expect("session lock poisoned") = None;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Re-verify the current connection, reinitializing from stored
    /// credentials with linear backoff when the heartbeat fails.
    pub async fn check_connection(&self, retry_count: u32) {
        let Some(session) = self.session() else {
            tracing::info!("check_connection: no session, initializing");
            self.initialize().await;
            return;
        };

        match session.client().heartbeat().await {
            Ok(heartbeat) => {
                let version = heartbeat.version().unwrap_or("unknown").to_string();
                self.set_state(ConnectionState::Connected { version });
            }
            Err(err) => {
                tracing::info!("check_connection: heartbeat failed: {err}");
                self.set_state(ConnectionState::Disconnected);
                *self.session.write().expect("session lock poisoned") = None;

                for attempt in 0..retry_count {
                    tokio::time::sleep(Duration::from_secs(u64::from(attempt) + 1)).await;
                    self.initialize().await;
                    if self.is_connected() {
                        return;
                    }
                }
                self.initialize().await;
            }
        }
    }

    /// Idempotent device registration: a device registered under the same
    /// client version is reused; otherwise try update-by-id and fall back
    /// to a fresh registration. Failures are logged, never fatal.
    async fn register_device_if_needed(&self) {
        let Some(session) = self.session() else {
            return;
        };

        let saved = self.creds.load();
        if let Some(existing) = &saved.device_id
            && saved.device_client_version.as_deref() == Some(self.device.client_version.as_str())
        {
            tracing::info!("Device already registered: {existing}");
            return;
        }

        let registration = DeviceRegistration {
            name: self.device.name.clone(),
            client_version: self.device.client_version.clone(),
        };

        if let Some(existing) = &saved.device_id {
            match session.client().update_device(existing, &registration).await {
                Ok(device) => {
                    if let Some(id) = device.any_id() {
                        self.creds.save_device(id, &self.device.client_version);
                        tracing::info!("Device updated: {id}");
                        return;
                    }
                }
                Err(err) => tracing::info!("Device update failed: {err}"),
            }
        }

        match session.client().register_device(&registration).await {
            Ok(device) => {
                if let Some(id) = device.any_id() {
                    self.creds.save_device(id, &self.device.client_version);
                    tracing::info!("Device registered: {id}");
                }
            }
            Err(err) => tracing::error!("Device registration failed: {err}"),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }
}

impl ApiProvider for ConnectionManager {
    fn api(&self) -> Option<Arc<dyn CatalogApi>> {
        self.session().map(|s| s as Arc<dyn CatalogApi>)
    }
}

/// Candidate URLs to probe for a user-entered address: an explicit scheme
/// is kept as-is; IP literals and localhost try plain http first.
fn candidate_urls(url: &str) -> Vec<String> {
    let trimmed = url.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return vec![trimmed.to_string()];
    }

    let host_part = trimmed.trim_start_matches("//");
    let host = host_part
        .split('/')
        .next()
        .unwrap_or("")
        .split(':')
        .next()
        .unwrap_or("");
    let prefer_http = host == "localhost" || host.parse::<std::net::Ipv4Addr>().is_ok();

    if prefer_http {
        vec![format!("http://{host_part}"), format!("https://{host_part}")]
    } else {
        vec![format!("https://{host_part}"), format!("http://{host_part}")]
    }
}

fn login_scope(device_api: bool) -> String {
    if device_api {
        format!("{BASE_LOGIN_SCOPE} devices.read devices.write")
    } else {
        BASE_LOGIN_SCOPE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_urls_keep_explicit_scheme() {
        assert_eq!(
            candidate_urls("https://romm.example.com"),
            vec!["https://romm.example.com"]
        );
        assert_eq!(
            candidate_urls("http://192.168.1.4:8080"),
            vec!["http://192.168.1.4:8080"]
        );
    }

    #[test]
    fn test_candidate_urls_ip_prefers_http() {
        assert_eq!(
            candidate_urls("192.168.1.4:8080"),
            vec!["http://192.168.1.4:8080", "https://192.168.1.4:8080"]
        );
        assert_eq!(
            candidate_urls("localhost:8080"),
            vec!["http://localhost:8080", "https://localhost:8080"]
        );
    }

    #[test]
    fn test_candidate_urls_hostname_prefers_https() {
        assert_eq!(
            candidate_urls("romm.example.com"),
            vec!["https://romm.example.com", "http://romm.example.com"]
        );
    }

    #[test]
    fn test_login_scope_widening() {
        assert!(!login_scope(false).contains("devices.read"));
        let widened = login_scope(true);
        assert!(widened.contains("devices.read devices.write"));
        assert!(widened.contains("collections.write"));
    }

    #[test]
    fn test_state_machine_disconnect() {
        let manager = ConnectionManager::new(
            Arc::new(MemoryCredentials::default()),
            DeviceInfo::default(),
        );
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.session().is_none());

        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_connect_unreachable_sets_failed() {
        let manager = ConnectionManager::new(
            Arc::new(MemoryCredentials::default()),
            DeviceInfo::default(),
        );
        // Port 1 on loopback refuses immediately
        let result = manager.connect("http://127.0.0.1:1/", None).await;
        assert!(result.is_err());
        assert!(matches!(manager.state(), ConnectionState::Failed { .. }));
    }
}
