//! Typed HTTP operations against the remote library server

use crate::models::{
    CollectionCreate, DeviceRegistration, HeartbeatResponse, RemoteCollection, RemoteDevice,
    RemotePlatform, RemoteRom, RemoteRomPage, RemoteUser, TokenResponse, UserPropsUpdate,
};
use crate::RemoteError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// A streamed ROM content download; `partial` is set for range responses
pub struct DownloadResponse {
    pub response: reqwest::Response,
    pub partial: bool,
}

/// Thin typed client over the server's REST endpoints.
///
/// Every method converts non-2xx statuses into [`RemoteError`] at this
/// boundary; callers never see raw transport faults.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client rooted at `base_url` (must end with a slash)
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self, RemoteError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| RemoteError::InvalidUrl("invalid token characters".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(60))
            .default_headers(headers)
            .user_agent(format!("romdeck/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn expect_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        let response = Self::check_status(response)?;
        Ok(response.json().await?)
    }

    fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        match status {
            s if s.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::Auth {
                code: status.as_u16(),
            }),
            _ => Err(RemoteError::Status {
                code: status.as_u16(),
            }),
        }
    }

    pub async fn heartbeat(&self) -> Result<HeartbeatResponse, RemoteError> {
        let response = self.http.get(self.endpoint("api/heartbeat")).send().await?;
        Self::expect_json(response).await
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
        scope: &str,
    ) -> Result<TokenResponse, RemoteError> {
        let response = self
            .http
            .post(self.endpoint("api/token"))
            .form(&[
                ("username", username),
                ("password", password),
                ("scope", scope),
            ])
            .send()
            .await?;
        Self::expect_json(response).await
    }

    pub async fn current_user(&self) -> Result<RemoteUser, RemoteError> {
        let response = self.http.get(self.endpoint("api/users/me")).send().await?;
        Self::expect_json(response).await
    }

    pub async fn refresh_ra_progression(&self, user_id: i64) -> Result<(), RemoteError> {
        let response = self
            .http
            .post(self.endpoint(&format!("api/users/{user_id}/ra/refresh")))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Self::check_status(response)?;
        Ok(())
    }

    pub async fn platforms(&self) -> Result<Vec<RemotePlatform>, RemoteError> {
        let response = self.http.get(self.endpoint("api/platforms")).send().await?;
        Self::expect_json(response).await
    }

    pub async fn platform(&self, platform_id: i64) -> Result<RemotePlatform, RemoteError> {
        let response = self
            .http
            .get(self.endpoint(&format!("api/platforms/{platform_id}")))
            .send()
            .await?;
        Self::expect_json(response).await
    }

    /// Paged ROM listing; `params` carries the version-dependent query keys
    pub async fn roms(&self, params: &[(String, String)]) -> Result<RemoteRomPage, RemoteError> {
        let response = self
            .http
            .get(self.endpoint("api/roms"))
            .query(params)
            .send()
            .await?;
        Self::expect_json(response).await
    }

    pub async fn rom(&self, rom_id: i64) -> Result<RemoteRom, RemoteError> {
        let response = self
            .http
            .get(self.endpoint(&format!("api/roms/{rom_id}")))
            .send()
            .await?;
        Self::expect_json(response).await
    }

    /// Streamed ROM content download; supports HTTP range resume
    pub async fn download_rom(
        &self,
        rom_id: i64,
        file_name: &str,
        range: Option<&str>,
    ) -> Result<DownloadResponse, RemoteError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| RemoteError::InvalidUrl(e.to_string()))?;
        let rom_id = rom_id.to_string();
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["api", "roms", rom_id.as_str(), "content", file_name]);

        let mut request = self.http.get(url);
        if let Some(range) = range {
            request = request.header(reqwest::header::RANGE, range);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() && status != StatusCode::PARTIAL_CONTENT {
            return Err(match status.as_u16() {
                400 => RemoteError::Download("Bad request - try resyncing (HTTP 400)".to_string()),
                401 | 403 => RemoteError::Auth {
                    code: status.as_u16(),
                },
                404 => RemoteError::Download("ROM not found on server - try resyncing".to_string()),
                500 | 502 | 503 => {
                    RemoteError::Download(format!("Server error (HTTP {})", status.as_u16()))
                }
                code => RemoteError::Download(format!("Download failed (HTTP {code})")),
            });
        }

        Ok(DownloadResponse {
            partial: status == StatusCode::PARTIAL_CONTENT,
            response,
        })
    }

    pub async fn update_rom_user_props(
        &self,
        rom_id: i64,
        props: &UserPropsUpdate,
    ) -> Result<(), RemoteError> {
        let response = self
            .http
            .put(self.endpoint(&format!("api/roms/{rom_id}/props")))
            .json(props)
            .send()
            .await?;
        Self::check_status(response)?;
        Ok(())
    }

    pub async fn collections(
        &self,
        is_favorite: Option<bool>,
    ) -> Result<Vec<RemoteCollection>, RemoteError> {
        let mut request = self.http.get(self.endpoint("api/collections"));
        if let Some(is_favorite) = is_favorite {
            request = request.query(&[("is_favorite", is_favorite)]);
        }
        let response = request.send().await?;
        Self::expect_json(response).await
    }

    pub async fn create_collection(
        &self,
        is_favorite: bool,
        collection: &CollectionCreate,
    ) -> Result<RemoteCollection, RemoteError> {
        let response = self
            .http
            .post(self.endpoint("api/collections"))
            .query(&[("is_favorite", is_favorite)])
            .json(collection)
            .send()
            .await?;
        Self::expect_json(response).await
    }

    /// Replace a collection's membership with a raw JSON id-array part
    pub async fn update_collection_roms(
        &self,
        collection_id: i64,
        rom_ids: &[i64],
    ) -> Result<RemoteCollection, RemoteError> {
        let body = format!(
            "[{}]",
            rom_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );
        let form = reqwest::multipart::Form::new().text("rom_ids", body);

        let response = self
            .http
            .put(self.endpoint(&format!("api/collections/{collection_id}")))
            .multipart(form)
            .send()
            .await?;
        Self::expect_json(response).await
    }

    pub async fn delete_collection(&self, collection_id: i64) -> Result<(), RemoteError> {
        let response = self
            .http
            .delete(self.endpoint(&format!("api/collections/{collection_id}")))
            .send()
            .await?;
        Self::check_status(response)?;
        Ok(())
    }

    pub async fn register_device(
        &self,
        device: &DeviceRegistration,
    ) -> Result<RemoteDevice, RemoteError> {
        let response = self
            .http
            .post(self.endpoint("api/devices"))
            .json(device)
            .send()
            .await?;
        Self::expect_json(response).await
    }

    pub async fn update_device(
        &self,
        device_id: &str,
        device: &DeviceRegistration,
    ) -> Result<RemoteDevice, RemoteError> {
        let response = self
            .http
            .put(self.endpoint(&format!("api/devices/{device_id}")))
            .json(device)
            .send()
            .await?;
        Self::expect_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let client = ApiClient::new("http://romm.local:8080/", None).unwrap();
        assert_eq!(
            client.endpoint("api/heartbeat"),
            "http://romm.local:8080/api/heartbeat"
        );
    }

    #[test]
    fn test_invalid_token_rejected() {
        assert!(ApiClient::new("http://romm.local/", Some("bad\ntoken")).is_err());
    }
}
