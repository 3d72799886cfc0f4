/// HTTP client for the air-quality backend
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::api::schema::{decode_history, decode_list, decode_readings};
use crate::error::ApiError;
use crate::models::{ApiDevice, HistoricalPoint, NewUser, SensorReading, User};

#[derive(Debug, Clone)]
pub struct ApiClient {
    base: Url,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self, ApiError> {
        let mut base = base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(ApiClient { base, http })
    }

    /// Resolve an API path (plus optional path segment) against the base URL
    fn endpoint(&self, path: &str, segment: Option<&str>) -> Result<Url, ApiError> {
        let mut url = self.base.join(path)?;
        if let Some(segment) = segment {
            url.path_segments_mut()
                .map_err(|_| ApiError::Schema(format!("base URL {} cannot take a path", self.base)))?
                .push(segment);
        }
        Ok(url)
    }

    fn device_endpoint(&self, path: &str, device_id: &str) -> Result<Url, ApiError> {
        let mut url = self.endpoint(path, None)?;
        url.query_pairs_mut().append_pair("deviceId", device_id);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, ApiError> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Schema(e.to_string()))
    }

    async fn get(&self, url: Url) -> Result<Value, ApiError> {
        debug!("GET {}", url);
        self.send(self.http.get(url)).await
    }

    /// `GET /api/devices`
    pub async fn list_devices(&self) -> Result<Vec<ApiDevice>, ApiError> {
        let payload = self.get(self.endpoint("api/devices", None)?).await?;
        decode_list(payload, "device")
    }

    /// `GET /api/data?deviceId=<id>`
    pub async fn latest_readings(&self, device_id: &str) -> Result<Vec<SensorReading>, ApiError> {
        let payload = self.get(self.device_endpoint("api/data", device_id)?).await?;
        decode_readings(payload)
    }

    /// `GET /api/historical-data?deviceId=<id>`
    pub async fn historical_data(
        &self,
        device_id: &str,
    ) -> Result<HashMap<String, Vec<HistoricalPoint>>, ApiError> {
        let payload = self
            .get(self.device_endpoint("api/historical-data", device_id)?)
            .await?;
        decode_history(payload)
    }

    /// `GET /api/users`
    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        let payload = self.get(self.endpoint("api/users", None)?).await?;
        decode_list(payload, "user")
    }

    /// `POST /api/users`
    pub async fn create_user(&self, user: &NewUser) -> Result<User, ApiError> {
        let url = self.endpoint("api/users", None)?;
        debug!("POST {}", url);
        let payload = self.send(self.http.post(url).json(user)).await?;
        serde_json::from_value(payload).map_err(|e| ApiError::Schema(e.to_string()))
    }

    /// `DELETE /api/users/:id`
    pub async fn delete_user(&self, user_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint("api/users", Some(user_id))?;
        debug!("DELETE {}", url);
        self.send(self.http.delete(url)).await.map(|_| ())
    }
}

/// Pull `error` or `message` out of a JSON error body, else use the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
