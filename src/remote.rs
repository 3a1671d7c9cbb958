//! Client for the remote document store.
//!
//! The remote side runs its own per-collection import and reports back; this
//! module only ships the snapshot and relays the answer. Nothing is retried.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{PurseError, Result};
use crate::settings::Settings;
use crate::snapshot::Snapshot;

pub const IMPORT_PATH: &str = "/api/migration/import";
pub const CLEAR_PATH: &str = "/api/migration/clear";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ItemError {
    /// The remote side may report string or numeric ids.
    #[serde(default)]
    pub id: Option<Value>,
    pub error: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionResult {
    #[serde(default)]
    pub imported: u64,
    #[serde(default)]
    pub errors: Vec<ItemError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub imported: u64,
    #[serde(default)]
    pub errors: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MigrationReport {
    #[serde(default)]
    pub summary: Summary,
    #[serde(default)]
    pub details: BTreeMap<String, CollectionResult>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearAllResponse {
    pub success: bool,
    #[serde(default)]
    pub total_deleted: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

pub trait RemoteStore {
    /// Send the whole snapshot in one request.
    fn upload(&self, snapshot: &Snapshot) -> Result<MigrationReport>;

    /// Ask the remote side to delete every document it holds for this user.
    fn clear_all(&self) -> Result<ClearAllResponse>;
}

pub struct HttpRemote {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl HttpRemote {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let url = settings.resolved_remote_url().ok_or_else(|| {
            PurseError::Settings(
                "No remote configured. Set remote_url in settings.json or PURSE_REMOTE_URL.".into(),
            )
        })?;
        Self::new(
            &url,
            settings.resolved_remote_token(),
            Duration::from_secs(settings.remote_timeout_secs),
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.client.request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text()?;
    if !status.is_success() {
        let detail = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(String::from))
            .unwrap_or(body);
        return Err(PurseError::Remote(format!("server returned {status}: {detail}")));
    }
    serde_json::from_str(&body)
        .map_err(|e| PurseError::Remote(format!("unexpected response body: {e}")))
}

impl RemoteStore for HttpRemote {
    fn upload(&self, snapshot: &Snapshot) -> Result<MigrationReport> {
        tracing::info!(
            url = %self.base_url,
            records = snapshot.total_records(),
            "Uploading snapshot"
        );
        let response = self.request(Method::POST, IMPORT_PATH).json(snapshot).send()?;
        let report: MigrationReport = read_json(response)?;
        tracing::info!(
            imported = report.summary.imported,
            errors = report.summary.errors,
            "Remote import finished"
        );
        Ok(report)
    }

    fn clear_all(&self) -> Result<ClearAllResponse> {
        tracing::info!(url = %self.base_url, "Requesting remote wipe");
        let response = self.request(Method::DELETE, CLEAR_PATH).send()?;
        read_json(response)
    }
}
