// src/handy/upload.rs

//! Gets a script onto a reachable cache host and registers it with the device.

use log::{error, info, warn};
use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use crate::error::{HandyError, Result};
use super::api::DeviceApi;
use super::transport::{HttpTransport, RetryPolicy};

/// A third-party host that stores an uploaded file and hands back its URL.
#[allow(async_fn_in_trait)]
pub trait ScriptCache {
    async fn upload(&self, endpoint: &str, filename: &str, payload: &[u8]) -> Result<String>;
}

#[derive(Deserialize)]
struct UploadResponse {
    url: Option<String>,
}

pub struct CacheClient {
    transport: HttpTransport,
}

impl CacheClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(HeaderMap::new(), RetryPolicy::default())?,
        })
    }
}

impl ScriptCache for CacheClient {
    async fn upload(&self, endpoint: &str, filename: &str, payload: &[u8]) -> Result<String> {
        let part = Part::bytes(payload.to_vec())
            .file_name(filename.to_string())
            .mime_str("application/json")?;
        let form = Form::new().part("file", part);

        let response = self
            .transport
            .send_once(self.transport.client().post(endpoint).multipart(form))
            .await?;
        let body = response.text().await?;
        parse_upload_url(&body)
    }
}

fn parse_upload_url(body: &str) -> Result<String> {
    let parsed: UploadResponse = serde_json::from_str(body)
        .map_err(|_| HandyError::Protocol(format!("Invalid upload JSON: {}", body)))?;
    parsed
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| HandyError::Protocol("Upload response has no url".to_string()))
}

/// Tries each endpoint in order: upload, then register the URL with the
/// device. The first endpoint that gets through both steps wins.
pub async fn upload_script<C, D>(
    endpoints: &[String],
    filename: &str,
    payload: &[u8],
    cache: &C,
    device: &D,
) -> Result<String>
where
    C: ScriptCache,
    D: DeviceApi,
{
    for endpoint in endpoints {
        let url = match cache.upload(endpoint, filename, payload).await {
            Ok(url) => url,
            Err(e) => {
                warn!("Upload to {} failed: {}", endpoint, e);
                continue;
            }
        };
        info!("Uploading: {}", url);

        match device.setup_script(&url).await {
            Ok(()) => {
                info!("Script registered with device via {}", endpoint);
                return Ok(url);
            }
            Err(e) => warn!("Device rejected script from {}: {}", endpoint, e),
        }
    }

    error!("Every cache endpoint failed");
    Err(HandyError::UploadExhausted(endpoints.len()))
}
