// src/handy/api.rs

//! Device REST client.
//!
//! [`DeviceApi`] is the seam the rest of the crate talks through; [`HandyClient`]
//! is the real implementation over [`HttpTransport`].

use log::{info, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use crate::config::Config;
use crate::error::{HandyError, Result};
use super::transport::{HttpTransport, RetryPolicy};

/// Mode in which the device accepts externally hosted scripts.
pub const HSSP_ID: i64 = 1;

/// Body of `PUT /hssp/play`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayRequest {
    pub estimated_server_time: i64,
    pub start_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_rate: Option<f64>,
}

#[allow(async_fn_in_trait)]
pub trait DeviceApi {
    async fn mode(&self) -> Result<i64>;
    async fn set_mode(&self, mode: i64) -> Result<()>;
    async fn server_time(&self) -> Result<i64>;
    async fn setup_script(&self, url: &str) -> Result<()>;
    async fn play(&self, request: &PlayRequest) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModeResponse {
    Wrapped { result: ModeBody },
    Flat(ModeBody),
}

#[derive(Deserialize)]
struct ModeBody {
    mode: i64,
}

#[derive(Deserialize)]
struct ServerTimeResponse {
    #[serde(rename = "serverTime", alias = "server_time")]
    server_time: i64,
}

pub struct HandyClient {
    transport: HttpTransport,
    base_url: String,
}

impl HandyClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-connection-key"),
            header_value(&config.connection_key)?,
        );
        if let Some(app_id) = &config.application_id {
            headers.insert(HeaderName::from_static("x-api-key"), header_value(app_id)?);
        }

        Ok(Self {
            transport: HttpTransport::new(headers, RetryPolicy::default())?,
            base_url: config.api_endpoint.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn put_json(&self, path: &str, body: &serde_json::Value) -> Result<()> {
        self.transport
            .send_idempotent(Method::PUT, &self.url(path), |req| req.json(body))
            .await?;
        Ok(())
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| HandyError::Config(format!("Invalid header value: {}", e)))
}

/// Parses a `/mode` body, which may or may not be wrapped in `result`.
fn parse_mode(body: &str) -> Result<i64> {
    if body.trim().is_empty() {
        return Err(HandyError::Protocol("Empty mode response".to_string()));
    }
    let parsed: ModeResponse = serde_json::from_str(body)
        .map_err(|_| HandyError::Protocol(format!("Invalid mode JSON: {}", body)))?;
    Ok(match parsed {
        ModeResponse::Wrapped { result } => result.mode,
        ModeResponse::Flat(body) => body.mode,
    })
}

fn parse_server_time(body: &str) -> Result<i64> {
    serde_json::from_str::<ServerTimeResponse>(body)
        .map(|r| r.server_time)
        .map_err(|_| HandyError::Protocol(format!("Invalid servertime JSON: {}", body)))
}

impl DeviceApi for HandyClient {
    async fn mode(&self) -> Result<i64> {
        let response = self
            .transport
            .send_idempotent(Method::GET, &self.url("/mode"), |req| req)
            .await?;
        parse_mode(&response.text().await?)
    }

    async fn set_mode(&self, mode: i64) -> Result<()> {
        self.put_json("/mode", &json!({ "mode": mode })).await
    }

    async fn server_time(&self) -> Result<i64> {
        let response = self
            .transport
            .send_idempotent(Method::GET, &self.url("/servertime"), |req| req)
            .await?;
        parse_server_time(&response.text().await?)
    }

    async fn setup_script(&self, url: &str) -> Result<()> {
        self.put_json("/hssp/setup", &json!({ "url": url })).await
    }

    async fn play(&self, request: &PlayRequest) -> Result<()> {
        self.transport
            .send_idempotent(Method::PUT, &self.url("/hssp/play"), |req| req.json(request))
            .await?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.transport
            .send_idempotent(Method::PUT, &self.url("/hssp/stop"), |req| req)
            .await?;
        Ok(())
    }
}

/// Makes sure the device is in HSSP mode before anything else is sent.
///
/// Any failure here is fatal for the run and comes back as `ModeNegotiation`.
pub async fn ensure_hssp_mode<D: DeviceApi>(device: &D) -> Result<()> {
    let mode = device
        .mode()
        .await
        .map_err(|e| HandyError::ModeNegotiation(e.to_string()))?;

    if mode == HSSP_ID {
        info!("Device already in HSSP mode");
        return Ok(());
    }

    warn!("Device in mode {}, switching to HSSP ({})", mode, HSSP_ID);
    device
        .set_mode(HSSP_ID)
        .await
        .map_err(|e| HandyError::ModeNegotiation(e.to_string()))
}

#[cfg(test)]
pub(crate) mod fake {
    //! Recording stand-in for the device, shared by tests across modules.

    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Mode,
        SetMode(i64),
        ServerTime,
        Setup(String),
        Play(PlayRequest),
        Stop,
    }

    #[derive(Default)]
    pub struct FakeDevice {
        pub calls: RefCell<Vec<Call>>,
        pub current_mode: Cell<i64>,
        pub fail_set_mode: Cell<bool>,
        pub fail_commands: Cell<bool>,
        /// Setup calls for these URLs fail.
        pub reject_urls: RefCell<Vec<String>>,
        pub server_times: RefCell<VecDeque<Result<i64>>>,
    }

    impl FakeDevice {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }

        pub fn count(&self, wanted: fn(&Call) -> bool) -> usize {
            self.calls.borrow().iter().filter(|c| wanted(c)).count()
        }

        fn record(&self, call: Call) {
            self.calls.borrow_mut().push(call);
        }

        fn failure() -> HandyError {
            HandyError::Status { status: 503, url: "fake".to_string() }
        }
    }

    impl DeviceApi for FakeDevice {
        async fn mode(&self) -> Result<i64> {
            self.record(Call::Mode);
            Ok(self.current_mode.get())
        }

        async fn set_mode(&self, mode: i64) -> Result<()> {
            self.record(Call::SetMode(mode));
            if self.fail_set_mode.get() {
                return Err(Self::failure());
            }
            self.current_mode.set(mode);
            Ok(())
        }

        async fn server_time(&self) -> Result<i64> {
            self.record(Call::ServerTime);
            self.server_times
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(HandyError::Protocol("no server time queued".to_string())))
        }

        async fn setup_script(&self, url: &str) -> Result<()> {
            self.record(Call::Setup(url.to_string()));
            if self.reject_urls.borrow().iter().any(|u| u == url) {
                return Err(Self::failure());
            }
            Ok(())
        }

        async fn play(&self, request: &PlayRequest) -> Result<()> {
            self.record(Call::Play(*request));
            if self.fail_commands.get() {
                return Err(Self::failure());
            }
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.record(Call::Stop);
            if self.fail_commands.get() {
                return Err(Self::failure());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{Call, FakeDevice};
    use super::*;

    #[test]
    fn mode_body_is_accepted_flat_or_wrapped() {
        assert_eq!(parse_mode(r#"{"mode": 0}"#).unwrap(), 0);
        assert_eq!(parse_mode(r#"{"result": {"mode": 1}}"#).unwrap(), 1);
        assert!(matches!(parse_mode("  "), Err(HandyError::Protocol(_))));
        assert!(matches!(parse_mode("<html>"), Err(HandyError::Protocol(_))));
    }

    #[test]
    fn server_time_accepts_both_key_styles() {
        assert_eq!(parse_server_time(r#"{"serverTime": 1700000000123}"#).unwrap(), 1700000000123);
        assert_eq!(parse_server_time(r#"{"server_time": 42}"#).unwrap(), 42);
        assert!(parse_server_time(r#"{"time": 42}"#).is_err());
    }

    #[test]
    fn play_request_uses_device_field_names() {
        let body = serde_json::to_value(PlayRequest {
            estimated_server_time: 1000,
            start_time: 250,
            playback_rate: Some(1.5),
        })
        .unwrap();
        assert_eq!(body, json!({"estimatedServerTime": 1000, "startTime": 250, "playbackRate": 1.5}));

        let body = serde_json::to_value(PlayRequest {
            estimated_server_time: 1000,
            start_time: 250,
            playback_rate: None,
        })
        .unwrap();
        assert_eq!(body, json!({"estimatedServerTime": 1000, "startTime": 250}));
    }

    #[tokio::test]
    async fn switches_to_hssp_when_in_another_mode() {
        let device = FakeDevice::default();
        device.current_mode.set(0);
        ensure_hssp_mode(&device).await.unwrap();
        assert_eq!(device.calls(), vec![Call::Mode, Call::SetMode(HSSP_ID)]);
    }

    #[tokio::test]
    async fn leaves_mode_alone_when_already_hssp() {
        let device = FakeDevice::default();
        device.current_mode.set(HSSP_ID);
        ensure_hssp_mode(&device).await.unwrap();
        assert_eq!(device.calls(), vec![Call::Mode]);
    }

    #[tokio::test]
    async fn failed_mode_switch_is_fatal() {
        let device = FakeDevice::default();
        device.fail_set_mode.set(true);
        let err = ensure_hssp_mode(&device).await.unwrap_err();
        assert!(matches!(err, HandyError::ModeNegotiation(_)));
    }
}
