use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::BotConfig;
use crate::error::{BotError, Result};
use crate::payload::{Outbound, RequestBody};
use crate::types::ApiResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
}

/// HTTP client bound to `<api_url>/bot<token>`.
pub struct Transport {
    http: reqwest::Client,
    base_url: String,
    timeout_ms: AtomicU64,
}

impl Transport {
    pub fn new(config: &BotConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| BotError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: format!("{}/bot{}", config.api_url.trim_end_matches('/'), config.token),
            timeout_ms: AtomicU64::new(config.request_timeout().as_millis() as u64),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
    }

    /// Issue one call and unwrap the response envelope.
    pub async fn call<T: DeserializeOwned>(&self, outbound: Outbound, verb: Verb) -> Result<ApiResponse<T>> {
        let url = format!("{}/{}", self.base_url, outbound.method);

        let mut req = match verb {
            Verb::Get => self.http.get(&url),
            Verb::Post => self.http.post(&url),
        };
        req = req.timeout(self.timeout());

        req = match outbound.body {
            RequestBody::Empty => req,
            RequestBody::Json(body) => req.json(&body),
            RequestBody::Multipart(form) => req.multipart(form.into_form().await?),
        };

        debug!("{verb:?} {}", outbound.method);

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        let envelope: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => {
                return Err(BotError::Api {
                    description: format!("API returned {status}"),
                    error_code: Some(i64::from(status.as_u16())),
                })
            }
        };

        if !status.is_success() || !envelope.ok {
            return Err(BotError::Api {
                description: envelope
                    .description
                    .unwrap_or_else(|| format!("API returned {status}")),
                error_code: envelope.error_code.or(Some(i64::from(status.as_u16()))),
            });
        }

        Ok(envelope)
    }

    /// Like [`Transport::call`] but requires a `result` in the envelope.
    pub async fn call_result<T: DeserializeOwned>(&self, outbound: Outbound, verb: Verb) -> Result<T> {
        let method = outbound.method;
        self.call(outbound, verb).await?.result.ok_or_else(|| BotError::Api {
            description: format!("{method} returned no result"),
            error_code: None,
        })
    }
}
