//! services/scheduler/src/adapters/fonnte.rs
//!
//! Implements the `MessagingService` port on top of the Fonnte WhatsApp
//! gateway. A message counts as sent only when the HTTP call succeeds and the
//! gateway's JSON body reports `"status": true`.

use async_trait::async_trait;
use scheduler_core::ports::MessagingService;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

//=========================================================================================
// Wire Types
//=========================================================================================

/// The part of Fonnte's response body the adapter cares about.
#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    status: bool,
    #[serde(default)]
    reason: Option<String>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct FonnteMessenger {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl FonnteMessenger {
    /// Creates a messenger whose every call is bounded by `timeout`.
    pub fn new(api_url: String, token: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url,
            token,
        })
    }
}

#[async_trait]
impl MessagingService for FonnteMessenger {
    async fn send(&self, phone: &str, text: &str) -> bool {
        let response = match self
            .client
            .post(&self.api_url)
            .header(reqwest::header::AUTHORIZATION, &self.token)
            .form(&[("target", phone), ("message", text)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Fonnte request failed: {}", e);
                return false;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("Fonnte responded with HTTP {}", status);
            return false;
        }

        match response.json::<SendResponse>().await {
            Ok(body) => accepted(&body),
            Err(e) => {
                warn!("Could not read Fonnte response: {}", e);
                false
            }
        }
    }
}

fn accepted(body: &SendResponse) -> bool {
    if body.status {
        debug!("Fonnte accepted the message");
    } else {
        warn!(
            "Fonnte rejected the message: {}",
            body.reason.as_deref().unwrap_or("no reason given")
        );
    }
    body.status
}
