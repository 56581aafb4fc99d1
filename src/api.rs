use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use anyhow::{Result, anyhow};
use tracing::{info, warn};

use crate::conversation::ChatMessage;

/// Substituted for the placeholder when a chat request fails at the HTTP
/// or transport level.
pub const GENERIC_FAILURE: &str =
    "Sorry, something went wrong while processing your order. Please try again.";

/// Fallback when a finalize reply reports failure without an error field.
pub const FINALIZE_FAILURE: &str = "Sorry, your order could not be finalized.";

#[derive(Serialize)]
struct ProcessRequest<'a> {
    transcript: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<&'a str>,
}

#[derive(Deserialize)]
struct ChatReply {
    assistant: String,
}

/// Reply to a `mode: "finalize"` chat request.
#[derive(Debug, Deserialize)]
pub struct FinalizeReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub cart: Option<Value>,
    #[serde(default)]
    pub order_id: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Client for the GShare voice-order endpoints.
///
/// Every request carries `Content-Type: application/json` plus the
/// anti-forgery token as `X-CSRFToken`; an unconfigured token is sent as
/// an empty header value rather than failing the request.
#[derive(Clone)]
pub struct VoiceOrderClient {
    client: Client,
    base_url: String,
    csrf_token: String,
}

impl VoiceOrderClient {
    pub fn new(base_url: &str, csrf_token: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            csrf_token: csrf_token.unwrap_or("").to_string(),
        }
    }

    /// Where a finalized order can be viewed.
    pub fn cart_url(&self) -> String {
        format!("{}/shoppingcart/cart/", self.base_url)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .header("X-CSRFToken", &self.csrf_token)
    }

    /// Sends a single transcript to the process endpoint. Fire-and-log:
    /// status and body are logged, nothing is folded back into the
    /// conversation.
    pub async fn process(&self, transcript: &str) -> Result<()> {
        let response = self
            .post("/shoppingcart/voice_order/process/")
            .json(&ProcessRequest { transcript })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            info!(%status, body, "voice transcript posted");
        } else {
            warn!(%status, body, "voice transcript post failed");
        }
        Ok(())
    }

    /// Sends the full message history as one chat turn and returns the
    /// assistant's reply text.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self
            .post("/shoppingcart/voice_order/chat/")
            .json(&ChatRequest {
                messages,
                mode: None,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "chat request failed with status: {}",
                response.status()
            ));
        }

        let reply: ChatReply = response.json().await?;
        Ok(reply.assistant)
    }

    /// Asks the backend to materialize the conversation into a cart.
    pub async fn finalize(&self, messages: &[ChatMessage]) -> Result<FinalizeReply> {
        let response = self
            .post("/shoppingcart/voice_order/chat/")
            .json(&ChatRequest {
                messages,
                mode: Some("finalize"),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "finalize request failed with status: {}",
                response.status()
            ));
        }

        let reply: FinalizeReply = response.json().await?;
        Ok(reply)
    }
}
