//! Outbound call placement.
//!
//! Placing a call asks the telephony provider to dial a number and, once
//! answered, open a media stream back to this service's `/media-stream`
//! endpoint. The stream carries the call context as custom parameters so
//! the bridge can build its instructions without any shared lookup.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use url::Url;
use zeroize::Zeroizing;

/// Path of the telephony WebSocket endpoint.
pub const MEDIA_STREAM_PATH: &str = "/media-stream";

/// Default Twilio REST API base.
pub const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Errors from placing a call.
#[derive(Debug, Error)]
pub enum PlacementError {
    /// Placement credentials or callback URL missing
    #[error("Call placement not configured: {0}")]
    NotConfigured(String),

    /// Transport failure talking to the provider
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Provider answered with an error status
    #[error("Provider rejected call ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Provider answered without a call id
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// A call to place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCallRequest {
    pub to_number: String,
    pub call_context: String,
}

/// Places outbound calls and returns the provider's call id.
#[async_trait]
pub trait CallPlacer: Send + Sync {
    async fn place_call(&self, request: &OutboundCallRequest) -> Result<String, PlacementError>;
}

/// Placer used when credentials are missing; every attempt fails.
#[derive(Debug, Clone)]
pub struct UnconfiguredPlacer {
    reason: String,
}

impl UnconfiguredPlacer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl CallPlacer for UnconfiguredPlacer {
    async fn place_call(&self, _request: &OutboundCallRequest) -> Result<String, PlacementError> {
        Err(PlacementError::NotConfigured(self.reason.clone()))
    }
}

/// Settings for [`TwilioCallPlacer`].
#[derive(Clone)]
pub struct TwilioSettings {
    pub api_base: String,
    pub account_sid: String,
    pub auth_token: Zeroizing<String>,
    /// Caller id the call is placed from
    pub from_number: String,
    /// Externally reachable base URL of this service
    pub public_url: String,
    /// Ask the provider to record the call
    pub record: bool,
    /// Echoed back by the provider in the stream's `start` frame
    pub stream_secret: Zeroizing<String>,
}

impl std::fmt::Debug for TwilioSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioSettings")
            .field("api_base", &self.api_base)
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("from_number", &self.from_number)
            .field("public_url", &self.public_url)
            .field("record", &self.record)
            .field("stream_secret", &"[REDACTED]")
            .finish()
    }
}

/// Places calls through the Twilio REST API with inline TwiML.
#[derive(Debug, Clone)]
pub struct TwilioCallPlacer {
    client: reqwest::Client,
    settings: TwilioSettings,
    stream_url: String,
}

impl TwilioCallPlacer {
    pub fn new(settings: TwilioSettings) -> Result<Self, PlacementError> {
        if settings.account_sid.is_empty() || settings.auth_token.is_empty() {
            return Err(PlacementError::NotConfigured(
                "TWILIO_ACCOUNT_SID and TWILIO_AUTH_TOKEN are required".to_string(),
            ));
        }
        if settings.from_number.is_empty() {
            return Err(PlacementError::NotConfigured(
                "TWILIO_NUMBER is required".to_string(),
            ));
        }
        let stream_url = media_stream_url(&settings.public_url)?;

        Ok(Self {
            client: reqwest::Client::new(),
            settings,
            stream_url,
        })
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    /// TwiML connecting the answered call to the media stream endpoint.
    pub fn twiml(&self, request: &OutboundCallRequest) -> String {
        format!(
            concat!(
                r#"<Response><Connect><Stream url="{url}">"#,
                r#"<Parameter name="callContext" value="{context}"/>"#,
                r#"<Parameter name="fromNumber" value="{from}"/>"#,
                r#"<Parameter name="toNumber" value="{to}"/>"#,
                r#"<Parameter name="streamSecret" value="{secret}"/>"#,
                "</Stream></Connect></Response>"
            ),
            url = xml_escape(&self.stream_url),
            context = xml_escape(&request.call_context),
            from = xml_escape(&self.settings.from_number),
            to = xml_escape(&request.to_number),
            secret = xml_escape(&self.settings.stream_secret),
        )
    }
}

#[async_trait]
impl CallPlacer for TwilioCallPlacer {
    async fn place_call(&self, request: &OutboundCallRequest) -> Result<String, PlacementError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.account_sid
        );
        let twiml = self.twiml(request);

        let mut form = vec![
            ("To", request.to_number.as_str()),
            ("From", self.settings.from_number.as_str()),
            ("Twiml", twiml.as_str()),
        ];
        if self.settings.record {
            form.push(("Record", "true"));
        }

        tracing::info!(to = %request.to_number, record = self.settings.record, "Placing outbound call");

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.settings.account_sid,
                Some(self.settings.auth_token.as_str()),
            )
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or_default();

        if !status.is_success() {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error"))
                .to_string();
            tracing::error!(status = status.as_u16(), %message, "Call placement rejected");
            return Err(PlacementError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let call_sid = body
            .get("sid")
            .and_then(Value::as_str)
            .filter(|sid| !sid.is_empty())
            .ok_or_else(|| PlacementError::InvalidResponse("missing call sid".to_string()))?;

        tracing::info!(call_sid, "Outbound call initiated");
        Ok(call_sid.to_string())
    }
}

/// Derive the WebSocket URL of the media stream endpoint from the public URL.
pub fn media_stream_url(public_url: &str) -> Result<String, PlacementError> {
    if public_url.trim().is_empty() {
        return Err(PlacementError::NotConfigured(
            "PUBLIC_URL is required".to_string(),
        ));
    }
    let mut url = Url::parse(public_url.trim())
        .map_err(|e| PlacementError::NotConfigured(format!("invalid PUBLIC_URL: {e}")))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(PlacementError::NotConfigured(format!(
                "unsupported PUBLIC_URL scheme: {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| PlacementError::NotConfigured("invalid PUBLIC_URL scheme".to_string()))?;

    let path = format!("{}{MEDIA_STREAM_PATH}", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);
    Ok(url.to_string())
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
