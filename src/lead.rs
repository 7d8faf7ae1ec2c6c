//! The lead endpoint: validate a form submission, relay it to a Telegram
//! chat, and translate the result into a JSON reply.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::config::{CredentialSource, ServerConfig};
use crate::telegram::{SendMessage, SendOutcome, TelegramClient};

/// Shortest lead text accepted, in UTF-16 code units
pub const MIN_TEXT_LEN: usize = 5;
/// Longest lead text accepted. Telegram caps messages at 4096.
pub const MAX_TEXT_LEN: usize = 3800;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Shared, read-only state for every request
pub struct AppState {
    pub telegram: TelegramClient,
    pub credentials: CredentialSource,
}

impl AppState {
    pub fn new(telegram: TelegramClient, credentials: CredentialSource) -> Self {
        Self {
            telegram,
            credentials,
        }
    }
}

/// Result of one request, mapped 1:1 to an HTTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadOutcome {
    Delivered,
    ClientError(&'static str),
    ServerMisconfigured,
    UpstreamError { status: StatusCode, details: String },
    TransportError,
    MethodNotAllowed,
}

impl LeadOutcome {
    fn status(&self) -> StatusCode {
        match self {
            LeadOutcome::Delivered => StatusCode::OK,
            LeadOutcome::ClientError(_) => StatusCode::BAD_REQUEST,
            LeadOutcome::ServerMisconfigured => StatusCode::INTERNAL_SERVER_ERROR,
            LeadOutcome::UpstreamError { .. } | LeadOutcome::TransportError => {
                StatusCode::BAD_GATEWAY
            }
            LeadOutcome::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    fn body(&self) -> Value {
        match self {
            LeadOutcome::Delivered => json!({ "ok": true }),
            LeadOutcome::ClientError(reason) => json!({ "ok": false, "error": reason }),
            LeadOutcome::ServerMisconfigured => json!({
                "ok": false,
                "error": "Server misconfigured: TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID not set",
            }),
            // Callers get the body text; the upstream status goes to the log.
            LeadOutcome::UpstreamError { details, .. } => json!({
                "ok": false,
                "error": "Telegram API error",
                "details": details,
            }),
            LeadOutcome::TransportError => {
                json!({ "ok": false, "error": "Network or runtime error" })
            }
            LeadOutcome::MethodNotAllowed => {
                json!({ "ok": false, "error": "Method Not Allowed (use POST)" })
            }
        }
    }
}

impl IntoResponse for LeadOutcome {
    fn into_response(self) -> Response {
        if let LeadOutcome::UpstreamError { status, details } = &self {
            error!("Telegram rejected lead ({}): {}", status, details);
        }

        (
            self.status(),
            [
                (header::CONTENT_TYPE, JSON_CONTENT_TYPE),
                (header::CACHE_CONTROL, "no-store"),
            ],
            self.body().to_string(),
        )
            .into_response()
    }
}

pub fn router(state: Arc<AppState>, server: &ServerConfig) -> Router {
    Router::new()
        .route(&server.route, post(submit_lead).get(method_not_allowed))
        .layer(DefaultBodyLimit::max(server.max_body_bytes))
        .with_state(state)
}

async fn method_not_allowed() -> LeadOutcome {
    LeadOutcome::MethodNotAllowed
}

async fn submit_lead(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> LeadOutcome {
    let Some(credentials) = state.credentials.resolve() else {
        error!("Lead rejected: TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID not set");
        return LeadOutcome::ServerMisconfigured;
    };

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.contains("application/json") {
        warn!("Lead rejected: unexpected content-type {:?}", content_type);
        return LeadOutcome::ClientError("Expected application/json");
    }

    let body = match body {
        Ok(body) => body,
        // Only a huge text can push a lead form past the body limit
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            warn!("Lead rejected: body exceeds the configured limit");
            return LeadOutcome::ClientError("Invalid text length");
        }
        Err(rejection) => {
            error!("Failed to read lead body: {}", rejection);
            return LeadOutcome::TransportError;
        }
    };

    let text = match extract_text(&body) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to read lead body: {:#}", e);
            return LeadOutcome::TransportError;
        }
    };

    let len = text_len(&text);
    if !(MIN_TEXT_LEN..=MAX_TEXT_LEN).contains(&len) {
        warn!("Lead rejected: text length {} out of range", len);
        return LeadOutcome::ClientError("Invalid text length");
    }

    let message = SendMessage::new(credentials.chat_id, text);
    match state
        .telegram
        .send_message(&credentials.bot_token, &message)
        .await
    {
        Ok(SendOutcome::Delivered) => {
            info!("Lead relayed to chat {} ({} chars)", message.chat_id, len);
            LeadOutcome::Delivered
        }
        Ok(SendOutcome::Rejected { status, details }) => {
            LeadOutcome::UpstreamError { status, details }
        }
        Err(e) => {
            error!("Telegram request failed: {:#}", e);
            LeadOutcome::TransportError
        }
    }
}

/// Parse the body and pull out the trimmed `text` field. Any JSON value is
/// accepted; a body that is not an object simply has no text.
fn extract_text(body: &[u8]) -> anyhow::Result<String> {
    let value: Value = serde_json::from_slice(body)?;
    let text = coerce_to_string(value.get("text"));
    Ok(trim_text(&text).to_string())
}

/// String form of a loosely typed form field, as a browser would render it.
fn coerce_to_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(format_number)
            .unwrap_or_else(|| n.to_string()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| coerce_to_string(Some(item)))
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Object(_)) => "[object Object]".to_string(),
    }
}

/// Number formatting of a JavaScript runtime: every JSON number is a
/// double, `-0` prints as `0`, and very large or small magnitudes switch
/// to exponent form with an explicit sign.
fn format_number(f: f64) -> String {
    if f == 0.0 {
        return "0".to_string();
    }

    let magnitude = f.abs();
    if magnitude >= 1e21 || magnitude < 1e-6 {
        let exp = format!("{:e}", f);
        return match exp.split_once('e') {
            Some((mantissa, power)) if !power.starts_with('-') => {
                format!("{}e+{}", mantissa, power)
            }
            _ => exp,
        };
    }

    f.to_string()
}

/// Whitespace and line terminators as JavaScript's `trim` sees them.
/// Notably U+0085 is not among them.
fn is_trimmable(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n'
            | '\u{b}'
            | '\u{c}'
            | '\r'
            | ' '
            | '\u{a0}'
            | '\u{1680}'
            | '\u{2000}'..='\u{200a}'
            | '\u{2028}'
            | '\u{2029}'
            | '\u{202f}'
            | '\u{205f}'
            | '\u{3000}'
            | '\u{feff}'
    )
}

fn trim_text(text: &str) -> &str {
    text.trim_matches(is_trimmable)
}

/// Length as Telegram counts it: UTF-16 code units.
fn text_len(text: &str) -> usize {
    text.encode_utf16().count()
}
