use async_trait::async_trait;
use base64::Engine;
use bytes::{Buf, BytesMut};
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::prompt::GenerationRequest;

pub const DEMO_KEY: &str = "DEMO_KEY";

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")] Http(String),
    #[error("API error: {0}")] Api(String),
    #[error("Other: {0}")] Other(String),
}

/// The external text generator. Streaming hands every fragment to
/// `on_fragment` as it arrives and resolves with the concatenated text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_stream(
        &self,
        request: &GenerationRequest,
        on_fragment: &mut (dyn for<'f> FnMut(&'f str) + Send),
    ) -> Result<String, GeminiError>;

    async fn generate_once(&self, request: &GenerationRequest) -> Result<String, GeminiError>;
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let serde_json::Value::String(s) = val {
                        if s.len() > 100 {
                            *val = serde_json::Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    pub fn is_demo(&self) -> bool { self.api_key == DEMO_KEY }

    fn url(&self, method: &str, query: &str) -> String {
        format!("{}/models/{}:{}?{}key={}", self.base_url, self.model, method, query, self.api_key)
    }

    fn log_request(&self, url: &str, body: &serde_json::Value) {
        info!("🔗 Making request to: {}", url.replace(&self.api_key, "***"));
        let mut logged = body.clone();
        truncate_base64_in_json(&mut logged);
        debug!("📤 Request body: {}", serde_json::to_string_pretty(&logged).unwrap_or_default());
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<reqwest::Response, GeminiError> {
        self.log_request(url, body);
        let response = self.client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!("❌ API Error response: {}", error_body);
            return Err(GeminiError::Http(format!("status={} body={}", status, error_body)));
        }
        Ok(response)
    }
}

pub fn request_body(request: &GenerationRequest) -> serde_json::Value {
    let mut parts = vec![json!({ "text": request.prompt })];
    if let Some(image) = &request.image {
        parts.push(json!({
            "inlineData": {
                "mimeType": image.media_type().unwrap_or_else(|| "image/jpeg".into()),
                "data": base64::engine::general_purpose::STANDARD.encode(&image.data),
            }
        }));
    }
    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "temperature": 0.8,
            "topK": 40,
            "topP": 0.95,
        }
    })
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate_stream(
        &self,
        request: &GenerationRequest,
        on_fragment: &mut (dyn for<'f> FnMut(&'f str) + Send),
    ) -> Result<String, GeminiError> {
        if self.is_demo() {
            info!("Using demo mode - streaming canned copy");
            let text = demo_text(&request.prompt);
            for word in text.split_inclusive(' ') {
                on_fragment(word);
            }
            return Ok(text);
        }

        info!("Streaming text from Gemini API...");
        let url = self.url("streamGenerateContent", "alt=sse&");
        let response = self.post(&url, &request_body(request)).await?;

        let mut decoder = SseDecoder::default();
        let mut full = String::new();
        let mut fragments = 0usize;
        let mut body = Box::pin(response.bytes_stream());
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| GeminiError::Http(e.to_string()))?;
            for payload in decoder.push(&chunk) {
                if let Some(text) = parse_payload(&payload)? {
                    full.push_str(&text);
                    fragments += 1;
                    on_fragment(&text);
                }
            }
        }
        for payload in decoder.finish() {
            if let Some(text) = parse_payload(&payload)? {
                full.push_str(&text);
                fragments += 1;
                on_fragment(&text);
            }
        }
        info!("✅ Stream finished: {} fragments, {} chars", fragments, full.len());
        Ok(full)
    }

    async fn generate_once(&self, request: &GenerationRequest) -> Result<String, GeminiError> {
        if self.is_demo() {
            info!("Using demo mode - generating canned copy");
            return Ok(demo_text(&request.prompt));
        }

        info!("Generating text with Gemini API...");
        let url = self.url("generateContent", "");
        let response = self.post(&url, &request_body(request)).await?;
        let response_text = response.text().await.map_err(|e| GeminiError::Http(e.to_string()))?;
        let text = parse_payload(&response_text)?.unwrap_or_default();
        info!("✅ Generated {} chars", text.len());
        Ok(text)
    }
}

/// Incremental Server-Sent Events reader. Feed raw bytes in any split, get
/// back the `data:` payload of every completed event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos);
            self.buffer.advance(1);
            let line = String::from_utf8_lossy(&line);
            self.line(line.trim_end_matches('\r'), &mut events);
        }
        events
    }

    /// Flushes an unterminated last event.
    pub fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            let rest = String::from_utf8_lossy(&rest);
            self.line(rest.trim_end_matches('\r'), &mut events);
        }
        self.line("", &mut events);
        events
    }

    fn line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            if !self.data.is_empty() {
                events.push(self.data.join("\n"));
                self.data.clear();
            }
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
    }
}

/// Text carried by one response object, `None` when it carries none.
fn parse_payload(payload: &str) -> Result<Option<String>, GeminiError> {
    let parsed: GeminiResponse = serde_json::from_str(payload)
        .map_err(|e| GeminiError::Other(format!("parse error: {}: {}", e, payload)))?;
    if let Some(err) = parsed.error {
        return Err(GeminiError::Api(format!("{} {}", err.code, err.message)));
    }
    let text: String = parsed.candidates
        .iter()
        .take(1)
        .flat_map(|c| c.content.parts.iter())
        .filter_map(|p| match p { Part::Text { text } => Some(text.as_str()), Part::Other(_) => None })
        .collect();
    Ok(if text.is_empty() { None } else { Some(text) })
}

fn demo_text(prompt: &str) -> String {
    let product = prompt
        .lines()
        .find_map(|l| l.strip_prefix("**Product Name/Link:** "))
        .unwrap_or("your product")
        .trim()
        .to_string();

    if prompt.contains("Return only the raw replacement text") {
        return format!("A fresh take on {product}: thoughtfully made, easy to love and ready for everyday moments.");
    }

    let content_type = prompt
        .lines()
        .find_map(|l| l.strip_prefix("**Content Type:** "))
        .unwrap_or("")
        .trim();
    match content_type {
        "Ad Copy" => format!(
            "### Ad 1: Meet {product}\nDesigned to stand out and built to last. Order today.\n\n\
            ### Ad 2: Your New Favourite\n{product} brings quiet confidence to every day. Shop now."
        ),
        "Email Campaign" => format!(
            "### Subject Line\nSay hello to {product}\n\n\
            ### Email Body\nHi there,\n\nWe made {product} for people who care about the details.\n\n[Shop Now]"
        ),
        _ => format!(
            "### {product}\n{product} pairs careful craftsmanship with everyday practicality.\n\n\
            ### Why You'll Love It\nIt looks great, feels great and is made to last.\n\n\
            ### Get Yours\nOrder {product} today."
        ),
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Other(serde::de::IgnoredAny),
}
