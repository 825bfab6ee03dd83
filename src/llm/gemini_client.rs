use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::{FragmentStream, GenerationBackend};
use crate::config::Config;
use crate::errors::AppError;

/// Streaming client for the Gemini `streamGenerateContent` endpoint.
///
/// The response is a server-sent-event stream of JSON payloads; each
/// payload carries zero or more text parts which are forwarded as
/// fragments in arrival order.
pub struct GeminiBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiBackend {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let api_key = config
            .gemini_api_key
            .clone()
            .ok_or_else(|| AppError::ConfigError("GEMINI_API_KEY must be set".to_string()))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: config.gemini_api_base_url.clone(),
            api_key,
            model: config.chat_model.clone(),
        })
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: i32,
}

#[derive(Deserialize)]
struct StreamPayload {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Accumulates raw response bytes and hands back complete lines. Lines
/// split at the byte level; decoding happens only once a full line has
/// arrived, so a multi-byte character straddling two network chunks
/// stays intact.
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn next_line(&mut self) -> Option<String> {
        let newline = self.buf.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buf.drain(..=newline).collect();
        Some(String::from_utf8_lossy(&line[..newline]).into_owned())
    }

    /// The bytes after the last newline, if any. Streams may end without
    /// a trailing newline on the final line.
    fn take_remainder(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Applies SSE framing to one line: non-`data:` lines and the `[DONE]`
/// sentinel produce nothing; a `data:` payload is parsed for text parts.
fn fragments_from_line(line: &str) -> Result<Vec<String>, serde_json::Error> {
    let Some(payload) = line.trim().strip_prefix("data:") else {
        return Ok(Vec::new());
    };
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return Ok(Vec::new());
    }
    extract_fragments(payload)
}

/// Parses one SSE `data:` payload and returns the non-empty text parts it
/// carries, in order.
fn extract_fragments(payload: &str) -> Result<Vec<String>, serde_json::Error> {
    let parsed: StreamPayload = serde_json::from_str(payload)?;
    Ok(parsed
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .map(|part| part.text)
        .filter(|text| !text.is_empty())
        .collect())
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn stream_generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: i32,
    ) -> FragmentStream {
        info!(
            prompt_length = prompt.len(),
            temperature, max_tokens, "Generating response"
        );

        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens: max_tokens,
            },
        };
        // The request is fully built here so the stream below owns it
        // without borrowing self or the prompt.
        let request = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body);

        Box::pin(async_stream::stream! {
            let response = match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(response) => response,
                Err(e) => {
                    let e = AppError::GenerationError(e.to_string());
                    error!(error = %e, "Error generating response");
                    yield format!("Error: {e}");
                    return;
                }
            };

            let mut bytes = response.bytes_stream();
            let mut buffer = LineBuffer::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let e = AppError::from(e);
                        error!(error = %e, "Error reading generation stream");
                        yield format!("Error: {e}");
                        return;
                    }
                };
                buffer.push(&chunk);

                while let Some(line) = buffer.next_line() {
                    match fragments_from_line(&line) {
                        Ok(fragments) => {
                            for fragment in fragments {
                                debug!(fragment_len = fragment.len(), "Forwarding fragment");
                                yield fragment;
                            }
                        }
                        Err(e) => {
                            let e = AppError::from(e);
                            error!(error = %e, "Malformed payload from generation backend");
                            yield format!("Error: {e}");
                            return;
                        }
                    }
                }
            }

            if let Some(line) = buffer.take_remainder() {
                match fragments_from_line(&line) {
                    Ok(fragments) => {
                        for fragment in fragments {
                            debug!(fragment_len = fragment.len(), "Forwarding fragment");
                            yield fragment;
                        }
                    }
                    Err(e) => {
                        let e = AppError::from(e);
                        error!(error = %e, "Malformed payload from generation backend");
                        yield format!("Error: {e}");
                    }
                }
            }
        })
    }
}
