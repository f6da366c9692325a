//! Response decoding
//!
//! `generate` endpoints answer with newline-delimited JSON: zero or more
//! fragments (`done: false`) followed by one terminal chunk (`done: true`)
//! carrying server-side timing and token counts. A non-streamed `generate`
//! answer is the same framing with a single line. The OpenAI-style
//! `completions` and `embeddings` endpoints return one JSON document with a
//! `usage` block instead.

use crate::config::EndpointKind;
use crate::dispatch::RawOutcome;
use crate::error::{DecodeError, RequestError};
use serde::Deserialize;
use tracing::debug;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// What we know about one request after decoding its response.
///
/// Every metadata field is optional: an empty payload decodes to a record
/// with nothing but an empty `generated_text`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedRecord {
    pub generated_text: String,
    pub total_duration_seconds: Option<f64>,
    pub eval_duration_seconds: Option<f64>,
    pub eval_token_count: Option<u64>,
    pub prompt_token_count: Option<u64>,
    /// Wall-clock time from send to end of body, measured by the client
    pub client_latency_seconds: Option<f64>,
    /// Wall-clock time from send to the first body chunk
    pub time_to_first_byte_seconds: Option<f64>,
}

impl DecodedRecord {
    /// Terminal metadata is present; the record counts as a successful sample.
    pub fn has_terminal_metadata(&self) -> bool {
        self.total_duration_seconds.is_some()
    }

    fn has_usage(&self) -> bool {
        self.eval_token_count.is_some() || self.prompt_token_count.is_some()
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawChunk {
    done: Option<bool>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    total_duration: Option<u64>,
    #[serde(default)]
    eval_duration: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
}

/// Metadata carried by the `done: true` chunk.
#[derive(Debug, Clone, Default, PartialEq)]
struct TerminalChunk {
    response: Option<String>,
    total_duration: Option<u64>,
    eval_duration: Option<u64>,
    eval_count: Option<u64>,
    prompt_eval_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
enum StreamChunk {
    Fragment(String),
    Terminal(TerminalChunk),
}

impl TryFrom<RawChunk> for StreamChunk {
    type Error = DecodeError;

    fn try_from(raw: RawChunk) -> Result<Self, DecodeError> {
        match raw.done {
            Some(false) => raw
                .response
                .map(StreamChunk::Fragment)
                .ok_or(DecodeError::MissingField("response")),
            Some(true) => Ok(StreamChunk::Terminal(TerminalChunk {
                response: raw.response,
                total_duration: raw.total_duration,
                eval_duration: raw.eval_duration,
                eval_count: raw.eval_count,
                prompt_eval_count: raw.prompt_eval_count,
            })),
            None => Err(DecodeError::MissingField("done")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionDocument {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDocument {
    #[serde(default)]
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
}

// ============================================================================
// Streaming Decoder
// ============================================================================

/// Incremental NDJSON decoder.
///
/// Bytes can be fed in arbitrary pieces; a line split across two pieces is
/// buffered until its newline arrives. Fragments are kept in arrival order.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    pending: Vec<u8>,
    line_no: usize,
    text: String,
    terminal: Option<TerminalChunk>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a piece of the payload, decoding every complete line in it.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.decode_line(&line[..pos])?;
        }
        Ok(())
    }

    /// Decode any trailing unterminated line and build the record.
    pub fn finish(mut self) -> Result<DecodedRecord, DecodeError> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.decode_line(&rest)?;
        }

        let terminal = self.terminal.unwrap_or_default();
        Ok(DecodedRecord {
            generated_text: self.text,
            total_duration_seconds: terminal.total_duration.map(nanos_to_secs),
            eval_duration_seconds: terminal.eval_duration.map(nanos_to_secs),
            eval_token_count: terminal.eval_count,
            prompt_token_count: terminal.prompt_eval_count,
            client_latency_seconds: None,
            time_to_first_byte_seconds: None,
        })
    }

    fn decode_line(&mut self, raw: &[u8]) -> Result<(), DecodeError> {
        self.line_no += 1;
        let line = std::str::from_utf8(raw)?.trim();
        if line.is_empty() {
            return Ok(());
        }

        let chunk: RawChunk = serde_json::from_str(line).map_err(|source| DecodeError::Json {
            line: self.line_no,
            source,
        })?;

        match StreamChunk::try_from(chunk)? {
            StreamChunk::Fragment(fragment) => self.text.push_str(&fragment),
            StreamChunk::Terminal(mut terminal) => {
                if let Some(tail) = terminal.response.take() {
                    self.text.push_str(&tail);
                }
                if self.terminal.is_some() {
                    debug!(line = self.line_no, "replacing earlier terminal chunk");
                }
                self.terminal = Some(terminal);
            }
        }
        Ok(())
    }
}

fn nanos_to_secs(ns: u64) -> f64 {
    ns as f64 / NANOS_PER_SEC
}

/// Decode a complete NDJSON payload. An empty payload gives an all-absent record.
pub fn decode_stream(payload: &[u8]) -> Result<DecodedRecord, DecodeError> {
    let mut decoder = StreamDecoder::new();
    decoder.feed(payload)?;
    decoder.finish()
}

/// Decode a single non-streaming document for `kind`.
pub fn decode_document(kind: EndpointKind, payload: &[u8]) -> Result<DecodedRecord, DecodeError> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Ok(DecodedRecord::default());
    }

    match kind {
        EndpointKind::Generate => decode_stream(payload),
        EndpointKind::Completions => {
            let doc: CompletionDocument = parse_document(payload)?;
            let usage = doc.usage;
            Ok(DecodedRecord {
                generated_text: doc
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.text)
                    .unwrap_or_default(),
                eval_token_count: usage.as_ref().and_then(|u| u.completion_tokens),
                prompt_token_count: usage.as_ref().and_then(|u| u.prompt_tokens),
                ..Default::default()
            })
        }
        EndpointKind::Embeddings => {
            let doc: EmbeddingDocument = parse_document(payload)?;
            Ok(DecodedRecord {
                prompt_token_count: doc.usage.and_then(|u| u.prompt_tokens),
                ..Default::default()
            })
        }
    }
}

fn parse_document<'a, T: Deserialize<'a>>(payload: &'a [u8]) -> Result<T, DecodeError> {
    serde_json::from_slice(payload).map_err(|source| DecodeError::Json { line: 1, source })
}

/// Turn a dispatcher outcome into a decoded record or the request's error.
///
/// Client-side timings are copied onto the record. OpenAI-style documents
/// report no server timing, so for them the client latency stands in for
/// the total duration whenever a usage block was returned.
pub fn decode_outcome(
    kind: EndpointKind,
    streaming: bool,
    outcome: RawOutcome,
) -> Result<DecodedRecord, RequestError> {
    let response = match outcome {
        RawOutcome::Success(response) => response,
        RawOutcome::Failure(e) => return Err(e),
    };

    let mut record = if streaming {
        decode_stream(&response.body)?
    } else {
        decode_document(kind, &response.body)?
    };

    let latency = response.latency.as_secs_f64();
    record.client_latency_seconds = Some(latency);
    record.time_to_first_byte_seconds = response.time_to_first_byte.map(|d| d.as_secs_f64());

    if kind != EndpointKind::Generate && record.total_duration_seconds.is_none() && record.has_usage()
    {
        record.total_duration_seconds = Some(latency);
    }

    Ok(record)
}
