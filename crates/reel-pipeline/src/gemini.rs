//! Gemini client for highlight extraction and captions.
//!
//! The transcript is sent one segment per line; the model answers with a JSON
//! array of `{start, end}` ranges. Ranges outside the duration bounds or
//! overlapping an earlier range are dropped, and the whole request is retried
//! when nothing usable is left.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use reel_models::transcript::{format_for_prompt, text_in_range};
use reel_models::{parse_timestamp, HighlightCandidate, TranscriptSegment};

use crate::config::{PipelineConfig, DEFAULT_GEMINI_BASE_URL};
use crate::error::{PipelineError, PipelineResult};
use crate::retry::{retry_async, RetryConfig};

/// Models tried in order until one answers.
const DEFAULT_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.5-flash-lite", "gemini-2.5-pro"];

/// Accepted slack around the duration bounds, in seconds.
const DURATION_TOLERANCE_SECS: f64 = 1.0;

const TEMPERATURE: f64 = 0.2;

/// Gemini API request.
#[derive(Debug, Serialize)]
struct GeminiRequest {
    #[serde(rename = "systemInstruction")]
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
    temperature: f64,
}

/// Gemini API response.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

/// Models sometimes return bare seconds and sometimes timestamp strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TimeValue {
    Seconds(f64),
    Text(String),
}

impl TimeValue {
    fn seconds(&self) -> Option<f64> {
        match self {
            TimeValue::Seconds(s) => Some(*s),
            TimeValue::Text(t) => parse_timestamp(t).ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawHighlight {
    start: TimeValue,
    end: TimeValue,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HighlightsPayload {
    List(Vec<RawHighlight>),
    Wrapped { highlights: Vec<RawHighlight> },
}

impl HighlightsPayload {
    fn into_vec(self) -> Vec<RawHighlight> {
        match self {
            HighlightsPayload::List(v) => v,
            HighlightsPayload::Wrapped { highlights } => highlights,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CaptionResponse {
    caption_with_hashtags: String,
}

/// Highlight extraction client.
#[derive(Debug, Clone)]
pub struct HighlightClient {
    api_key: String,
    base_url: String,
    models: Vec<String>,
    client: Client,
    min_secs: f64,
    max_secs: f64,
    generate_captions: bool,
    retry: RetryConfig,
}

impl HighlightClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            client: Client::new(),
            min_secs: 30.0,
            max_secs: 60.0,
            generate_captions: true,
            retry: RetryConfig::new("highlight extraction").with_max_retries(2),
        }
    }

    /// Build a client from config; `None` without an API key.
    pub fn from_config(config: &PipelineConfig) -> Option<Self> {
        let api_key = config.gemini_api_key.clone()?;
        Some(
            Self::new(api_key)
                .with_base_url(config.gemini_base_url.clone())
                .with_duration_bounds(config.min_clip_secs, config.max_clip_secs)
                .with_captions(config.generate_captions),
        )
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_duration_bounds(mut self, min_secs: f64, max_secs: f64) -> Self {
        self.min_secs = min_secs;
        self.max_secs = max_secs;
        self
    }

    pub fn with_captions(mut self, enabled: bool) -> Self {
        self.generate_captions = enabled;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Extract highlight candidates from transcript segments.
    ///
    /// A transcript without segments yields no candidates and makes no request.
    pub async fn extract(
        &self,
        segments: &[TranscriptSegment],
    ) -> PipelineResult<Vec<HighlightCandidate>> {
        if segments.is_empty() {
            debug!("Transcript has no segments, skipping highlight extraction");
            return Ok(Vec::new());
        }

        let system = self.highlight_instruction();
        let prompt = format!("Transcription:\n{}", format_for_prompt(segments));

        let mut candidates =
            retry_async(&self.retry, || self.extract_once(&system, &prompt)).await?;

        if self.generate_captions {
            for candidate in candidates.iter_mut() {
                let text = text_in_range(segments, candidate.start, candidate.end);
                match self.caption(&text).await {
                    Ok(caption) => candidate.caption = caption,
                    Err(e) => warn!(
                        start = candidate.start,
                        end = candidate.end,
                        "Caption generation failed: {}",
                        e
                    ),
                }
            }
        }

        info!(count = candidates.len(), "Extracted highlights");
        Ok(candidates)
    }

    async fn extract_once(
        &self,
        system: &str,
        prompt: &str,
    ) -> PipelineResult<Vec<HighlightCandidate>> {
        let text = self.generate(system, prompt).await?;
        let raw: HighlightsPayload = serde_json::from_str(&text).map_err(|e| {
            PipelineError::extraction_failed(format!("Failed to parse highlights JSON: {}", e))
        })?;

        let candidates = self.select(raw.into_vec());
        if candidates.is_empty() {
            return Err(PipelineError::extraction_failed(format!(
                "no highlights between {} and {} seconds",
                self.min_secs, self.max_secs
            )));
        }
        Ok(candidates)
    }

    /// Keep well-formed ranges within the duration bounds, sorted by start,
    /// dropping any range that overlaps one kept before it.
    fn select(&self, raw: Vec<RawHighlight>) -> Vec<HighlightCandidate> {
        let total = raw.len().max(1) as f64;
        let min = self.min_secs - DURATION_TOLERANCE_SECS;
        let max = self.max_secs + DURATION_TOLERANCE_SECS;

        let mut valid: Vec<HighlightCandidate> = raw
            .into_iter()
            .enumerate()
            .filter_map(|(i, h)| {
                let (start, end) = (h.start.seconds()?, h.end.seconds()?);
                let duration = end - start;
                if !(start >= 0.0 && start < end && duration >= min && duration <= max) {
                    debug!(start, end, "Dropping highlight outside duration bounds");
                    return None;
                }
                // Without a score, earlier answers rank higher
                let score = h.score.unwrap_or((total - i as f64) / total);
                let mut candidate = HighlightCandidate::new(start, end, score);
                candidate.title = h.title;
                candidate.reason = h.reason;
                Some(candidate)
            })
            .collect();

        reel_models::highlight::sort_by_start(&mut valid);

        let mut kept: Vec<HighlightCandidate> = Vec::with_capacity(valid.len());
        for candidate in valid {
            match kept.last() {
                Some(prev) if candidate.start < prev.end => {
                    debug!(
                        start = candidate.start,
                        end = candidate.end,
                        "Dropping overlapping highlight"
                    );
                }
                _ => kept.push(candidate),
            }
        }
        kept
    }

    async fn caption(&self, segment_text: &str) -> PipelineResult<Option<String>> {
        if segment_text.trim().is_empty() {
            return Ok(None);
        }
        let text = self.generate(CAPTION_INSTRUCTION, segment_text).await?;
        let parsed: CaptionResponse = serde_json::from_str(&text).map_err(|e| {
            PipelineError::extraction_failed(format!("Failed to parse caption JSON: {}", e))
        })?;
        let caption = parsed.caption_with_hashtags.trim().to_string();
        Ok((!caption.is_empty()).then_some(caption))
    }

    /// Run one prompt against the model list, returning the first answer.
    async fn generate(&self, system: &str, prompt: &str) -> PipelineResult<String> {
        let mut last_error = None;

        for model in &self.models {
            debug!("Attempting Gemini API with model: {}", model);
            match self.call_gemini_api(model, system, prompt).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!("Failed with model {}: {}", model, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| PipelineError::extraction_failed("No Gemini models configured")))
    }

    async fn call_gemini_api(&self, model: &str, system: &str, prompt: &str) -> PipelineResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let request = GeminiRequest {
            system_instruction: Content {
                parts: vec![Part {
                    text: system.to_string(),
                }],
            },
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: TEMPERATURE,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::extraction_failed(format!("Gemini API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::extraction_failed(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            PipelineError::extraction_failed(format!("Failed to parse Gemini response: {}", e))
        })?;

        let text = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| PipelineError::extraction_failed("No content in Gemini response"))?;

        Ok(strip_code_fence(text).to_string())
    }

    fn highlight_instruction(&self) -> String {
        format!(
            r#"Act as a social media content creator. Extract as many non-overlapping segments as possible from the provided transcript that would be engaging as short video clips.
Return ONLY a JSON array of objects with the keys "start" and "end" (seconds or HH:MM:SS.ss timestamps taken from the transcript), plus optional "score" (0 to 1), "title" and "reason".

Selection Criteria:
- Key points, explanations, questions, conclusions or otherwise engaging moments.
- Complete thoughts or sentences.

Duration Requirements:
- Each segment (end - start) must last between {min} and {max} seconds.
- Segments must not overlap.

Timestamp Accuracy:
- Use the exact timestamps from the transcript lines, which look like [start] Speaker: text [end]."#,
            min = self.min_secs,
            max = self.max_secs
        )
    }
}

const CAPTION_INSTRUCTION: &str = r#"You are given the text of a short video clip.
Write one engaging social media description for it followed by 3 to 5 relevant hashtags.
Return ONLY a JSON object of the form {"caption_with_hashtags": "Description text. #tag1 #tag2 #tag3"}."#;

/// Strip a surrounding markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}
