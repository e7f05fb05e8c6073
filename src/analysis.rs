//! Meeting-transcript analysis pipeline.
//!
//! A transcript goes through three stages: model analysis, persistence, and
//! best-effort side effects. Only persistence can fail the pipeline. When the
//! model call or its output parsing fails, a fallback payload is substituted
//! and the transcript is saved anyway; losing a recorded meeting because an
//! LLM timed out is not acceptable. Side-effect note creation and activity
//! logging are fire-and-forget: failures are logged and swallowed.

use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::Config;
use crate::errors::AppError;
use crate::metrics::Severity;
use crate::models::{AnalysisPayload, Author, Meeting, Priority, RiskLevel};
use crate::store::DashboardStorage;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Calls the Anthropic messages API and normalizes the response into an
/// `AnalysisPayload`.
pub struct TranscriptAnalyzer {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl TranscriptAnalyzer {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.anthropic_base_url.trim_end_matches('/').to_string(),
            api_key: config.anthropic_api_key.clone(),
            model: config.anthropic_model.clone(),
        }
    }

    /// Analyzes a transcript. Errors here are recoverable: the caller
    /// substitutes `AnalysisPayload::fallback` and proceeds.
    pub async fn analyze(
        &self,
        client_name: &str,
        transcript: &str,
    ) -> Result<AnalysisPayload, AppError> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": build_prompt(client_name, transcript),
            }],
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Analysis request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            AppError::ExternalApiError(format!("Analysis response read failed: {}", e))
        })?;

        if !status.is_success() {
            return Err(AppError::ExternalApiError(format!(
                "Analysis API returned status {}",
                status
            )));
        }

        let parsed: MessagesResponse = serde_json::from_str(&text).map_err(|e| {
            AppError::ExternalApiError(format!("Analysis response decode failed: {}", e))
        })?;

        let model_text = parsed
            .content
            .iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .ok_or_else(|| {
                AppError::ExternalApiError("Analysis response had no text content".to_string())
            })?;

        parse_model_json(model_text)
    }
}

fn build_prompt(client_name: &str, transcript: &str) -> String {
    format!(
        "You are an assistant for a client-success team at a real-estate lead \
         generation agency. Analyze this meeting transcript for the client \
         \"{client_name}\" and respond with ONLY a JSON object, no prose, with \
         these keys:\n\
         - title: short descriptive meeting title\n\
         - summary: 2-3 sentence summary\n\
         - duration: meeting length if mentioned, else null\n\
         - participants: array of participant names\n\
         - topics: array of topics discussed\n\
         - clientSentiment: one of positive, neutral, negative, frustrated, excited, concerned\n\
         - sentimentExplanation: one sentence explaining the sentiment\n\
         - keyPoints: array of the most important points\n\
         - actionItems: array of {{task, owner, dueDate, priority}} with priority low/medium/high\n\
         - decisions: array of decisions made\n\
         - concerns: array of concerns the client raised\n\
         - followUpNeeded: boolean\n\
         - followUpItems: array of follow-ups\n\
         - riskLevel: one of low, medium, high (churn risk)\n\
         - riskFactors: array of churn risk factors\n\
         - importantNotes: array of notes the team must not lose\n\
         - nextSteps: array of next steps\n\
         - clientRequests: array of explicit client requests\n\
         - positiveSignals: array of positive signals\n\
         - warningSignals: array of warning signals\n\n\
         Transcript:\n{transcript}"
    )
}

/// Extracts an `AnalysisPayload` from raw model output.
///
/// Models wrap JSON in markdown fences or append prose despite instructions,
/// so extraction is tried in order: fenced block, whole string, first
/// balanced JSON object found by brace scanning.
pub fn parse_model_json(raw: &str) -> Result<AnalysisPayload, AppError> {
    let trimmed = raw.trim();

    if let Some(inner) = strip_fence(trimmed) {
        if let Ok(payload) = serde_json::from_str(inner) {
            return Ok(payload);
        }
    }

    if let Ok(payload) = serde_json::from_str(trimmed) {
        return Ok(payload);
    }

    if let Some(object) = first_json_object(trimmed) {
        if let Ok(payload) = serde_json::from_str(object) {
            return Ok(payload);
        }
    }

    Err(AppError::ExternalApiError(
        "Analysis output was not valid JSON".to_string(),
    ))
}

fn strip_fence(text: &str) -> Option<&str> {
    let rest = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))?;
    let end = rest.rfind("```")?;
    Some(rest[..end].trim())
}

/// Finds the first balanced top-level JSON object, respecting strings and
/// escapes.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Request to run the full pipeline for one transcript.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingSubmission {
    pub client_name: String,
    pub transcript: String,
    pub meeting_date: NaiveDate,
    #[serde(default)]
    pub meeting_title: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(flatten)]
    pub author: Author,
}

/// Outcome of a pipeline run: the stored meeting plus whether analysis
/// degraded to the fallback payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub meeting: Meeting,
    pub analysis_failed: bool,
}

/// Analyze, persist, then fan out side effects.
pub async fn process_and_save(
    analyzer: &TranscriptAnalyzer,
    storage: &DashboardStorage,
    submission: &MeetingSubmission,
) -> Result<PipelineOutcome, AppError> {
    let (payload, analysis_failed) = match analyzer
        .analyze(&submission.client_name, &submission.transcript)
        .await
    {
        Ok(payload) => (payload, false),
        Err(e) => {
            tracing::warn!(
                "Analysis failed for {}, saving with fallback: {}",
                submission.client_name,
                e
            );
            (AnalysisPayload::fallback(&e.to_string()), true)
        }
    };

    let title = submission
        .meeting_title
        .clone()
        .or_else(|| payload.title.clone())
        .unwrap_or_else(|| format!("Meeting with {}", submission.client_name));
    let source = submission.source.as_deref().unwrap_or("dashboard");

    let meeting = storage
        .insert_meeting(
            &submission.client_name,
            submission.meeting_date,
            &title,
            &submission.transcript,
            &payload,
            &submission.author,
            source,
        )
        .await?;

    fan_out_notes(storage, submission, &payload, &title).await;

    if let Err(e) = storage
        .log_activity(
            submission.author.user_email.as_deref(),
            &submission.client_name,
            "meeting_analyzed",
            &format!("Meeting \"{}\" analyzed and saved", title),
        )
        .await
    {
        tracing::warn!("Activity log write failed: {}", e);
    }

    Ok(PipelineOutcome {
        meeting,
        analysis_failed,
    })
}

/// Surfaces the analysis highlights as client notes. Every write here is
/// best-effort; a failed note never fails the meeting.
async fn fan_out_notes(
    storage: &DashboardStorage,
    submission: &MeetingSubmission,
    payload: &AnalysisPayload,
    title: &str,
) {
    let prefix = format!("[{} - {}]", title, submission.meeting_date);

    for note in &payload.important_notes {
        let text = format!("{} {}", prefix, note);
        if let Err(e) = storage
            .add_note(
                &submission.client_name,
                &text,
                &submission.author,
                true,
                "ai_extracted",
            )
            .await
        {
            tracing::warn!("Important-note write failed: {}", e);
        }
    }

    for item in payload
        .action_items
        .iter()
        .filter(|item| item.priority == Priority::High)
    {
        let text = match item.owner.trim() {
            "" => format!("{} Action item (high priority): {}", prefix, item.task),
            owner => format!(
                "{} Action item (high priority): {} ({})",
                prefix, item.task, owner
            ),
        };
        if let Err(e) = storage
            .add_note(
                &submission.client_name,
                &text,
                &submission.author,
                true,
                "ai_extracted",
            )
            .await
        {
            tracing::warn!("Action-item note write failed: {}", e);
        }
    }

    if payload.risk_level == RiskLevel::High && !payload.concerns.is_empty() {
        let text = format!(
            "{} High churn risk. Concerns: {}",
            prefix,
            payload.concerns.join("; ")
        );
        if let Err(e) = storage
            .add_note(
                &submission.client_name,
                &text,
                &submission.author,
                true,
                "ai_extracted",
            )
            .await
        {
            tracing::warn!("Risk-summary note write failed: {}", e);
        }
    }
}

/// Maps a risk level onto the shared severity scale for the risk overview.
pub fn risk_severity(risk: RiskLevel) -> Severity {
    match risk {
        RiskLevel::Low => Severity::Low,
        RiskLevel::Medium => Severity::Medium,
        RiskLevel::High => Severity::High,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let payload = parse_model_json(r#"{"summary":"Quick sync","topics":["budget"]}"#).unwrap();
        assert_eq!(payload.summary, "Quick sync");
        assert_eq!(payload.topics, vec!["budget"]);
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"summary\":\"Fenced\"}\n```";
        assert_eq!(parse_model_json(raw).unwrap().summary, "Fenced");

        let raw = "```\n{\"summary\":\"Bare fence\"}\n```";
        assert_eq!(parse_model_json(raw).unwrap().summary, "Bare fence");
    }

    #[test]
    fn parses_json_with_trailing_prose() {
        let raw = "Here is the analysis:\n{\"summary\":\"Embedded\"}\nLet me know if you need more.";
        assert_eq!(parse_model_json(raw).unwrap().summary, "Embedded");
    }

    #[test]
    fn brace_scan_respects_strings() {
        let raw = r#"noise {"summary":"has a } in a string","topics":[]} tail"#;
        assert_eq!(parse_model_json(raw).unwrap().summary, "has a } in a string");
    }

    #[test]
    fn garbage_output_is_an_error() {
        assert!(parse_model_json("I could not analyze this transcript.").is_err());
        assert!(parse_model_json("").is_err());
        assert!(parse_model_json("{\"unterminated\": ").is_err());
    }

    #[test]
    fn prompt_embeds_client_and_transcript() {
        let prompt = build_prompt("Acme Co", "hello world");
        assert!(prompt.contains("Acme Co"));
        assert!(prompt.contains("hello world"));
        assert!(prompt.contains("clientSentiment"));
    }

    #[test]
    fn risk_maps_onto_severity() {
        assert_eq!(risk_severity(RiskLevel::High), Severity::High);
        assert_eq!(risk_severity(RiskLevel::Low), Severity::Low);
    }
}
