//! Fathom notetaker ingestion.
//!
//! The notetaker posts a webhook when a recording finishes processing. Each
//! delivery is deduplicated against the sync log, attributed to a client via
//! the email-domain mapping table, then run through the same analysis
//! pipeline as manually submitted transcripts. Webhooks redeliver, so the
//! whole path is idempotent: a recording already marked processed is skipped,
//! while failed or unmatched recordings may be retried.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{self, MeetingSubmission, TranscriptAnalyzer};
use crate::errors::AppError;
use crate::models::{Author, EmailDomainMapping};
use crate::store::DashboardStorage;

/// Attribution identity for auto-imported meetings.
pub const SYNC_AUTHOR_EMAIL: &str = "fathom-sync@system";
pub const SYNC_AUTHOR_NAME: &str = "Fathom (auto-sync)";

/// One speaker turn of a Fathom transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    #[serde(default)]
    pub speaker_name: String,
    #[serde(default)]
    pub speaker_email: Option<String>,
    #[serde(default)]
    pub text: String,
}

/// Fathom delivers transcripts either pre-joined or as speaker turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TranscriptBody {
    Text(String),
    Entries(Vec<TranscriptEntry>),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Invitee {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Webhook payload for one finished recording. Field aliases absorb the
/// naming drift between direct Fathom webhooks and relay integrations.
#[derive(Debug, Clone, Deserialize)]
pub struct FathomRecording {
    #[serde(alias = "id")]
    pub recording_id: String,
    #[serde(default, alias = "meeting_title")]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "scheduled_start_time")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "invitees")]
    pub calendar_invitees: Vec<Invitee>,
    #[serde(default)]
    pub transcript: Option<TranscriptBody>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Processed,
    SkippedDuplicate,
    Unmatched,
    NoTranscript,
}

/// What happened to one delivered recording.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub recording_id: String,
    pub title: String,
    pub status: IngestStatus,
    pub client_name: Option<String>,
    pub meeting_id: Option<Uuid>,
}

/// Joins transcript turns into "Speaker: text" lines; pre-joined text passes
/// through trimmed.
pub fn flatten_transcript(recording: &FathomRecording) -> String {
    match &recording.transcript {
        Some(TranscriptBody::Text(text)) => text.trim().to_string(),
        Some(TranscriptBody::Entries(entries)) => entries
            .iter()
            .map(|entry| format!("{}: {}", entry.speaker_name, entry.text))
            .collect::<Vec<_>>()
            .join("\n"),
        None => String::new(),
    }
}

/// Attributes a recording to a client.
///
/// Tried in order: invitee emails (full address, then domain), speaker emails
/// from the transcript, and finally a known client name appearing in the
/// recording title.
pub fn match_client(
    recording: &FathomRecording,
    mappings: &[EmailDomainMapping],
) -> Option<String> {
    let lookup = |email: &str| -> Option<String> {
        let email = email.to_lowercase();
        for mapping in mappings {
            if mapping.domain.to_lowercase() == email {
                return Some(mapping.client_name.clone());
            }
        }
        let domain = email.split('@').nth(1)?;
        for mapping in mappings {
            if mapping.domain.to_lowercase() == domain {
                return Some(mapping.client_name.clone());
            }
        }
        None
    };

    for invitee in &recording.calendar_invitees {
        if let Some(email) = &invitee.email {
            if let Some(client) = lookup(email) {
                return Some(client);
            }
        }
    }

    if let Some(TranscriptBody::Entries(entries)) = &recording.transcript {
        for entry in entries {
            if let Some(email) = &entry.speaker_email {
                if let Some(client) = lookup(email) {
                    return Some(client);
                }
            }
        }
    }

    let title = recording.title.as_deref().unwrap_or_default().to_lowercase();
    if !title.is_empty() {
        for mapping in mappings {
            if title.contains(&mapping.client_name.to_lowercase()) {
                return Some(mapping.client_name.clone());
            }
        }
    }

    None
}

/// Runs one recording through dedup, matching, and the analysis pipeline.
pub async fn ingest_recording(
    analyzer: &TranscriptAnalyzer,
    storage: &DashboardStorage,
    recording: &FathomRecording,
) -> Result<IngestOutcome, AppError> {
    let title = recording
        .title
        .clone()
        .unwrap_or_else(|| "Fathom Meeting".to_string());

    if let Some(existing) = storage.find_fathom_sync(&recording.recording_id).await? {
        if existing.status == "processed" {
            tracing::info!(
                "Recording {} already processed, skipping",
                recording.recording_id
            );
            return Ok(IngestOutcome {
                recording_id: recording.recording_id.clone(),
                title,
                status: IngestStatus::SkippedDuplicate,
                client_name: existing.client_name,
                meeting_id: existing.meeting_id,
            });
        }
    }

    let transcript = flatten_transcript(recording);
    if transcript.is_empty() {
        storage
            .upsert_fathom_sync(
                &recording.recording_id,
                None,
                None,
                "failed",
                recording.title.as_deref(),
                recording.url.as_deref(),
                Some("No transcript available, recording may still be processing"),
            )
            .await?;
        return Ok(IngestOutcome {
            recording_id: recording.recording_id.clone(),
            title,
            status: IngestStatus::NoTranscript,
            client_name: None,
            meeting_id: None,
        });
    }

    let mappings = storage.list_domain_mappings().await?;
    let client_name = match match_client(recording, &mappings) {
        Some(name) => name,
        None => {
            storage
                .upsert_fathom_sync(
                    &recording.recording_id,
                    None,
                    None,
                    "unmatched",
                    recording.title.as_deref(),
                    recording.url.as_deref(),
                    Some("No email domain mapping matched this recording"),
                )
                .await?;
            return Ok(IngestOutcome {
                recording_id: recording.recording_id.clone(),
                title,
                status: IngestStatus::Unmatched,
                client_name: None,
                meeting_id: None,
            });
        }
    };

    let meeting_date = recording
        .scheduled_at
        .or(recording.created_at)
        .unwrap_or_else(Utc::now)
        .date_naive();

    let submission = MeetingSubmission {
        client_name: client_name.clone(),
        transcript,
        meeting_date,
        meeting_title: recording.title.clone(),
        source: Some("fathom".to_string()),
        author: Author {
            user_email: Some(SYNC_AUTHOR_EMAIL.to_string()),
            display_name: Some(SYNC_AUTHOR_NAME.to_string()),
        },
    };

    let outcome = analysis::process_and_save(analyzer, storage, &submission).await?;

    storage
        .upsert_fathom_sync(
            &recording.recording_id,
            Some(&client_name),
            Some(outcome.meeting.id),
            "processed",
            recording.title.as_deref(),
            recording.url.as_deref(),
            None,
        )
        .await?;

    Ok(IngestOutcome {
        recording_id: recording.recording_id.clone(),
        title,
        status: IngestStatus::Processed,
        client_name: Some(client_name),
        meeting_id: Some(outcome.meeting.id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(domain: &str, client: &str) -> EmailDomainMapping {
        EmailDomainMapping {
            id: Uuid::new_v4(),
            domain: domain.to_string(),
            client_name: client.to_string(),
            created_at: Utc::now(),
        }
    }

    fn recording_with_invitee(email: &str) -> FathomRecording {
        serde_json::from_value(serde_json::json!({
            "recording_id": "rec-1",
            "title": "Weekly sync",
            "calendar_invitees": [{ "email": email }],
        }))
        .unwrap()
    }

    #[test]
    fn webhook_payload_accepts_id_alias_and_joined_transcript() {
        let recording: FathomRecording = serde_json::from_value(serde_json::json!({
            "id": "rec-42",
            "meeting_title": "Kickoff",
            "transcript": "Jordan: hello\nSam: hi",
        }))
        .unwrap();
        assert_eq!(recording.recording_id, "rec-42");
        assert_eq!(recording.title.as_deref(), Some("Kickoff"));
        assert_eq!(flatten_transcript(&recording), "Jordan: hello\nSam: hi");
    }

    #[test]
    fn speaker_turns_flatten_to_labeled_lines() {
        let recording: FathomRecording = serde_json::from_value(serde_json::json!({
            "recording_id": "rec-2",
            "transcript": [
                { "speaker_name": "Jordan", "text": "hello" },
                { "speaker_name": "Sam", "speaker_email": "sam@acme.com", "text": "hi" },
            ],
        }))
        .unwrap();
        assert_eq!(flatten_transcript(&recording), "Jordan: hello\nSam: hi");
    }

    #[test]
    fn missing_transcript_flattens_to_empty() {
        let recording: FathomRecording =
            serde_json::from_value(serde_json::json!({ "recording_id": "rec-3" })).unwrap();
        assert_eq!(flatten_transcript(&recording), "");
    }

    #[test]
    fn invitee_domain_wins_over_title() {
        let mappings = vec![
            mapping("acmerealty.com", "Acme Realty"),
            mapping("zenith.io", "Zenith Group"),
        ];
        let recording = recording_with_invitee("broker@AcmeRealty.com");
        assert_eq!(
            match_client(&recording, &mappings).as_deref(),
            Some("Acme Realty")
        );
    }

    #[test]
    fn full_address_mapping_beats_domain_mapping() {
        let mappings = vec![
            mapping("jane@shared-broker.com", "Acme Realty"),
            mapping("shared-broker.com", "Zenith Group"),
        ];
        let recording = recording_with_invitee("jane@shared-broker.com");
        assert_eq!(
            match_client(&recording, &mappings).as_deref(),
            Some("Acme Realty")
        );
    }

    #[test]
    fn speaker_email_matches_when_invitees_do_not() {
        let mappings = vec![mapping("acme.com", "Acme Realty")];
        let recording: FathomRecording = serde_json::from_value(serde_json::json!({
            "recording_id": "rec-4",
            "calendar_invitees": [{ "email": "csm@agency.internal" }],
            "transcript": [
                { "speaker_name": "Sam", "speaker_email": "sam@acme.com", "text": "hi" },
            ],
        }))
        .unwrap();
        assert_eq!(
            match_client(&recording, &mappings).as_deref(),
            Some("Acme Realty")
        );
    }

    #[test]
    fn title_mention_is_the_last_resort() {
        let mappings = vec![mapping("zenith.io", "Zenith Group")];
        let recording: FathomRecording = serde_json::from_value(serde_json::json!({
            "recording_id": "rec-5",
            "title": "Zenith Group - monthly review",
        }))
        .unwrap();
        assert_eq!(
            match_client(&recording, &mappings).as_deref(),
            Some("Zenith Group")
        );

        let unknown = recording_with_invitee("someone@nowhere.org");
        assert_eq!(match_client(&unknown, &mappings), None);
    }
}
