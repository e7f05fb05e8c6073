//! Postgres persistence for operator-authored data.
//!
//! The sheets and Meta are read-only upstreams; everything operators create
//! through the dashboard (notes, meetings, the activity log, ad-account
//! mappings) lives here. Listing order is part of the contract: notes,
//! meetings, and activity are newest-first, mappings alphabetical.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    ActivityEntry, AdAccountMapping, AnalysisPayload, Author, EmailDomainMapping, FathomSyncEntry,
    Meeting, Note,
};

/// Lowercase string form of a serde-serialized enum, for text columns.
fn enum_text<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default()
}

pub struct DashboardStorage {
    pool: PgPool,
}

impl DashboardStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ============ Notes ============

    pub async fn list_notes(&self, client_name: &str) -> Result<Vec<Note>, AppError> {
        let notes = sqlx::query_as::<_, Note>(
            "SELECT id, client_name, note_text, user_email, source, is_important, \
                    edited_at, edited_by, created_at \
             FROM client_notes WHERE client_name = $1 ORDER BY created_at DESC",
        )
        .bind(client_name)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(notes)
    }

    /// Important notes across all clients, for the risk overview.
    pub async fn list_important_notes(&self) -> Result<Vec<Note>, AppError> {
        let notes = sqlx::query_as::<_, Note>(
            "SELECT id, client_name, note_text, user_email, source, is_important, \
                    edited_at, edited_by, created_at \
             FROM client_notes WHERE is_important = true ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(notes)
    }

    pub async fn add_note(
        &self,
        client_name: &str,
        note_text: &str,
        author: &Author,
        is_important: bool,
        source: &str,
    ) -> Result<Note, AppError> {
        let note = sqlx::query_as::<_, Note>(
            "INSERT INTO client_notes (client_name, note_text, user_email, source, is_important) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, client_name, note_text, user_email, source, is_important, \
                       edited_at, edited_by, created_at",
        )
        .bind(client_name)
        .bind(note_text)
        .bind(&author.user_email)
        .bind(source)
        .bind(is_important)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(note)
    }

    pub async fn update_note(
        &self,
        id: Uuid,
        note_text: &str,
        editor_email: Option<&str>,
    ) -> Result<Note, AppError> {
        let note = sqlx::query_as::<_, Note>(
            "UPDATE client_notes \
             SET note_text = $2, edited_at = now(), edited_by = $3 \
             WHERE id = $1 \
             RETURNING id, client_name, note_text, user_email, source, is_important, \
                       edited_at, edited_by, created_at",
        )
        .bind(id)
        .bind(note_text)
        .bind(editor_email)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        note.ok_or_else(|| AppError::NotFound(format!("Note {} not found", id)))
    }

    pub async fn delete_note(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM client_notes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Note {} not found", id)));
        }
        Ok(())
    }

    // ============ Meetings ============

    pub async fn list_meetings(&self, client_name: &str) -> Result<Vec<Meeting>, AppError> {
        let meetings = sqlx::query_as::<_, Meeting>(
            "SELECT id, client_name, meeting_date, meeting_title, transcript, summary, \
                    ad_performance_notes, source, user_email, created_by_name, created_at \
             FROM meetings WHERE client_name = $1 \
             ORDER BY meeting_date DESC, created_at DESC",
        )
        .bind(client_name)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(meetings)
    }

    pub async fn list_all_meetings(&self, limit: i64) -> Result<Vec<Meeting>, AppError> {
        let meetings = sqlx::query_as::<_, Meeting>(
            "SELECT id, client_name, meeting_date, meeting_title, transcript, summary, \
                    ad_performance_notes, source, user_email, created_by_name, created_at \
             FROM meetings ORDER BY meeting_date DESC, created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(meetings)
    }

    pub async fn list_meetings_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Meeting>, AppError> {
        let meetings = sqlx::query_as::<_, Meeting>(
            "SELECT id, client_name, meeting_date, meeting_title, transcript, summary, \
                    ad_performance_notes, source, user_email, created_by_name, created_at \
             FROM meetings WHERE meeting_date >= $1 AND meeting_date <= $2 \
             ORDER BY meeting_date DESC, created_at DESC",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(meetings)
    }

    /// Inserts a meeting with its analysis.
    ///
    /// Two-tier write: the first attempt populates the extended typed columns
    /// (sentiment, risk level, topics and so on). Deployments whose schema
    /// predates those columns fail that insert, so the write retries with the
    /// base columns only. Either way the full analysis is preserved verbatim
    /// in the `ad_performance_notes` blob, which is the durable record.
    pub async fn insert_meeting(
        &self,
        client_name: &str,
        meeting_date: NaiveDate,
        meeting_title: &str,
        transcript: &str,
        payload: &AnalysisPayload,
        author: &Author,
        source: &str,
    ) -> Result<Meeting, AppError> {
        let blob = serde_json::to_string(payload)
            .map_err(|e| AppError::InternalError(format!("Analysis serialization failed: {}", e)))?;
        let created_by = author.resolve_display_name();

        let extended = sqlx::query_as::<_, Meeting>(
            "INSERT INTO meetings ( \
                client_name, meeting_date, meeting_title, transcript, summary, \
                ad_performance_notes, source, user_email, created_by_name, \
                sentiment, risk_level, topics, participants, key_points, \
                action_items, follow_up_needed \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             RETURNING id, client_name, meeting_date, meeting_title, transcript, summary, \
                       ad_performance_notes, source, user_email, created_by_name, created_at",
        )
        .bind(client_name)
        .bind(meeting_date)
        .bind(meeting_title)
        .bind(transcript)
        .bind(&payload.summary)
        .bind(&blob)
        .bind(source)
        .bind(&author.user_email)
        .bind(&created_by)
        .bind(enum_text(&payload.client_sentiment))
        .bind(enum_text(&payload.risk_level))
        .bind(&payload.topics)
        .bind(&payload.participants)
        .bind(&payload.key_points)
        .bind(serde_json::to_value(&payload.action_items).ok())
        .bind(payload.follow_up_needed)
        .fetch_one(&self.pool)
        .await;

        match extended {
            Ok(meeting) => Ok(meeting),
            Err(e) => {
                tracing::warn!(
                    "Extended meeting insert failed, retrying with base columns: {}",
                    e
                );
                let meeting = sqlx::query_as::<_, Meeting>(
                    "INSERT INTO meetings ( \
                        client_name, meeting_date, meeting_title, transcript, summary, \
                        ad_performance_notes, source, user_email, created_by_name \
                     ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                     RETURNING id, client_name, meeting_date, meeting_title, transcript, summary, \
                               ad_performance_notes, source, user_email, created_by_name, created_at",
                )
                .bind(client_name)
                .bind(meeting_date)
                .bind(meeting_title)
                .bind(transcript)
                .bind(&payload.summary)
                .bind(&blob)
                .bind(source)
                .bind(&author.user_email)
                .bind(&created_by)
                .fetch_one(&self.pool)
                .await
                .map_err(AppError::DatabaseError)?;
                Ok(meeting)
            }
        }
    }

    pub async fn delete_meeting(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM meetings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Meeting {} not found", id)));
        }
        Ok(())
    }

    // ============ Activity log ============

    /// Appends an activity line. Activity logging is best-effort everywhere
    /// it is called; failures are the caller's to swallow, not ours to hide.
    pub async fn log_activity(
        &self,
        user_email: Option<&str>,
        client_name: &str,
        action: &str,
        details: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO activity_log (user_email, client_name, action, details) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(user_email)
        .bind(client_name)
        .bind(action)
        .bind(details)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(())
    }

    pub async fn list_activity(
        &self,
        client_name: &str,
        limit: i64,
    ) -> Result<Vec<ActivityEntry>, AppError> {
        let entries = sqlx::query_as::<_, ActivityEntry>(
            "SELECT id, user_email, client_name, action, details, created_at \
             FROM activity_log WHERE client_name = $1 \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(client_name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(entries)
    }

    pub async fn list_recent_activity(&self, limit: i64) -> Result<Vec<ActivityEntry>, AppError> {
        let entries = sqlx::query_as::<_, ActivityEntry>(
            "SELECT id, user_email, client_name, action, details, created_at \
             FROM activity_log ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(entries)
    }

    // ============ Ad account mappings ============

    pub async fn list_mappings(&self) -> Result<Vec<AdAccountMapping>, AppError> {
        let mappings = sqlx::query_as::<_, AdAccountMapping>(
            "SELECT id, client_name, meta_ad_account_id, created_at, updated_at \
             FROM client_ad_accounts ORDER BY client_name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(mappings)
    }

    /// One mapping per client name; remapping replaces the account id.
    pub async fn upsert_mapping(
        &self,
        client_name: &str,
        meta_ad_account_id: &str,
    ) -> Result<AdAccountMapping, AppError> {
        let mapping = sqlx::query_as::<_, AdAccountMapping>(
            "INSERT INTO client_ad_accounts (client_name, meta_ad_account_id) \
             VALUES ($1, $2) \
             ON CONFLICT (client_name) DO UPDATE \
             SET meta_ad_account_id = EXCLUDED.meta_ad_account_id, updated_at = now() \
             RETURNING id, client_name, meta_ad_account_id, created_at, updated_at",
        )
        .bind(client_name)
        .bind(meta_ad_account_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(mapping)
    }

    pub async fn delete_mapping(&self, client_name: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM client_ad_accounts WHERE client_name = $1")
            .bind(client_name)
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "No ad account mapped for {}",
                client_name
            )));
        }
        Ok(())
    }

    // ============ Email domain mappings ============

    pub async fn list_domain_mappings(&self) -> Result<Vec<EmailDomainMapping>, AppError> {
        let mappings = sqlx::query_as::<_, EmailDomainMapping>(
            "SELECT id, domain, client_name, created_at \
             FROM client_email_domains ORDER BY domain ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(mappings)
    }

    /// One client per domain; remapping replaces the client name.
    pub async fn upsert_domain_mapping(
        &self,
        domain: &str,
        client_name: &str,
    ) -> Result<EmailDomainMapping, AppError> {
        let mapping = sqlx::query_as::<_, EmailDomainMapping>(
            "INSERT INTO client_email_domains (domain, client_name) \
             VALUES ($1, $2) \
             ON CONFLICT (domain) DO UPDATE SET client_name = EXCLUDED.client_name \
             RETURNING id, domain, client_name, created_at",
        )
        .bind(domain)
        .bind(client_name)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(mapping)
    }

    pub async fn delete_domain_mapping(&self, domain: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM client_email_domains WHERE domain = $1")
            .bind(domain)
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "No client mapped for domain {}",
                domain
            )));
        }
        Ok(())
    }

    // ============ Fathom sync log ============

    pub async fn find_fathom_sync(
        &self,
        recording_id: &str,
    ) -> Result<Option<FathomSyncEntry>, AppError> {
        let entry = sqlx::query_as::<_, FathomSyncEntry>(
            "SELECT id, fathom_recording_id, client_name, meeting_id, status, \
                    fathom_title, fathom_url, error_message, processed_at, created_at \
             FROM fathom_sync_log WHERE fathom_recording_id = $1",
        )
        .bind(recording_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(entry)
    }

    /// Records the outcome of one ingestion attempt. Keyed by recording id, so
    /// a retry of a failed or unmatched recording overwrites its earlier line.
    pub async fn upsert_fathom_sync(
        &self,
        recording_id: &str,
        client_name: Option<&str>,
        meeting_id: Option<Uuid>,
        status: &str,
        title: Option<&str>,
        url: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<FathomSyncEntry, AppError> {
        let entry = sqlx::query_as::<_, FathomSyncEntry>(
            "INSERT INTO fathom_sync_log ( \
                fathom_recording_id, client_name, meeting_id, status, \
                fathom_title, fathom_url, error_message, processed_at \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, \
                       CASE WHEN $4 = 'processed' THEN now() END) \
             ON CONFLICT (fathom_recording_id) DO UPDATE SET \
                client_name = EXCLUDED.client_name, \
                meeting_id = EXCLUDED.meeting_id, \
                status = EXCLUDED.status, \
                fathom_title = EXCLUDED.fathom_title, \
                fathom_url = EXCLUDED.fathom_url, \
                error_message = EXCLUDED.error_message, \
                processed_at = EXCLUDED.processed_at \
             RETURNING id, fathom_recording_id, client_name, meeting_id, status, \
                       fathom_title, fathom_url, error_message, processed_at, created_at",
        )
        .bind(recording_id)
        .bind(client_name)
        .bind(meeting_id)
        .bind(status)
        .bind(title)
        .bind(url)
        .bind(error_message)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(entry)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
