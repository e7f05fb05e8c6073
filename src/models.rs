use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============ Sheet-sourced records ============

/// One row of the ads-performance sheet mapped into typed fields.
///
/// Field names mirror the sheet's column catalog; numeric cells are parsed
/// leniently (blank or malformed cells become 0). Rows with an empty `client`
/// are dropped by the adapter, so `client` is always non-empty here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAdsRecord {
    /// Client name. Unique join key within this sheet (case-insensitive).
    pub client: String,
    pub ad_account: String,
    pub team_member: String,
    pub status: String,
    pub daily_set_ad_spend: f64,
    pub state: String,
    pub campaign: String,
    pub specific_target: String,
    pub overlap: String,
    pub overall_standing: String,
    pub calling_status: String,
    pub using_dq_reasons: String,
    pub calling_using_crm: String,
    pub mb_notes: String,
    pub current_testings: String,
    pub client_avg_home_value: String,
    pub start_date: String,
    pub contract: String,
    pub contract_length_months: String,
    pub remaining_contract_months: String,
    pub lead_sync: String,
    pub months: f64,
    pub weeks: f64,
    pub days: f64,
    pub spend: f64,
    pub spend_per_month: f64,
    pub spend_per_day: f64,
    // Last 3 days - seller
    pub last3_day_seller_leads: f64,
    pub last3_day_seller_spend: f64,
    pub last3_day_seller_cpl: f64,
    // Last 7 days - seller
    pub last7_day_seller_leads: f64,
    pub last7_day_seller_spend: f64,
    pub last7_day_seller_cpl: f64,
    // Lifetime - seller
    pub seller_leads: f64,
    pub seller_spend: f64,
    pub seller_cpl: f64,
    // Last 3 days - buyer
    pub last3_day_buyer_leads: f64,
    pub last3_day_buyer_spend: f64,
    pub last3_day_buyer_cpl: f64,
    // Last 7 days - buyer
    pub last7_day_buyer_leads: f64,
    pub last7_day_buyer_spend: f64,
    pub last7_day_buyer_cpl: f64,
    // Lifetime - buyer
    pub buyer_leads: f64,
    pub buyer_spend: f64,
    pub buyer_cpl: f64,
    // Other lead types
    pub listing_leads: f64,
    // Mortgage
    pub last3_day_mortgage_leads: f64,
    pub last3_day_mortgage_spend: f64,
    pub last3_day_mortgage_cpl: f64,
    pub last7_day_mortgage_leads: f64,
    pub last7_day_mortgage_spend: f64,
    pub last7_day_mortgage_cpl: f64,
    pub mortgage_leads: f64,
    pub mortgage_spend: f64,
    pub mortgage_cpl: f64,
    pub mortgage_appts: f64,
    // Appointments
    pub appts: f64,
    pub seller_appts: f64,
    pub seller_appts7: f64,
    pub avg_seller_appts_week: f64,
    pub seller_lead_to_appt: f64,
    pub cost_per_seller_appt: f64,
    pub buyer_appts: f64,
    pub buyer_appts7: f64,
    pub avg_buyer_appts_week: f64,
    pub buyer_lead_to_appt: f64,
    pub cost_per_buyer_appt: f64,
    // Deals
    pub deals: f64,
    pub listings: f64,
    pub buyer_signed: f64,
    pub leads_per_listing: f64,
    pub leads_per_deal: f64,
    pub leads_per_signed_buyer: f64,
    pub ad_spend_per_deal: f64,
    pub ad_spend_per_listing: f64,
    pub ad_spend_per_buyer: f64,
    // Computed totals (seller + buyer + listing; seller + buyer for windows)
    pub leads: f64,
    pub cpl: f64,
    pub appts7: f64,
    pub last3_day_leads: f64,
    pub last7_day_leads: f64,
}

/// One row of the setup-timing sheet.
///
/// Independently maintained from the ads sheet; client names here are spelled
/// and capitalized by a different team, so there is no shared key. Values stay
/// raw strings: this sheet is operational metadata, not arithmetic input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSetupRecord {
    pub client: String,
    pub csm_rep: String,
    pub status: String,
    pub concern: String,
    pub state: String,
    pub campaign: String,
    pub contract_category: String,
    pub mrr: String,
    pub info: String,
    pub days_left: String,
    pub due_payment: String,
    pub last_csm_note: String,
    pub upcoming_csm_date: String,
    pub paid_date: String,
    pub onboarded_date: String,
    pub launch_call_date: String,
    pub ad_live_date: String,
    pub billing_cycle: String,
    pub free_trial_days: String,
    pub closings: String,
    pub signed: String,
    pub appts: String,
    pub behind_schedule: String,
    pub missing: String,
    pub stage_on_crm: String,
    pub timezone: String,
    pub onboarding_rep: String,
    pub red_flags: String,
    pub responsiveness: String,
    pub ad_account_name: String,
    pub ad_spend: String,
    pub city: String,
    pub target: String,
    pub readiness: String,
    pub expectations: String,
    pub unresolved_concerns: String,
    pub revenue_contracted: String,
    pub contract_length: String,
    pub platform: String,
    pub contract_notes: String,
    pub payment_notes: String,
}

// ============ Meta ads records ============

/// An ad account visible to the configured Meta access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdAccount {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub business_name: Option<String>,
}

/// Operator-curated client-name-to-ad-account mapping.
///
/// Keyed by the ads sheet's exact client string. At most one ad account per
/// client name (upsert semantics).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AdAccountMapping {
    pub id: Uuid,
    pub client_name: String,
    pub meta_ad_account_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Per-account snapshot from the Meta insights API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaInsight {
    pub spend: f64,
    pub impressions: i64,
    pub reach: i64,
    pub clicks: i64,
    pub ctr: f64,
    pub cpc: f64,
    pub cpm: f64,
    pub frequency: f64,
    pub leads: i64,
    pub link_clicks: i64,
    pub page_engagement: i64,
    pub post_engagement: i64,
    /// Derived cost per lead: spend/leads when leads > 0, else the
    /// platform-reported cost-per-action value, else absent.
    pub cpl: Option<f64>,
    pub date_preset: DatePreset,
}

/// The fixed set of Meta reporting windows. Unrecognized input falls back to
/// `Last7d` rather than erroring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePreset {
    Today,
    Yesterday,
    Last3d,
    #[default]
    Last7d,
    Last14d,
    Last28d,
    Last30d,
    Last90d,
    ThisMonth,
    LastMonth,
    ThisQuarter,
    Maximum,
}

impl DatePreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatePreset::Today => "today",
            DatePreset::Yesterday => "yesterday",
            DatePreset::Last3d => "last_3d",
            DatePreset::Last7d => "last_7d",
            DatePreset::Last14d => "last_14d",
            DatePreset::Last28d => "last_28d",
            DatePreset::Last30d => "last_30d",
            DatePreset::Last90d => "last_90d",
            DatePreset::ThisMonth => "this_month",
            DatePreset::LastMonth => "last_month",
            DatePreset::ThisQuarter => "this_quarter",
            DatePreset::Maximum => "maximum",
        }
    }

    /// Parses a preset, silently falling back to `last_7d` for anything
    /// outside the fixed set.
    pub fn parse_or_default(raw: &str) -> Self {
        match raw {
            "today" => DatePreset::Today,
            "yesterday" => DatePreset::Yesterday,
            "last_3d" => DatePreset::Last3d,
            "last_7d" => DatePreset::Last7d,
            "last_14d" => DatePreset::Last14d,
            "last_28d" => DatePreset::Last28d,
            "last_30d" => DatePreset::Last30d,
            "last_90d" => DatePreset::Last90d,
            "this_month" => DatePreset::ThisMonth,
            "last_month" => DatePreset::LastMonth,
            "this_quarter" => DatePreset::ThisQuarter,
            "maximum" => DatePreset::Maximum,
            _ => DatePreset::Last7d,
        }
    }
}

/// Which source supplied a reconciled record's spend/leads/CPL figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdDataSource {
    Meta,
    Sheets,
}

// ============ Store records ============

/// Free-text annotation attached to one client.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub client_name: String,
    pub note_text: String,
    pub user_email: Option<String>,
    pub source: String,
    pub is_important: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub edited_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A persisted meeting record.
///
/// Only the guaranteed-safe base columns appear here; the full analysis lives
/// in the `ad_performance_notes` blob, which is the durable source of truth.
/// Extended typed columns are a best-effort projection on insert.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Meeting {
    pub id: Uuid,
    pub client_name: String,
    pub meeting_date: NaiveDate,
    pub meeting_title: String,
    pub transcript: String,
    pub summary: String,
    /// Serialized `AnalysisPayload` blob. Always non-null, even when analysis
    /// failed (a fallback payload is substituted).
    pub ad_performance_notes: String,
    pub source: String,
    pub user_email: Option<String>,
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One line of the per-client activity log.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub user_email: Option<String>,
    pub client_name: String,
    pub action: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

/// Maps an email domain (or a full address) to a client, for attributing
/// notetaker recordings. Maintained by operators alongside the ad-account
/// mappings.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailDomainMapping {
    pub id: Uuid,
    /// Lowercased domain ("acmerealty.com") or full address.
    pub domain: String,
    pub client_name: String,
    pub created_at: DateTime<Utc>,
}

/// Sync-log line for one Fathom recording. The unique `fathom_recording_id`
/// is what makes webhook ingestion idempotent.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FathomSyncEntry {
    pub id: Uuid,
    pub fathom_recording_id: String,
    pub client_name: Option<String>,
    pub meeting_id: Option<Uuid>,
    /// "processed", "unmatched", or "failed". Only "processed" blocks a retry.
    pub status: String,
    pub fathom_title: Option<String>,
    pub fathom_url: Option<String>,
    pub error_message: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Caller identity for attribution on the write path. Auth itself is
/// external; the core only needs to know who to credit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub user_email: Option<String>,
    pub display_name: Option<String>,
}

impl Author {
    pub fn resolve_display_name(&self) -> String {
        if let Some(name) = &self.display_name {
            if !name.trim().is_empty() {
                return name.trim().to_string();
            }
        }
        match &self.user_email {
            Some(email) => crate::parsers::display_name_from_email(email),
            None => "Unknown".to_string(),
        }
    }
}

// ============ AI analysis payload ============

fn lenient_enum<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: LenientFromStr,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(T::lenient_from_str).unwrap_or_default())
}

trait LenientFromStr: Default {
    fn lenient_from_str(raw: &str) -> Self;
}

/// Client sentiment as reported by the analysis model. Anything the model
/// invents outside the known set degrades to `Neutral`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
    Frustrated,
    Excited,
    Concerned,
}

impl LenientFromStr for Sentiment {
    fn lenient_from_str(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            "frustrated" => Sentiment::Frustrated,
            "excited" => Sentiment::Excited,
            "concerned" => Sentiment::Concerned,
            _ => Sentiment::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl LenientFromStr for RiskLevel {
    fn lenient_from_str(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "low" => RiskLevel::Low,
            "high" => RiskLevel::High,
            _ => RiskLevel::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl LenientFromStr for Priority {
    fn lenient_from_str(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "low" => Priority::Low,
            "high" => Priority::High,
            _ => Priority::Medium,
        }
    }
}

/// A single extracted action item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_enum")]
    pub priority: Priority,
}

/// Normalized shape of a transcript analysis.
///
/// Every array field defaults to empty rather than null; the model's output
/// format is not under this system's control, so the whole shape is tolerant
/// of missing keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default, deserialize_with = "lenient_enum")]
    pub client_sentiment: Sentiment,
    #[serde(default)]
    pub sentiment_explanation: Option<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<ActionItem>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub follow_up_needed: bool,
    #[serde(default)]
    pub follow_up_items: Vec<String>,
    #[serde(default, deserialize_with = "lenient_enum")]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub important_notes: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub client_requests: Vec<String>,
    #[serde(default)]
    pub positive_signals: Vec<String>,
    #[serde(default)]
    pub warning_signals: Vec<String>,
}

impl AnalysisPayload {
    /// Degraded payload substituted when analysis fails. The transcript is
    /// still savable with this payload; the error travels in the summary.
    pub fn fallback(error: &str) -> Self {
        Self {
            summary: format!("Transcript saved (AI analysis failed: {})", error),
            risk_level: RiskLevel::Medium,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_preset_falls_back_to_last_7d() {
        assert_eq!(DatePreset::parse_or_default("last_30d"), DatePreset::Last30d);
        assert_eq!(DatePreset::parse_or_default("bogus"), DatePreset::Last7d);
        assert_eq!(DatePreset::parse_or_default(""), DatePreset::Last7d);
    }

    #[test]
    fn analysis_payload_arrays_default_to_empty() {
        let payload: AnalysisPayload =
            serde_json::from_str(r#"{"summary":"Quick sync"}"#).unwrap();
        assert_eq!(payload.summary, "Quick sync");
        assert!(payload.key_points.is_empty());
        assert!(payload.action_items.is_empty());
        assert_eq!(payload.risk_level, RiskLevel::Medium);
        assert_eq!(payload.client_sentiment, Sentiment::Neutral);
    }

    #[test]
    fn unknown_enum_values_degrade_to_defaults() {
        let payload: AnalysisPayload = serde_json::from_str(
            r#"{"clientSentiment":"ecstatic","riskLevel":"catastrophic","actionItems":[{"task":"call","priority":"urgent"}]}"#,
        )
        .unwrap();
        assert_eq!(payload.client_sentiment, Sentiment::Neutral);
        assert_eq!(payload.risk_level, RiskLevel::Medium);
        assert_eq!(payload.action_items[0].priority, Priority::Medium);
    }

    #[test]
    fn fallback_payload_embeds_error() {
        let payload = AnalysisPayload::fallback("edge function unreachable");
        assert!(payload.summary.contains("edge function unreachable"));
        assert!(payload.important_notes.is_empty());
        assert!(payload.participants.is_empty());
    }
}
