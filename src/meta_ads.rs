//! Meta Marketing API adapter.
//!
//! Talks to the Graph API insights endpoints for the ad accounts that
//! operators have mapped to client names. One bad account (revoked access,
//! deleted account, malformed response) must never sink the whole snapshot,
//! so every account is fetched in isolation and failures land in a per-client
//! error map instead of bubbling up.

use std::collections::HashMap;

use failsafe::backoff::Exponential;
use failsafe::failure_policy::ConsecutiveFailures;
use failsafe::futures::CircuitBreaker;
use failsafe::StateMachine;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::{AdAccount, AdAccountMapping, DatePreset, MetaInsight};
use crate::parsers::parse_number;

const INSIGHT_FIELDS: &str =
    "spend,impressions,reach,clicks,ctr,cpc,cpm,frequency,actions,cost_per_action_type";

type MetaBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

/// Creates the circuit breaker guarding Graph API calls. Five consecutive
/// failures open the circuit; recovery is probed with exponential backoff
/// between 10s and 60s.
fn create_meta_circuit_breaker() -> MetaBreaker {
    let backoff_strategy =
        failsafe::backoff::exponential(Duration::from_secs(10), Duration::from_secs(60));
    let failure_policy = failsafe::failure_policy::consecutive_failures(5, backoff_strategy);
    failsafe::Config::new()
        .failure_policy(failure_policy)
        .build()
}

/// Aggregate result of one insights run across all mapped accounts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsSnapshot {
    /// Successful per-client insights, keyed by the mapping's exact client
    /// name.
    pub results: HashMap<String, MetaInsight>,
    /// Human-readable failure reasons for accounts that could not be fetched,
    /// keyed the same way.
    pub errors: HashMap<String, String>,
    pub date_preset: DatePreset,
}

pub struct MetaAdsService {
    client: Client,
    base_url: String,
    access_token: String,
    breaker: MetaBreaker,
}

// ============ Graph API wire shapes ============
//
// The Graph API reports every numeric metric as a string; parsing stays
// lenient so a missing or malformed field degrades to zero instead of
// failing the account.

#[derive(Debug, Deserialize)]
struct GraphList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: Option<GraphErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorDetail {
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawInsightRow {
    spend: String,
    impressions: String,
    reach: String,
    clicks: String,
    ctr: String,
    cpc: String,
    cpm: String,
    frequency: String,
    actions: Vec<RawAction>,
    cost_per_action_type: Vec<RawAction>,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    action_type: String,
    value: String,
}

fn action_value(actions: &[RawAction], action_type: &str) -> f64 {
    actions
        .iter()
        .find(|a| a.action_type == action_type)
        .map(|a| parse_number(&a.value))
        .unwrap_or(0.0)
}

fn map_insight_row(row: &RawInsightRow, date_preset: DatePreset) -> MetaInsight {
    let spend = parse_number(&row.spend);
    let leads = action_value(&row.actions, "lead");
    let cost_per_lead = action_value(&row.cost_per_action_type, "lead");

    // Prefer deriving CPL from spend over the platform-reported figure, which
    // lags behind spend during the attribution window.
    let cpl = if leads > 0.0 {
        Some(spend / leads)
    } else if cost_per_lead > 0.0 {
        Some(cost_per_lead)
    } else {
        None
    };

    MetaInsight {
        spend,
        impressions: parse_number(&row.impressions) as i64,
        reach: parse_number(&row.reach) as i64,
        clicks: parse_number(&row.clicks) as i64,
        ctr: parse_number(&row.ctr),
        cpc: parse_number(&row.cpc),
        cpm: parse_number(&row.cpm),
        frequency: parse_number(&row.frequency),
        leads: leads as i64,
        link_clicks: action_value(&row.actions, "link_click") as i64,
        page_engagement: action_value(&row.actions, "page_engagement") as i64,
        post_engagement: action_value(&row.actions, "post_engagement") as i64,
        cpl,
        date_preset,
    }
}

/// Account ids arrive both bare ("1234") and prefixed ("act_1234") depending
/// on where the operator copied them from.
fn normalize_account_id(id: &str) -> String {
    let trimmed = id.trim();
    if trimmed.starts_with("act_") {
        trimmed.to_string()
    } else {
        format!("act_{}", trimmed)
    }
}

impl MetaAdsService {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.meta_api_base_url.trim_end_matches('/').to_string(),
            access_token: config.meta_access_token.clone(),
            breaker: create_meta_circuit_breaker(),
        }
    }

    /// Lists the ad accounts visible to the configured access token, for the
    /// mapping UI's account picker.
    pub async fn list_ad_accounts(&self) -> Result<Vec<AdAccount>, AppError> {
        let url = format!("{}/me/adaccounts", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("fields", "id,name,business_name"),
                ("limit", "200"),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Meta account list failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Meta response read failed: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::ExternalApiError(graph_error_message(
                status.as_u16(),
                &body,
            )));
        }

        let list: GraphList<AdAccount> = serde_json::from_str(&body).map_err(|e| {
            AppError::ExternalApiError(format!("Meta account list decode failed: {}", e))
        })?;
        Ok(list.data)
    }

    /// Fetches insights for every mapped account, sequentially.
    ///
    /// Failures never abort the run: each failed account contributes an entry
    /// to `errors` and the loop continues. An open circuit fails the
    /// remaining accounts fast with the same isolation.
    pub async fn fetch_all_insights(
        &self,
        mappings: &[AdAccountMapping],
        date_preset: DatePreset,
    ) -> InsightsSnapshot {
        let mut snapshot = InsightsSnapshot {
            date_preset,
            ..Default::default()
        };

        for mapping in mappings {
            match self
                .breaker
                .call(self.fetch_account_insights(&mapping.meta_ad_account_id, date_preset))
                .await
            {
                Ok(insight) => {
                    snapshot.results.insert(mapping.client_name.clone(), insight);
                }
                Err(failsafe::Error::Inner(e)) => {
                    tracing::warn!(
                        "Meta insights failed for {} ({}): {}",
                        mapping.client_name,
                        mapping.meta_ad_account_id,
                        e
                    );
                    snapshot
                        .errors
                        .insert(mapping.client_name.clone(), e.to_string());
                }
                Err(failsafe::Error::Rejected) => {
                    tracing::warn!(
                        "Meta circuit open, skipping {} ({})",
                        mapping.client_name,
                        mapping.meta_ad_account_id
                    );
                    snapshot.errors.insert(
                        mapping.client_name.clone(),
                        "Meta API temporarily unavailable (circuit open)".to_string(),
                    );
                }
            }
        }

        tracing::info!(
            "Meta insights run: {} ok, {} failed, preset {}",
            snapshot.results.len(),
            snapshot.errors.len(),
            date_preset.as_str()
        );
        snapshot
    }

    async fn fetch_account_insights(
        &self,
        account_id: &str,
        date_preset: DatePreset,
    ) -> Result<MetaInsight, AppError> {
        let url = format!(
            "{}/{}/insights",
            self.base_url,
            normalize_account_id(account_id)
        );
        let response = self
            .client
            .get(&url)
            .query(&[
                ("fields", INSIGHT_FIELDS),
                ("date_preset", date_preset.as_str()),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Meta insights fetch failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Meta response read failed: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::ExternalApiError(graph_error_message(
                status.as_u16(),
                &body,
            )));
        }

        let list: GraphList<RawInsightRow> = serde_json::from_str(&body).map_err(|e| {
            AppError::ExternalApiError(format!("Meta insights decode failed: {}", e))
        })?;

        // A healthy account with no delivery in the window returns an empty
        // data array; surface that as a per-account failure so the dashboard
        // falls back to sheet figures instead of showing zeros as truth.
        let row = list.data.first().ok_or_else(|| {
            AppError::ExternalApiError("No insight data returned for this window".to_string())
        })?;
        Ok(map_insight_row(row, date_preset))
    }
}

fn graph_error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<GraphErrorBody>(body) {
        Ok(GraphErrorBody {
            error: Some(detail),
        }) => format!("Meta API error ({}): {}", status, detail.message),
        _ => format!("Meta API error ({})", status),
    }
}
