//! Reconciliation: merges the three upstreams into one record per client.
//!
//! The ads sheet drives the roster: every ads row becomes a `ClientRecord`.
//! Setup data is attached by fuzzy name match; Meta insights are attached by
//! EXACT client name, because the mapping table is operator-curated and its
//! keys are copied verbatim from the ads sheet. Fuzzy matching there would
//! silently attach the wrong account's spend.
//!
//! When a Meta insight is present it overrides the sheet's spend, leads, and
//! CPL figures; the record is tagged with its source so the dashboard can say
//! where a number came from. Reconciliation is a pure function of its inputs.

use serde::{Deserialize, Serialize};

use crate::matcher;
use crate::meta_ads::InsightsSnapshot;
use crate::metrics::{self, HealthSignal, HealthTier, IssueFlag};
use crate::models::{AdDataSource, ClientAdsRecord, ClientSetupRecord, MetaInsight};

/// One fully reconciled client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    #[serde(flatten)]
    pub ads: ClientAdsRecord,
    /// Matched setup-sheet row, if any.
    pub setup: Option<ClientSetupRecord>,
    /// Other setup rows that also matched; non-empty means the attachment
    /// above was chosen by position.
    pub ambiguous_setup_matches: Vec<String>,
    /// Which source supplied `spend`, `leads`, and `cpl`.
    pub ad_data_source: AdDataSource,
    /// Raw Meta insight when one was attached.
    pub meta: Option<MetaInsight>,
    /// Failure reason when this client's mapped account could not be fetched.
    pub meta_error: Option<String>,
    pub health_score: i32,
    pub health_label: String,
    pub cpl_tier: HealthTier,
    pub issues: Vec<IssueFlag>,
}

/// The reconciled roster plus the setup rows no ads row claimed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutput {
    pub clients: Vec<ClientRecord>,
    /// Setup-sheet rows with no ads-sheet counterpart: onboarding clients
    /// whose campaigns have not launched, or stale rows to clean up.
    pub setup_only: Vec<ClientSetupRecord>,
}

/// Builds the reconciled roster. Pure and deterministic: the same inputs
/// always produce the same output, in ads-sheet order.
pub fn reconcile(
    ads: &[ClientAdsRecord],
    setups: &[ClientSetupRecord],
    insights: Option<&InsightsSnapshot>,
) -> ReconcileOutput {
    let clients: Vec<ClientRecord> = ads
        .iter()
        .map(|row| reconcile_one(row, setups, insights))
        .collect();

    let setup_only: Vec<ClientSetupRecord> = setups
        .iter()
        .filter(|setup| {
            !ads.iter()
                .any(|row| matcher::setup_matches(&row.client, &setup.client))
        })
        .cloned()
        .collect();

    ReconcileOutput {
        clients,
        setup_only,
    }
}

fn reconcile_one(
    row: &ClientAdsRecord,
    setups: &[ClientSetupRecord],
    insights: Option<&InsightsSnapshot>,
) -> ClientRecord {
    let mut ads = row.clone();

    // Exact-name lookup against the curated mapping results.
    let meta = insights.and_then(|snap| snap.results.get(&ads.client).cloned());
    let meta_error = insights.and_then(|snap| snap.errors.get(&ads.client).cloned());

    let ad_data_source = match &meta {
        Some(insight) => {
            ads.spend = insight.spend;
            ads.leads = insight.leads as f64;
            ads.cpl = insight.cpl.unwrap_or(0.0);
            AdDataSource::Meta
        }
        None => AdDataSource::Sheets,
    };

    let matched = matcher::find_setup_for_client(&ads.client, setups);
    let setup = matched.matched;

    let (due_payment, red_flags) = match &setup {
        Some(s) => (s.due_payment.as_str(), s.red_flags.as_str()),
        None => ("", ""),
    };

    let signal = HealthSignal {
        cpl: ads.cpl,
        appts7: ads.appts7,
        deals: ads.deals,
        listings: ads.listings,
        days_running: ads.days,
        leads: ads.leads,
        last3_day_leads: ads.last3_day_leads,
        last7_day_leads: ads.last7_day_leads,
        lead_sync: &ads.lead_sync,
        campaign: &ads.campaign,
        due_payment,
        red_flags,
        in_setup_sheet: setup.is_some(),
    };

    let health_score = metrics::health_score(&signal);
    let health_label = metrics::health_label(health_score).to_string();
    let cpl_tier = metrics::cpl_tier(signal.cpl);
    let issues = metrics::issue_flags(&signal);

    ClientRecord {
        ads,
        setup,
        ambiguous_setup_matches: matched.ambiguous_candidates,
        ad_data_source,
        meta,
        meta_error,
        health_score,
        health_label,
        cpl_tier,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatePreset;
    use std::collections::HashMap;

    fn ads_row(client: &str, spend: f64, leads: f64) -> ClientAdsRecord {
        ClientAdsRecord {
            client: client.to_string(),
            spend,
            leads,
            cpl: if leads > 0.0 { spend / leads } else { 0.0 },
            lead_sync: "yes".to_string(),
            campaign: "Seller Leads".to_string(),
            ..Default::default()
        }
    }

    fn setup_row(client: &str) -> ClientSetupRecord {
        ClientSetupRecord {
            client: client.to_string(),
            ..Default::default()
        }
    }

    fn insight(spend: f64, leads: i64) -> MetaInsight {
        MetaInsight {
            spend,
            impressions: 0,
            reach: 0,
            clicks: 0,
            ctr: 0.0,
            cpc: 0.0,
            cpm: 0.0,
            frequency: 0.0,
            leads,
            link_clicks: 0,
            page_engagement: 0,
            post_engagement: 0,
            cpl: if leads > 0 {
                Some(spend / leads as f64)
            } else {
                None
            },
            date_preset: DatePreset::Last7d,
        }
    }

    #[test]
    fn meta_insight_overrides_sheet_figures() {
        let ads = vec![ads_row("Acme Co", 1200.0, 50.0)];
        let setups = vec![setup_row("Acme Co")];
        let mut results = HashMap::new();
        results.insert("Acme Co".to_string(), insight(900.0, 45));
        let snapshot = InsightsSnapshot {
            results,
            errors: HashMap::new(),
            date_preset: DatePreset::Last7d,
        };

        let output = reconcile(&ads, &setups, Some(&snapshot));
        let record = &output.clients[0];
        assert_eq!(record.ad_data_source, AdDataSource::Meta);
        assert_eq!(record.ads.spend, 900.0);
        assert_eq!(record.ads.leads, 45.0);
        assert_eq!(record.ads.cpl, 20.0);
        assert!(record.meta.is_some());
    }

    #[test]
    fn unmapped_clients_keep_sheet_figures() {
        let ads = vec![ads_row("Acme Co", 1200.0, 50.0)];
        let output = reconcile(&ads, &[], None);
        let record = &output.clients[0];
        assert_eq!(record.ad_data_source, AdDataSource::Sheets);
        assert_eq!(record.ads.spend, 1200.0);
        assert_eq!(record.ads.cpl, 24.0);
        assert!(record.meta.is_none());
    }

    #[test]
    fn meta_lookup_is_exact_not_fuzzy() {
        let ads = vec![ads_row("Acme", 100.0, 10.0)];
        let mut results = HashMap::new();
        // Mapped under a longer name; must NOT attach to "Acme".
        results.insert("Acme Realty".to_string(), insight(999.0, 1));
        let snapshot = InsightsSnapshot {
            results,
            errors: HashMap::new(),
            date_preset: DatePreset::Last7d,
        };

        let output = reconcile(&ads, &[], Some(&snapshot));
        assert_eq!(output.clients[0].ad_data_source, AdDataSource::Sheets);
        assert_eq!(output.clients[0].ads.spend, 100.0);
    }

    #[test]
    fn per_client_meta_errors_are_carried() {
        let ads = vec![ads_row("Acme", 100.0, 10.0)];
        let mut errors = HashMap::new();
        errors.insert("Acme".to_string(), "Invalid OAuth access token".to_string());
        let snapshot = InsightsSnapshot {
            results: HashMap::new(),
            errors,
            date_preset: DatePreset::Last7d,
        };

        let output = reconcile(&ads, &[], Some(&snapshot));
        let record = &output.clients[0];
        assert_eq!(record.ad_data_source, AdDataSource::Sheets);
        assert_eq!(
            record.meta_error.as_deref(),
            Some("Invalid OAuth access token")
        );
    }

    #[test]
    fn setup_rows_attach_fuzzily_and_leftovers_surface() {
        let ads = vec![ads_row("Acme", 100.0, 10.0)];
        let setups = vec![setup_row("Acme Realty"), setup_row("Zenith Group")];

        let output = reconcile(&ads, &setups, None);
        assert_eq!(
            output.clients[0].setup.as_ref().unwrap().client,
            "Acme Realty"
        );
        assert_eq!(output.setup_only.len(), 1);
        assert_eq!(output.setup_only[0].client, "Zenith Group");
    }

    #[test]
    fn ambiguous_setup_matches_are_surfaced() {
        let ads = vec![ads_row("Smith", 100.0, 10.0)];
        let setups = vec![setup_row("John Smith"), setup_row("Smith & Co")];

        let output = reconcile(&ads, &setups, None);
        let record = &output.clients[0];
        assert_eq!(record.setup.as_ref().unwrap().client, "John Smith");
        assert_eq!(
            record.ambiguous_setup_matches,
            vec!["Smith & Co".to_string()]
        );
    }

    #[test]
    fn setup_health_fields_feed_scoring() {
        let ads = vec![ads_row("Acme", 1200.0, 50.0)];
        let mut setup = setup_row("Acme");
        setup.due_payment = "OVERDUE 14 days".to_string();
        setup.red_flags = "threatening to cancel".to_string();

        let output = reconcile(&ads, &[setup], None);
        let record = &output.clients[0];
        // 50 + 20 (cpl 24) - 15 (overdue) - 10 (red flag) = 45
        assert_eq!(record.health_score, 45);
        assert_eq!(record.health_label, "At Risk");
        assert!(record
            .issues
            .iter()
            .any(|f| f.kind == crate::metrics::IssueKind::PaymentOverdue));
        assert!(record
            .issues
            .iter()
            .any(|f| f.kind == crate::metrics::IssueKind::ManualRedFlag));
    }

    #[test]
    fn reconciliation_is_idempotent() {
        let ads = vec![ads_row("Acme", 1200.0, 50.0), ads_row("Zenith", 0.0, 0.0)];
        let setups = vec![setup_row("Acme"), setup_row("Orphan Co")];
        let mut results = HashMap::new();
        results.insert("Acme".to_string(), insight(900.0, 45));
        let snapshot = InsightsSnapshot {
            results,
            errors: HashMap::new(),
            date_preset: DatePreset::Last30d,
        };

        let first = reconcile(&ads, &setups, Some(&snapshot));
        let second = reconcile(&ads, &setups, Some(&snapshot));
        assert_eq!(first, second);
    }
}
