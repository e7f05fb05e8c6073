//! Sheet adapter: fetches the two published CSV exports and maps rows into
//! typed records.
//!
//! The two sheets carry their headers on different physical rows. That offset
//! is applied positionally (documented sheet layout), never sniffed:
//! - ads performance: row 1 is a banner row to discard, headers on row 2
//! - setup timing: headers on row 1, row 2 is a subtitle row to discard
//!
//! Field mapping is by exact header string. A renamed or missing header
//! degrades that field to its zero value; it is never an error, since the
//! sheets drift without notice and the dashboard must keep loading.

use std::collections::HashMap;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::{ClientAdsRecord, ClientSetupRecord};
use crate::parsers::parse_number;
use reqwest::Client;

/// Physical position of the header row in a published sheet export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderRow {
    /// Headers on row 1; row 2 is a subtitle row to discard.
    First,
    /// Row 1 is a banner row to discard; headers on row 2.
    Second,
}

/// One parsed CSV row: header name -> cell text. Ephemeral; consumed
/// immediately by the mapping functions.
#[derive(Debug, Clone, Default)]
pub struct RawSheetRow {
    cells: HashMap<String, String>,
}

impl RawSheetRow {
    pub fn new(cells: HashMap<String, String>) -> Self {
        Self { cells }
    }

    /// Cell text under an exact header name, or empty string.
    fn text(&self, header: &str) -> String {
        self.cells.get(header).cloned().unwrap_or_default()
    }

    /// Cell text under the first header name that has a non-empty value.
    /// Some columns were renamed over the sheet's life, so both spellings
    /// stay mapped.
    fn text_any(&self, headers: &[&str]) -> String {
        for header in headers {
            if let Some(value) = self.cells.get(*header) {
                if !value.is_empty() {
                    return value.clone();
                }
            }
        }
        String::new()
    }

    /// Cell parsed as a lenient number (0.0 for blank or malformed).
    fn num(&self, header: &str) -> f64 {
        parse_number(&self.text(header))
    }
}

/// Fetches and maps the two sheet exports.
pub struct SheetService {
    client: Client,
    ads_url: String,
    setup_url: String,
}

impl SheetService {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            ads_url: config.ads_sheet_url.clone(),
            setup_url: config.setup_sheet_url.clone(),
        }
    }

    /// Fetches the ads-performance sheet. Rows with an empty `Client` cell
    /// are dropped.
    pub async fn fetch_ads_sheet(&self) -> Result<Vec<ClientAdsRecord>, AppError> {
        let rows = self.fetch_csv(&self.ads_url, HeaderRow::Second).await?;
        let records: Vec<ClientAdsRecord> = rows
            .iter()
            .map(map_ads_row)
            .filter(|r| !r.client.is_empty())
            .collect();
        tracing::info!("Fetched {} ads-performance rows", records.len());
        Ok(records)
    }

    /// Fetches the setup-timing sheet. Rows with an empty identity cell are
    /// dropped.
    pub async fn fetch_setup_sheet(&self) -> Result<Vec<ClientSetupRecord>, AppError> {
        let rows = self.fetch_csv(&self.setup_url, HeaderRow::First).await?;
        let records: Vec<ClientSetupRecord> = rows
            .iter()
            .map(map_setup_row)
            .filter(|r| !r.client.is_empty())
            .collect();
        tracing::info!("Fetched {} setup-timing rows", records.len());
        Ok(records)
    }

    async fn fetch_csv(
        &self,
        url: &str,
        header_row: HeaderRow,
    ) -> Result<Vec<RawSheetRow>, AppError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Sheet fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalApiError(format!(
                "Sheet fetch returned status {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Sheet body read failed: {}", e)))?;

        Ok(parse_rows(&body, header_row))
    }
}

/// Applies the positional header-row selection and parses the remainder.
pub fn parse_rows(csv_text: &str, header_row: HeaderRow) -> Vec<RawSheetRow> {
    let lines: Vec<&str> = csv_text.split('\n').collect();
    if lines.len() < 2 {
        return Vec::new();
    }

    let processed: String = match header_row {
        // Drop the banner row; row 2 becomes the header.
        HeaderRow::Second => lines[1..].join("\n"),
        // Keep row 1 as header; drop the subtitle row beneath it.
        HeaderRow::First => {
            let mut kept = vec![lines[0]];
            kept.extend(&lines[2..]);
            kept.join("\n")
        }
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(processed.as_bytes());

    let headers: Vec<String> = match reader.headers() {
        Ok(h) => h.iter().map(|s| s.to_string()).collect(),
        Err(e) => {
            tracing::warn!("Sheet header parse failed: {}", e);
            return Vec::new();
        }
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Skipping malformed sheet row: {}", e);
                continue;
            }
        };
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let cells = headers
            .iter()
            .cloned()
            .zip(record.iter().map(|cell| cell.to_string()))
            .collect();
        rows.push(RawSheetRow::new(cells));
    }
    rows
}

/// Maps an ads-performance row to a typed record by exact header lookup.
pub fn map_ads_row(r: &RawSheetRow) -> ClientAdsRecord {
    let seller_leads = r.num("Lifetime Seller Leads");
    let buyer_leads = r.num("Lifetime Buyer Leads");
    let listing_leads = r.num("Listing Leads");
    let mortgage_leads = r.num("Lifetime Mortgage Leads");
    let total_leads = seller_leads + buyer_leads + listing_leads;
    let spend = r.num("Total Ad Spend");
    let seller_appts7 = r.num("Seller Appts in the Last 7 Days");
    let buyer_appts7 = r.num("Buyer Appts in the Last 7 Days");

    ClientAdsRecord {
        client: r.text("Client").trim().to_string(),
        ad_account: r.text("Ad Account Name"),
        team_member: r.text("Team Member"),
        status: r.text("Status"),
        daily_set_ad_spend: r.num("Daily Set Ad Spend"),
        state: r.text("State"),
        campaign: r.text("CAMPAIGN"),
        specific_target: r.text("Specific Target"),
        overlap: r.text("Overlap"),
        overall_standing: r.text("Overall Standing"),
        calling_status: r.text("Calling/Non-calling"),
        using_dq_reasons: r.text("Using DQ Reasons"),
        calling_using_crm: r.text("Calling using CRM"),
        mb_notes: r.text("MB Detailed Notes / Test Conducted"),
        current_testings: r.text("Current Testings"),
        client_avg_home_value: r.text("Client Avg Home Value"),
        start_date: r.text_any(&["CORRECT SETUP TIMING START DATE", "OLD Start Date"]),
        contract: r.text("Contract"),
        contract_length_months: r.text("Contract Length In Months"),
        remaining_contract_months: r.text("# Of Remaining Contract Months Left"),
        lead_sync: r.text_any(&["Lead Sync", "Leady Sync"]),
        months: r.num("Months Running"),
        weeks: r.num("Weeks Running"),
        days: r.num("Days Running"),
        spend,
        spend_per_month: r.num("Ad Spend Per Month"),
        spend_per_day: r.num("Ad Spend Per Day"),
        last3_day_seller_leads: r.num("Last 3 Day Seller Leads"),
        last3_day_seller_spend: r.num("Last 3 Days Seller Ad Spend"),
        last3_day_seller_cpl: r.num("Last 3 Days Seller CPL"),
        last7_day_seller_leads: r.num("Last 7 Day Seller Leads"),
        last7_day_seller_spend: r.num("Last 7 Day Seller Spend"),
        last7_day_seller_cpl: r.num("Last 7 Days Seller CPL"),
        seller_leads,
        seller_spend: r.num("Lifetime Seller Ad Spend"),
        seller_cpl: r.num("Lifetime Seller CPL"),
        last3_day_buyer_leads: r.num("Last 3 Day Buyer Leads"),
        last3_day_buyer_spend: r.num("Last 3 Days Buyer Ad Spend"),
        last3_day_buyer_cpl: r.num("Last 3 Days Buyer CPL"),
        last7_day_buyer_leads: r.num("Last 7 Day Buyer Leads"),
        last7_day_buyer_spend: r.num("Last 7 Day Buyer Spend"),
        last7_day_buyer_cpl: r.num("Last 7 Days Buyer CPL"),
        buyer_leads,
        buyer_spend: r.num("Lifetime Buyer Ad Spend"),
        buyer_cpl: r.num("Lifetime Buyer CPL"),
        listing_leads,
        last3_day_mortgage_leads: r.num("Last 3 Day Mortgage Leads"),
        last3_day_mortgage_spend: r.num("Last 3 Days Mortgage Ad Spend"),
        last3_day_mortgage_cpl: r.num("Last 3 Days Mortgage CPL"),
        last7_day_mortgage_leads: r.num("Last 7 Day Mortgage Leads"),
        last7_day_mortgage_spend: r.num("Last 7 Day Mortgage Spend"),
        last7_day_mortgage_cpl: r.num("Last 7 Days Mortgage CPL"),
        mortgage_leads,
        mortgage_spend: r.num("Lifetime Mortgage Ad Spend"),
        mortgage_cpl: r.num("Lifetime Mortgage CPL"),
        mortgage_appts: r.num("Total Appts Mortgage"),
        appts: r.num("Total Appts (Seller + Buyers)"),
        seller_appts: r.num("Total Seller Appts"),
        seller_appts7,
        avg_seller_appts_week: r.num("Avg Seller Appts per Week"),
        seller_lead_to_appt: r.num("Seller Lead To Appt Ratio"),
        cost_per_seller_appt: parse_number(&r.text_any(&[
            "Total Ad Spend Cost Per Seller Appt",
            "Total Ad Spend Cost Per Seller Appts",
        ])),
        buyer_appts: r.num("Total Buyer Appts"),
        buyer_appts7,
        avg_buyer_appts_week: r.num("Avg Buyer Appts per Week"),
        buyer_lead_to_appt: r.num("Buyer Lead To Appt Ratio"),
        cost_per_buyer_appt: parse_number(&r.text_any(&[
            "Total Ad Spend Cost Per Buyer Appts",
            "Ad Spend Cost Per Buyer Appts",
        ])),
        deals: r.num("Potential Deals"),
        listings: r.num("Listing"),
        buyer_signed: r.num("Buyer Signed"),
        leads_per_listing: r.num("Leads/Listing"),
        leads_per_deal: r.num("Leads/Potential Deal"),
        leads_per_signed_buyer: r.num("Leads/Signed Buyer"),
        ad_spend_per_deal: r.num("Ad Spend/Potential Deal"),
        ad_spend_per_listing: r.num("Ad Spend/Listing"),
        ad_spend_per_buyer: r.num("Ad Spend/Buyer"),
        leads: total_leads,
        cpl: if total_leads > 0.0 {
            spend / total_leads
        } else {
            0.0
        },
        appts7: seller_appts7 + buyer_appts7,
        last3_day_leads: r.num("Last 3 Day Seller Leads") + r.num("Last 3 Day Buyer Leads"),
        last7_day_leads: r.num("Last 7 Day Seller Leads") + r.num("Last 7 Day Buyer Leads"),
    }
}

/// Maps a setup-timing row. The identity column is headed "VAM".
pub fn map_setup_row(r: &RawSheetRow) -> ClientSetupRecord {
    ClientSetupRecord {
        client: r.text("VAM").trim().to_string(),
        csm_rep: r.text("CSM"),
        status: r.text("Status"),
        concern: r.text("Concern"),
        state: r.text("State"),
        campaign: r.text("Campaign"),
        contract_category: r.text("Contract Category"),
        mrr: r.text("MRR"),
        info: r.text("Info"),
        days_left: r.text("Days left"),
        due_payment: r.text("Due Payment"),
        last_csm_note: r.text("Last CSM Rep - Note - date"),
        upcoming_csm_date: r.text("upcoming CSM rep - date"),
        paid_date: r.text("Paid date"),
        onboarded_date: r.text("Onboarded date"),
        launch_call_date: r.text("Launch call date"),
        // The live sheet has a stray leading space in this header.
        ad_live_date: r.text_any(&[" Ad Live date", "Ad Live date"]),
        billing_cycle: r.text("Billing cycle"),
        free_trial_days: r.text("Free trial Days"),
        closings: r.text("Closings"),
        signed: r.text("Signed"),
        appts: r.text_any(&[" Appts ", "Appts"]),
        behind_schedule: r.text("Behind schedule"),
        missing: r.text("Missing"),
        stage_on_crm: r.text("Stage on CRM"),
        timezone: r.text("Timezone"),
        onboarding_rep: r.text("Rep"),
        red_flags: r.text("Red flags"),
        responsiveness: r.text("Responsivness"),
        ad_account_name: r.text("Ad Account name"),
        ad_spend: r.text("Ad Spend"),
        city: r.text("City"),
        target: r.text("Target"),
        readiness: r.text("Readiness"),
        expectations: r.text("Expectations"),
        unresolved_concerns: r.text("Unresolved Concerns"),
        revenue_contracted: r.text("Revenue Contracted"),
        contract_length: r.text("Contract length"),
        platform: r.text("Platform"),
        contract_notes: r.text("contract notes"),
        payment_notes: r.text("Payment notes"),
    }
}
