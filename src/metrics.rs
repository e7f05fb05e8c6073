//! Health scoring and issue detection for reconciled client records.
//!
//! The score is a coarse triage signal, not a model: it starts from a neutral
//! base and applies fixed bonuses and penalties so that two operators looking
//! at the same client always see the same number. All thresholds are named
//! constants below; they were tuned against the book of business and change
//! deliberately, never inline.

use serde::{Deserialize, Serialize};

pub const BASE_SCORE: i32 = 50;

// CPL bonus ladder (dollars per lead). Zero CPL falls in the lowest band and
// earns the full bonus; the gray tier, not the score, marks "no data yet".
pub const CPL_EXCELLENT: f64 = 15.0;
pub const CPL_GOOD: f64 = 25.0;
pub const CPL_ACCEPTABLE: f64 = 35.0;
pub const CPL_MARGINAL: f64 = 50.0;

// Appointments in the last 7 days.
pub const APPTS7_STRONG: f64 = 5.0;
pub const APPTS7_STEADY: f64 = 3.0;
pub const APPTS7_SOME: f64 = 1.0;

pub const OVERDUE_PENALTY: i32 = 15;
pub const RED_FLAG_PENALTY: i32 = 10;

/// Leads at or above this with zero appointments suggests a follow-up
/// problem on the client's side rather than an ads problem.
pub const STALLED_LEADS_THRESHOLD: f64 = 20.0;

/// CPL traffic-light tier for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthTier {
    Green,
    Yellow,
    Red,
    /// No lead data yet; not comparable to the colored tiers.
    Gray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Stable identifier for each detectable issue. The dashboard keys
/// dismissals and filters on these, so renaming one is a breaking change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    PaymentOverdue,
    NoLeads3d,
    NoLeads7d,
    CplCritical,
    CplElevated,
    LeadSyncMissing,
    CampaignMissing,
    LeadsNotConverting,
    ManualRedFlag,
    NotInSetupSheet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueFlag {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
}

/// The slice of a reconciled record that health evaluation reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthSignal<'a> {
    pub cpl: f64,
    pub appts7: f64,
    pub deals: f64,
    pub listings: f64,
    pub days_running: f64,
    pub leads: f64,
    pub last3_day_leads: f64,
    pub last7_day_leads: f64,
    pub lead_sync: &'a str,
    pub campaign: &'a str,
    pub due_payment: &'a str,
    pub red_flags: &'a str,
    pub in_setup_sheet: bool,
}

/// Computes the 0-100 health score.
pub fn health_score(signal: &HealthSignal) -> i32 {
    let mut score = BASE_SCORE;

    if signal.cpl <= CPL_EXCELLENT {
        score += 25;
    } else if signal.cpl <= CPL_GOOD {
        score += 20;
    } else if signal.cpl <= CPL_ACCEPTABLE {
        score += 10;
    } else if signal.cpl <= CPL_MARGINAL {
        score += 5;
    }

    if signal.appts7 >= APPTS7_STRONG {
        score += 15;
    } else if signal.appts7 >= APPTS7_STEADY {
        score += 10;
    } else if signal.appts7 >= APPTS7_SOME {
        score += 5;
    }

    if signal.deals > 0.0 || signal.listings > 0.0 {
        score += 10;
    }

    if is_overdue(signal.due_payment) {
        score -= OVERDUE_PENALTY;
    }
    if !signal.red_flags.trim().is_empty() {
        score -= RED_FLAG_PENALTY;
    }

    score.clamp(0, 100)
}

/// Human-readable band for a score.
pub fn health_label(score: i32) -> &'static str {
    if score >= 80 {
        "Healthy"
    } else if score >= 60 {
        "Needs Attention"
    } else {
        "At Risk"
    }
}

/// CPL traffic light. Zero CPL means no leads, which is unknown, not good.
pub fn cpl_tier(cpl: f64) -> HealthTier {
    if cpl == 0.0 {
        HealthTier::Gray
    } else if cpl <= CPL_GOOD {
        HealthTier::Green
    } else if cpl <= CPL_MARGINAL {
        HealthTier::Yellow
    } else {
        HealthTier::Red
    }
}

fn is_overdue(due_payment: &str) -> bool {
    due_payment.to_uppercase().contains("OVERDUE")
}

// Only a blank cell counts as missing; "No" or "N/A" is a recorded answer.
fn lead_sync_missing(lead_sync: &str) -> bool {
    lead_sync.trim().is_empty()
}

/// Detects every applicable issue for one client. Order is fixed so the flag
/// list is stable across runs of the same inputs.
pub fn issue_flags(signal: &HealthSignal) -> Vec<IssueFlag> {
    let mut flags = Vec::new();

    if is_overdue(signal.due_payment) {
        flags.push(IssueFlag {
            kind: IssueKind::PaymentOverdue,
            severity: Severity::High,
            message: format!("Payment overdue: {}", signal.due_payment.trim()),
        });
    }

    // Lead droughts only count once the campaign has run long enough for the
    // window to be meaningful.
    if signal.days_running >= 3.0 && signal.last3_day_leads == 0.0 {
        flags.push(IssueFlag {
            kind: IssueKind::NoLeads3d,
            severity: Severity::High,
            message: "No leads in the last 3 days".to_string(),
        });
    }
    if signal.days_running >= 7.0 && signal.last7_day_leads == 0.0 {
        flags.push(IssueFlag {
            kind: IssueKind::NoLeads7d,
            severity: Severity::High,
            message: "No leads in the last 7 days".to_string(),
        });
    }

    if signal.cpl > CPL_MARGINAL {
        flags.push(IssueFlag {
            kind: IssueKind::CplCritical,
            severity: Severity::Medium,
            message: format!("Cost per lead is critical (${:.2})", signal.cpl),
        });
    } else if signal.cpl > CPL_ACCEPTABLE {
        flags.push(IssueFlag {
            kind: IssueKind::CplElevated,
            severity: Severity::Low,
            message: format!("Cost per lead is elevated (${:.2})", signal.cpl),
        });
    }

    if lead_sync_missing(signal.lead_sync) {
        flags.push(IssueFlag {
            kind: IssueKind::LeadSyncMissing,
            severity: Severity::Medium,
            message: "Lead sync is not configured".to_string(),
        });
    }

    if signal.campaign.trim().is_empty() {
        flags.push(IssueFlag {
            kind: IssueKind::CampaignMissing,
            severity: Severity::Low,
            message: "No campaign recorded".to_string(),
        });
    }

    if signal.leads >= STALLED_LEADS_THRESHOLD && signal.appts7 == 0.0 {
        flags.push(IssueFlag {
            kind: IssueKind::LeadsNotConverting,
            severity: Severity::Medium,
            message: format!(
                "{:.0} leads with no appointments booked",
                signal.leads
            ),
        });
    }

    if !signal.red_flags.trim().is_empty() {
        flags.push(IssueFlag {
            kind: IssueKind::ManualRedFlag,
            severity: Severity::High,
            message: format!("Flagged by CSM: {}", signal.red_flags.trim()),
        });
    }

    if !signal.in_setup_sheet {
        flags.push(IssueFlag {
            kind: IssueKind::NotInSetupSheet,
            severity: Severity::Low,
            message: "Client missing from the setup sheet".to_string(),
        });
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_signal<'a>() -> HealthSignal<'a> {
        HealthSignal {
            cpl: 24.0,
            appts7: 5.0,
            deals: 1.0,
            listings: 0.0,
            days_running: 90.0,
            leads: 50.0,
            last3_day_leads: 4.0,
            last7_day_leads: 9.0,
            lead_sync: "yes",
            campaign: "Seller Leads",
            due_payment: "",
            red_flags: "",
            in_setup_sheet: true,
        }
    }

    #[test]
    fn strong_client_scores_high() {
        // 50 base + 20 (cpl <= 25) + 15 (appts >= 5) + 10 (deals) = 95
        let signal = healthy_signal();
        assert_eq!(health_score(&signal), 95);
        assert_eq!(health_label(95), "Healthy");
        assert_eq!(cpl_tier(signal.cpl), HealthTier::Green);
        assert!(issue_flags(&signal).is_empty());
    }

    #[test]
    fn base_case_score_of_90() {
        // 50 base + 20 (cpl 20) + 10 (4 appts) + 10 (deal), no penalties
        let signal = HealthSignal {
            cpl: 20.0,
            appts7: 4.0,
            deals: 1.0,
            ..Default::default()
        };
        assert_eq!(health_score(&signal), 90);
    }

    #[test]
    fn cpl_ladder_boundaries() {
        let mut signal = HealthSignal {
            cpl: 15.0,
            ..Default::default()
        };
        assert_eq!(health_score(&signal), 75); // 50 + 25
        signal.cpl = 15.01;
        assert_eq!(health_score(&signal), 70); // 50 + 20
        signal.cpl = 25.0;
        assert_eq!(health_score(&signal), 70);
        signal.cpl = 35.0;
        assert_eq!(health_score(&signal), 60); // 50 + 10
        signal.cpl = 50.0;
        assert_eq!(health_score(&signal), 55); // 50 + 5
        signal.cpl = 50.01;
        assert_eq!(health_score(&signal), 50);
        signal.cpl = 0.0;
        assert_eq!(health_score(&signal), 75); // lowest band, full bonus
    }

    #[test]
    fn lowering_cpl_to_zero_never_drops_the_score() {
        let cheap = HealthSignal {
            cpl: 10.0,
            ..Default::default()
        };
        let free = HealthSignal {
            cpl: 0.0,
            ..Default::default()
        };
        assert!(health_score(&free) >= health_score(&cheap));
        assert_eq!(health_score(&free), 75);
    }

    #[test]
    fn penalties_apply_and_score_clamps() {
        let signal = HealthSignal {
            due_payment: "OVERDUE since May",
            red_flags: "threatening to cancel",
            ..Default::default()
        };
        // 50 - 15 - 10 = 25
        assert_eq!(health_score(&signal), 25);
        assert_eq!(health_label(25), "At Risk");

        // Lower bound clamps at zero even if penalties exceed the base.
        let floor = HealthSignal {
            due_payment: "overdue",
            red_flags: "x",
            ..Default::default()
        };
        assert!(health_score(&floor) >= 0);
    }

    #[test]
    fn overdue_detection_is_case_insensitive() {
        assert!(is_overdue("Overdue 14 days"));
        assert!(is_overdue("PAYMENT OVERDUE"));
        assert!(!is_overdue("paid"));
        assert!(!is_overdue(""));
    }

    #[test]
    fn cpl_tiers() {
        assert_eq!(cpl_tier(0.0), HealthTier::Gray);
        assert_eq!(cpl_tier(24.0), HealthTier::Green);
        assert_eq!(cpl_tier(25.0), HealthTier::Green);
        assert_eq!(cpl_tier(42.0), HealthTier::Yellow);
        assert_eq!(cpl_tier(50.0), HealthTier::Yellow);
        assert_eq!(cpl_tier(51.0), HealthTier::Red);
    }

    #[test]
    fn lead_drought_needs_enough_runtime() {
        let young = HealthSignal {
            days_running: 2.0,
            last3_day_leads: 0.0,
            last7_day_leads: 0.0,
            lead_sync: "yes",
            campaign: "c",
            in_setup_sheet: true,
            ..Default::default()
        };
        let kinds: Vec<IssueKind> = issue_flags(&young).iter().map(|f| f.kind).collect();
        assert!(!kinds.contains(&IssueKind::NoLeads3d));
        assert!(!kinds.contains(&IssueKind::NoLeads7d));

        let mature = HealthSignal {
            days_running: 30.0,
            ..young
        };
        let kinds: Vec<IssueKind> = issue_flags(&mature).iter().map(|f| f.kind).collect();
        assert!(kinds.contains(&IssueKind::NoLeads3d));
        assert!(kinds.contains(&IssueKind::NoLeads7d));
    }

    #[test]
    fn cpl_flags_are_mutually_exclusive() {
        let critical = HealthSignal {
            cpl: 75.0,
            ..Default::default()
        };
        let kinds: Vec<IssueKind> = issue_flags(&critical).iter().map(|f| f.kind).collect();
        assert!(kinds.contains(&IssueKind::CplCritical));
        assert!(!kinds.contains(&IssueKind::CplElevated));

        let elevated = HealthSignal {
            cpl: 40.0,
            ..Default::default()
        };
        let kinds: Vec<IssueKind> = issue_flags(&elevated).iter().map(|f| f.kind).collect();
        assert!(kinds.contains(&IssueKind::CplElevated));
        assert!(!kinds.contains(&IssueKind::CplCritical));
    }

    #[test]
    fn stalled_leads_and_setup_absence_are_flagged() {
        let signal = HealthSignal {
            leads: 25.0,
            appts7: 0.0,
            lead_sync: "yes",
            campaign: "c",
            in_setup_sheet: false,
            ..Default::default()
        };
        let flags = issue_flags(&signal);
        let kinds: Vec<IssueKind> = flags.iter().map(|f| f.kind).collect();
        assert!(kinds.contains(&IssueKind::LeadsNotConverting));
        assert!(kinds.contains(&IssueKind::NotInSetupSheet));

        let converting = HealthSignal {
            appts7: 2.0,
            ..signal
        };
        let kinds: Vec<IssueKind> = issue_flags(&converting).iter().map(|f| f.kind).collect();
        assert!(!kinds.contains(&IssueKind::LeadsNotConverting));
    }

    #[test]
    fn lead_sync_flag_only_fires_on_blank_cells() {
        let blank = HealthSignal {
            campaign: "c",
            in_setup_sheet: true,
            ..Default::default()
        };
        let kinds: Vec<IssueKind> = issue_flags(&blank).iter().map(|f| f.kind).collect();
        assert!(kinds.contains(&IssueKind::LeadSyncMissing));

        for recorded in ["yes", "No", "N/A", " pending "] {
            let signal = HealthSignal {
                lead_sync: recorded,
                ..blank
            };
            let kinds: Vec<IssueKind> = issue_flags(&signal).iter().map(|f| f.kind).collect();
            assert!(!kinds.contains(&IssueKind::LeadSyncMissing), "{}", recorded);
        }
    }

    #[test]
    fn severity_ordering_supports_sorting() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }
}
