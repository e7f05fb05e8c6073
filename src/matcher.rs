//! Fuzzy client-identity matching between the ads sheet and the setup sheet.
//!
//! The two sheets are maintained by different teams and share no key; names
//! differ in spelling, casing, and suffixes ("Acme" vs "Acme Realty"). The
//! matcher is deliberately permissive and asymmetric: exact match, substring
//! containment in either direction, or any whitespace token longer than two
//! characters from the target name appearing in the candidate.
//!
//! Known limitation: when several candidates match ("Smith" against both
//! "John Smith" and "Smith & Co"), the first match in iteration order wins.
//! `MatchResult` surfaces the remaining candidates so callers can see the
//! ambiguity, but the lenient first-match default is intentional.

use crate::models::ClientSetupRecord;

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Returns true when two client names refer to the same client under the
/// lenient matching rules (exact or substring in either direction).
pub fn names_match(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.contains(&b) || b.contains(&a)
}

/// The full asymmetric rule used for setup-sheet lookups: substring in
/// either direction plus the token rule.
pub fn setup_matches(target: &str, candidate: &str) -> bool {
    let target = normalize(target);
    let candidate = normalize(candidate);
    if target.is_empty() || candidate.is_empty() {
        return false;
    }
    if target == candidate || candidate.contains(&target) || target.contains(&candidate) {
        return true;
    }
    // Token rule: "John Smith Team" matches a candidate containing "smith".
    target
        .split_whitespace()
        .filter(|token| token.len() > 2)
        .any(|token| candidate.contains(token))
}

/// Outcome of a setup-sheet lookup for one ads-sheet client.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    /// The winning candidate, if any (first match in iteration order).
    pub matched: Option<ClientSetupRecord>,
    /// Names of additional candidates that also matched. Non-empty means the
    /// lookup was ambiguous and the winner was chosen by position.
    pub ambiguous_candidates: Vec<String>,
}

/// Finds the setup record for an ads-sheet client name.
///
/// Deterministic: iterates `setups` in order and takes the first match;
/// further matches are recorded as ambiguous candidates, not errors.
pub fn find_setup_for_client(client_name: &str, setups: &[ClientSetupRecord]) -> MatchResult {
    let mut result = MatchResult::default();
    for setup in setups {
        if setup_matches(client_name, &setup.client) {
            if result.matched.is_none() {
                result.matched = Some(setup.clone());
            } else {
                result.ambiguous_candidates.push(setup.client.clone());
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(name: &str) -> ClientSetupRecord {
        ClientSetupRecord {
            client: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn exact_and_substring_matches() {
        assert!(names_match("Acme Co", "acme co"));
        assert!(names_match("Acme", "Acme Realty"));
        assert!(names_match("Acme Realty", "Acme"));
        assert!(!names_match("Acme", "Zenith"));
        assert!(!names_match("", "Acme"));
    }

    #[test]
    fn token_rule_matches_partial_names() {
        let setups = vec![setup("The Smith Group")];
        let result = find_setup_for_client("John Smith Team", &setups);
        assert_eq!(result.matched.unwrap().client, "The Smith Group");
    }

    #[test]
    fn short_tokens_are_ignored() {
        let setups = vec![setup("GO Homes")];
        // "GO" is only two characters; the token rule must not fire on it.
        let result = find_setup_for_client("Go West Sellers", &setups);
        assert!(result.matched.is_none());
    }

    #[test]
    fn first_match_wins_and_ambiguity_is_surfaced() {
        let setups = vec![setup("John Smith"), setup("Smith & Co")];
        let result = find_setup_for_client("Smith", &setups);
        assert_eq!(result.matched.as_ref().unwrap().client, "John Smith");
        assert_eq!(result.ambiguous_candidates, vec!["Smith & Co".to_string()]);

        // Deterministic across repeated runs.
        let again = find_setup_for_client("Smith", &setups);
        assert_eq!(
            again.matched.as_ref().unwrap().client,
            result.matched.as_ref().unwrap().client
        );
    }

    #[test]
    fn no_match_returns_empty_result() {
        let setups = vec![setup("Acme Co")];
        let result = find_setup_for_client("Zenith Realty", &setups);
        assert!(result.matched.is_none());
        assert!(result.ambiguous_candidates.is_empty());
    }
}
