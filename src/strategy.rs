//! Chooses which sources to query and how deep to enrich for an industry.
//!
//! Selection is a pure function of its inputs: the same industry, location
//! and overrides always produce the same [`Strategy`].

use crate::models::{KeyKind, SortBy, SourceName, Strategy, StrategyOverrides};

/// Industries sold to other businesses; matched as case-insensitive substrings.
pub const B2B_KEYWORDS: &[&str] = &[
    "software",
    "saas",
    "consult",
    "agency",
    "marketing",
    "accounting",
    "bookkeeping",
    "law firm",
    "legal",
    "insurance",
    "financial",
    "manufactur",
    "logistics",
    "it services",
    "staffing",
    "recruit",
    "wholesale",
    "engineering",
    "b2b",
];

/// Walk-in / call-out local services.
pub const LOCAL_SERVICE_KEYWORDS: &[&str] = &[
    "plumb",
    "hvac",
    "electric",
    "roof",
    "landscap",
    "lawn",
    "clean",
    "dent",
    "salon",
    "spa",
    "barber",
    "nail",
    "restaurant",
    "cafe",
    "bakery",
    "auto",
    "mechanic",
    "gym",
    "fitness",
    "pest",
    "locksmith",
    "moving",
    "chiropract",
    "veterinar",
    "pet",
    "contractor",
    "handyman",
    "painting",
];

const MAX_LEADS_CEILING: usize = 500;

/// Broad category an industry falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndustryCategory {
    B2b,
    LocalService,
    General,
}

/// Classify an industry by keyword. B2B keywords win when both lists match.
pub fn classify_industry(industry: &str) -> IndustryCategory {
    let lower = industry.to_lowercase();
    if B2B_KEYWORDS.iter().any(|k| lower.contains(k)) {
        IndustryCategory::B2b
    } else if LOCAL_SERVICE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        IndustryCategory::LocalService
    } else {
        IndustryCategory::General
    }
}

/// Select the discovery strategy for an industry and location.
///
/// The location is accepted for interface symmetry with discovery calls;
/// today's source sets are not locale-specific.
pub fn select_strategy(
    industry: &str,
    _location: &str,
    overrides: Option<&StrategyOverrides>,
) -> Strategy {
    let base = match classify_industry(industry) {
        IndustryCategory::B2b => Strategy {
            sources: vec![
                SourceName::OrgDirectory,
                SourceName::EmailFinder,
                SourceName::Maps,
                SourceName::Website,
            ],
            enrich_emails: true,
            enrich_websites: true,
            max_leads: 50,
            dedup_keys: vec![KeyKind::Website, KeyKind::Name],
            sort_by: SortBy::OpportunityScore,
        },
        // Websites of local shops are rarely worth a full scrape.
        IndustryCategory::LocalService => Strategy {
            sources: vec![SourceName::Reviews, SourceName::Maps],
            enrich_emails: true,
            enrich_websites: false,
            max_leads: 30,
            dedup_keys: vec![KeyKind::Phone, KeyKind::Name],
            sort_by: SortBy::OpportunityScore,
        },
        IndustryCategory::General => Strategy {
            sources: vec![SourceName::Maps, SourceName::Reviews, SourceName::OrgDirectory],
            enrich_emails: true,
            enrich_websites: true,
            max_leads: 25,
            dedup_keys: vec![KeyKind::Name, KeyKind::Phone],
            sort_by: SortBy::OpportunityScore,
        },
    };

    match overrides {
        Some(o) => apply_overrides(base, o),
        None => base,
    }
}

fn apply_overrides(mut strategy: Strategy, overrides: &StrategyOverrides) -> Strategy {
    if let Some(ref sources) = overrides.sources {
        let mut unique = Vec::with_capacity(sources.len());
        for source in sources {
            if !unique.contains(source) {
                unique.push(*source);
            }
        }
        strategy.sources = unique;
    }
    if let Some(enrich) = overrides.enrich_emails {
        strategy.enrich_emails = enrich;
    }
    if let Some(enrich) = overrides.enrich_websites {
        strategy.enrich_websites = enrich;
    }
    if let Some(max) = overrides.max_leads {
        strategy.max_leads = max.clamp(1, MAX_LEADS_CEILING);
    }
    if let Some(ref keys) = overrides.dedup_keys {
        if !keys.is_empty() {
            strategy.dedup_keys = keys.clone();
        }
    }
    if let Some(sort_by) = overrides.sort_by {
        strategy.sort_by = sort_by;
    }
    strategy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_b2b_industry_gets_org_directory_first() {
        let strategy = select_strategy("SaaS Companies", "Austin, TX", None);
        assert_eq!(strategy.sources[0], SourceName::OrgDirectory);
        assert_eq!(strategy.dedup_keys, vec![KeyKind::Website, KeyKind::Name]);
        assert!(strategy.enrich_websites);
    }

    #[test]
    fn test_local_service_skips_website_scraping() {
        let strategy = select_strategy("Plumbing", "Austin, TX", None);
        assert_eq!(strategy.sources[0], SourceName::Reviews);
        assert_eq!(strategy.dedup_keys, vec![KeyKind::Phone, KeyKind::Name]);
        assert!(!strategy.enrich_websites);
    }

    #[test]
    fn test_unmatched_industry_gets_balanced_default() {
        let strategy = select_strategy("Florist", "Denver", None);
        assert_eq!(classify_industry("Florist"), IndustryCategory::General);
        assert_eq!(strategy.sources[0], SourceName::Maps);
        assert_eq!(strategy.max_leads, 25);
    }

    #[test]
    fn test_b2b_wins_over_local_service() {
        assert_eq!(
            classify_industry("Dental Marketing Agency"),
            IndustryCategory::B2b
        );
    }

    #[test]
    fn test_overrides_applied_and_clamped() {
        let overrides = StrategyOverrides {
            sources: Some(vec![SourceName::Maps, SourceName::Maps, SourceName::Website]),
            max_leads: Some(10_000),
            sort_by: Some(SortBy::Rating),
            dedup_keys: Some(vec![]),
            ..Default::default()
        };
        let strategy = select_strategy("Plumbing", "Austin", Some(&overrides));
        assert_eq!(strategy.sources, vec![SourceName::Maps, SourceName::Website]);
        assert_eq!(strategy.max_leads, 500);
        assert_eq!(strategy.sort_by, SortBy::Rating);
        // Empty key list is ignored rather than disabling dedup
        assert_eq!(strategy.dedup_keys, vec![KeyKind::Phone, KeyKind::Name]);
    }
}
