/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
use proptest::prelude::*;

use rust_lead_discovery::dedup::{match_keys, merge, normalize_domain, normalize_name, normalize_phone};
use rust_lead_discovery::models::{
    Candidate, KeyKind, Lead, SimilarLeadsStats, SourceName, StrategyOverrides, WeightSet,
};
use rust_lead_discovery::scoring::{opportunity_score, predictive_score};
use rust_lead_discovery::strategy::select_strategy;
use rust_lead_discovery::validation::is_valid_email;

fn arb_source() -> impl Strategy<Value = SourceName> {
    prop::sample::select(SourceName::ALL.to_vec())
}

fn arb_key_kinds() -> impl Strategy<Value = Vec<KeyKind>> {
    prop::sample::subsequence(vec![KeyKind::Name, KeyKind::Website, KeyKind::Phone], 1..=3)
}

prop_compose! {
    fn arb_candidate()(
        name in "[A-Za-z ]{0,12}",
        phone in proptest::option::of("[0-9]{3}-[0-9]{3}-[0-9]{4}"),
        website in proptest::option::of("[a-z]{3,8}\\.(com|io|co\\.uk)"),
        rating in proptest::option::of(0.0f64..=5.0),
        reviews in proptest::option::of(0u32..5_000),
        source in arb_source(),
        confidence in 0u8..=100,
    ) -> Candidate {
        let mut c = Candidate::new(name, "Plumbing", source, confidence);
        c.phone = phone;
        c.website = website;
        c.rating = rating;
        c.review_count = reviews;
        c
    }
}

fn lead_from(candidate: Candidate) -> Lead {
    Lead::from_candidate(candidate, "Austin, TX")
}

// Property: opportunity score is always within [0, 95]
proptest! {
    #[test]
    fn opportunity_score_is_bounded(candidate in arb_candidate()) {
        let score = opportunity_score(&lead_from(candidate));
        prop_assert!(score <= 95);
    }

    #[test]
    fn missing_website_never_lowers_score(candidate in arb_candidate()) {
        let mut with_site = candidate.clone();
        with_site.website = Some("https://acme.com".to_string());
        let mut without_site = candidate;
        without_site.website = None;
        prop_assert!(
            opportunity_score(&lead_from(without_site)) >= opportunity_score(&lead_from(with_site))
        );
    }

    #[test]
    fn predictive_scores_are_bounded(
        candidate in arb_candidate(),
        rate in proptest::option::of(0.0f64..=1.0),
        hours in proptest::option::of(0.0f64..500.0),
        sample in 0u32..200,
    ) {
        let lead = lead_from(candidate);
        let stats = SimilarLeadsStats {
            sample_size: sample,
            conversion_rate: rate,
            avg_response_hours: hours,
            best_channel: None,
        };
        let opportunity = opportunity_score(&lead);
        let predictive = predictive_score(&lead, opportunity, &WeightSet::uniform(), &stats);
        prop_assert!(predictive.conversion_probability <= 100);
        prop_assert!(predictive.engagement_score <= 100);
        prop_assert!(predictive.confidence <= 100);
        prop_assert!(predictive.confidence >= 50);
    }
}

// Property: merging never creates leads and is exact for identical keys
proptest! {
    #[test]
    fn merge_never_increases_cardinality(
        candidates in prop::collection::vec(arb_candidate(), 0..30),
        keys in arb_key_kinds(),
    ) {
        let count = candidates.len();
        let leads = merge(candidates, &keys, "Austin, TX");
        prop_assert!(leads.len() <= count);
    }

    #[test]
    fn name_only_merge_is_exact(candidates in prop::collection::vec(arb_candidate(), 0..30)) {
        let keys = [KeyKind::Name];
        let expected: std::collections::HashSet<String> =
            candidates.iter().map(|c| normalize_name(&c.name)).filter(|n| !n.is_empty()).collect();
        let keyless = candidates.iter().filter(|c| match_keys(c, &keys).is_empty()).count();
        let leads = merge(candidates, &keys, "Austin, TX");
        prop_assert_eq!(leads.len(), expected.len() + keyless);
    }

    #[test]
    fn shared_phone_always_merges(
        candidates in prop::collection::vec(arb_candidate(), 0..30),
        keys in arb_key_kinds(),
    ) {
        let mut keys = keys;
        keys.push(KeyKind::Phone);
        let leads = merge(candidates, &keys, "Austin, TX");
        let phones: Vec<String> = leads
            .iter()
            .filter_map(|l| l.phone.as_deref().map(normalize_phone))
            .filter(|p| !p.is_empty())
            .collect();
        let distinct: std::collections::HashSet<&String> = phones.iter().collect();
        prop_assert_eq!(distinct.len(), phones.len());
    }

    #[test]
    fn formatted_phones_merge(digits in "[2-9][0-9]{2}[2-9][0-9]{6}", name_a in "[A-Z][a-z]{2,8}", name_b in "[A-Z][a-z]{2,8}") {
        let keys = select_strategy("Plumbing", "Austin, TX", None).dedup_keys;
        let mut a = Candidate::new(name_a, "Plumbing", SourceName::Maps, 90);
        a.phone = Some(format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..]));
        let mut b = Candidate::new(name_b, "Plumbing", SourceName::Reviews, 80);
        b.phone = Some(format!("{}.{}.{}", &digits[..3], &digits[3..6], &digits[6..]));

        let leads = merge(vec![a, b], &keys, "Austin, TX");
        prop_assert_eq!(leads.len(), 1);
        prop_assert_eq!(leads[0].sources_merged.len(), 2);
    }

    #[test]
    fn normalize_phone_keeps_only_digits(raw in "\\PC*") {
        prop_assert!(normalize_phone(&raw).chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn normalize_domain_ignores_scheme_and_www(host in "[a-z]{3,10}\\.(com|net|io)", path in "(/[a-z]{1,6}){0,3}") {
        let plain = normalize_domain(&host);
        prop_assert_eq!(normalize_domain(&format!("https://www.{}{}", host, path)), plain.clone());
        prop_assert_eq!(normalize_domain(&format!("http://{}:8080{}", host.to_uppercase(), path)), plain);
    }
}

// Property: strategy selection is a pure function of its inputs
proptest! {
    #[test]
    fn strategy_selection_is_idempotent(industry in "\\PC{0,30}", location in "\\PC{0,20}", max in proptest::option::of(0usize..2_000)) {
        let overrides = StrategyOverrides { max_leads: max, ..Default::default() };
        let first = select_strategy(&industry, &location, Some(&overrides));
        let second = select_strategy(&industry, &location, Some(&overrides));
        prop_assert!(first.max_leads >= 1 && first.max_leads <= 500);
        prop_assert!(!first.sources.is_empty());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn email_validation_never_panics(email in "\\PC*") {
        let _ = is_valid_email(&email);
    }
}
