//! Identity resolution: merges candidates that describe the same business.
//!
//! Matching is tiered over the requested [`KeyKind`]s. A shared normalized
//! phone or domain is enough on its own. A shared name merges only when the
//! two sides carry no conflicting phone or domain. Merging is field-level: an
//! empty field takes the incoming value; two non-empty values keep the one
//! from the more confident source, and ties keep the first-seen value.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::models::{non_blank, Candidate, KeyKind, Lead};

/// Two-label public suffixes where the registrable domain has three labels.
const SECOND_LEVEL_SUFFIXES: &[&str] = &["co", "com", "net", "org", "gov", "edu", "ac", "ltd", "plc"];

/// Lower-cases, trims and collapses inner whitespace; strips zero-width marks.
pub fn normalize_name(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.to_lowercase()
}

/// Digits only.
pub fn normalize_phone(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Reduce a website to its registrable domain: no scheme, no `www.`, no
/// path or port. Returns an empty string when nothing host-like is present.
pub fn normalize_domain(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let host = match url::Url::parse(&with_scheme) {
        Ok(parsed) => match parsed.host_str() {
            Some(h) => h.to_lowercase(),
            None => return String::new(),
        },
        Err(_) => return String::new(),
    };

    let host = host.trim_end_matches('.');
    let host = host.strip_prefix("www.").unwrap_or(host);

    // IP literals have no registrable part
    if host.parse::<std::net::IpAddr>().is_ok() || host.starts_with('[') {
        return host.to_string();
    }

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        return labels.join(".");
    }

    let tld = labels[labels.len() - 1];
    let second = labels[labels.len() - 2];
    let keep = if tld.len() == 2 && SECOND_LEVEL_SUFFIXES.contains(&second) {
        3
    } else {
        2
    };
    labels[labels.len() - keep..].join(".")
}

fn key_part(candidate: &Candidate, kind: KeyKind) -> String {
    match kind {
        KeyKind::Name => normalize_name(&candidate.name),
        KeyKind::Website => candidate
            .website
            .as_deref()
            .map(normalize_domain)
            .unwrap_or_default(),
        KeyKind::Phone => candidate
            .phone
            .as_deref()
            .map(normalize_phone)
            .unwrap_or_default(),
    }
}

/// Strong keys first; name is the fallback tier.
const TIERS: [KeyKind; 3] = [KeyKind::Phone, KeyKind::Website, KeyKind::Name];

/// Normalized, non-empty identity keys of a candidate for the requested
/// kinds, in tier order. Empty when the candidate can never be matched.
pub fn match_keys(candidate: &Candidate, keys: &[KeyKind]) -> Vec<(KeyKind, String)> {
    TIERS
        .iter()
        .filter(|kind| keys.contains(kind))
        .map(|&kind| (kind, key_part(candidate, kind)))
        .filter(|(_, value)| !value.is_empty())
        .collect()
}

/// Confidence of the source that supplied each mergeable field.
#[derive(Debug, Default)]
struct FieldConfidence {
    name: u8,
    phone: u8,
    email: u8,
    website: u8,
    address: u8,
    city: u8,
    state: u8,
    rating: u8,
    review_count: u8,
    coordinates: u8,
}

impl FieldConfidence {
    fn seeded(lead: &Lead, confidence: u8) -> Self {
        let c = |present: bool| if present { confidence } else { 0 };
        Self {
            name: confidence,
            phone: c(lead.phone.is_some()),
            email: c(lead.email.is_some()),
            website: c(lead.website.is_some()),
            address: c(lead.address.is_some()),
            city: c(lead.city.is_some()),
            state: c(lead.state.is_some()),
            rating: c(lead.rating.is_some()),
            review_count: c(lead.review_count.is_some()),
            coordinates: c(lead.coordinates.is_some()),
        }
    }
}

/// Field-level merge: fill empties, replace only on strictly higher confidence.
fn merge_field<T>(current: &mut Option<T>, current_conf: &mut u8, incoming: Option<T>, incoming_conf: u8) {
    let Some(value) = incoming else {
        return;
    };
    if current.is_none() || incoming_conf > *current_conf {
        *current = Some(value);
        *current_conf = incoming_conf;
    }
}

struct MergeSlot {
    lead: Lead,
    confidence: FieldConfidence,
    /// Every identity key absorbed into this lead.
    identities: Vec<(KeyKind, String)>,
}

impl MergeSlot {
    fn new(candidate: Candidate, location: &str, identities: Vec<(KeyKind, String)>) -> Self {
        let confidence = candidate.source_confidence;
        let lead = Lead::from_candidate(candidate, location);
        let confidence = FieldConfidence::seeded(&lead, confidence);
        Self {
            lead,
            confidence,
            identities,
        }
    }

    /// A name match is rejected when both sides know a phone (or domain)
    /// and none of them agree.
    fn conflicts_with(&self, incoming: &[(KeyKind, String)]) -> bool {
        [KeyKind::Phone, KeyKind::Website].iter().any(|&kind| {
            let mut ours = self.identities.iter().filter(|(k, _)| *k == kind).peekable();
            let mut theirs = incoming.iter().filter(|(k, _)| *k == kind).peekable();
            if ours.peek().is_none() || theirs.peek().is_none() {
                return false;
            }
            !theirs.any(|(_, v)| self.identities.contains(&(kind, v.clone())))
        })
    }

    fn absorb(&mut self, candidate: Candidate, identities: Vec<(KeyKind, String)>) {
        let conf = candidate.source_confidence;
        let lead = &mut self.lead;
        let fc = &mut self.confidence;

        let name = non_blank(Some(candidate.name));
        let mut current_name = Some(std::mem::take(&mut lead.name));
        merge_field(&mut current_name, &mut fc.name, name, conf);
        lead.name = current_name.unwrap_or_default();

        merge_field(&mut lead.phone, &mut fc.phone, non_blank(candidate.phone), conf);
        merge_field(&mut lead.email, &mut fc.email, non_blank(candidate.email), conf);
        merge_field(&mut lead.website, &mut fc.website, non_blank(candidate.website), conf);
        merge_field(&mut lead.address, &mut fc.address, non_blank(candidate.address), conf);
        merge_field(&mut lead.city, &mut fc.city, non_blank(candidate.city), conf);
        merge_field(&mut lead.state, &mut fc.state, non_blank(candidate.state), conf);
        merge_field(&mut lead.rating, &mut fc.rating, candidate.rating, conf);
        merge_field(&mut lead.review_count, &mut fc.review_count, candidate.review_count, conf);
        merge_field(&mut lead.coordinates, &mut fc.coordinates, candidate.coordinates, conf);

        lead.sources_merged.push(candidate.source_name);

        for identity in identities {
            if !self.identities.contains(&identity) {
                self.identities.push(identity);
            }
        }
    }
}

/// Finds the lead a candidate belongs to: the first strong-key hit, else the
/// first same-name lead without a conflicting phone or domain.
fn find_slot(
    slots: &[MergeSlot],
    index: &HashMap<(KeyKind, String), Vec<usize>>,
    identities: &[(KeyKind, String)],
) -> Option<usize> {
    for identity in identities {
        let Some(hits) = index.get(identity) else {
            continue;
        };
        match identity.0 {
            KeyKind::Phone | KeyKind::Website => return hits.first().copied(),
            KeyKind::Name => {
                if let Some(&slot) = hits.iter().find(|&&i| !slots[i].conflicts_with(identities)) {
                    return Some(slot);
                }
            }
        }
    }
    None
}

/// Merge candidates into leads using the requested dedup keys.
///
/// Output preserves first-seen order. The number of leads never exceeds the
/// number of candidates. With `phone` (or `website`) requested, candidates
/// sharing a normalized phone (or domain) always end up in one lead.
pub fn merge(candidates: Vec<Candidate>, keys: &[KeyKind], location: &str) -> Vec<Lead> {
    let mut slots: Vec<MergeSlot> = Vec::with_capacity(candidates.len());
    let mut index: HashMap<(KeyKind, String), Vec<usize>> = HashMap::new();
    let input_count = candidates.len();

    for candidate in candidates {
        let identities = match_keys(&candidate, keys);
        let slot = match find_slot(&slots, &index, &identities) {
            Some(slot) => {
                slots[slot].absorb(candidate, identities.clone());
                slot
            }
            None => {
                slots.push(MergeSlot::new(candidate, location, identities.clone()));
                slots.len() - 1
            }
        };

        for identity in identities {
            let owners = index.entry(identity.clone()).or_default();
            match identity.0 {
                // A phone or domain belongs to exactly one lead
                KeyKind::Phone | KeyKind::Website => {
                    if owners.is_empty() {
                        owners.push(slot);
                    }
                }
                KeyKind::Name => {
                    if !owners.contains(&slot) {
                        owners.push(slot);
                    }
                }
            }
        }
    }

    tracing::debug!(
        "Merged {} candidates into {} leads (keys: {:?})",
        input_count,
        slots.len(),
        keys
    );

    slots.into_iter().map(|slot| slot.lead).collect()
}

/// Stable SHA-256 fingerprint of a business identity, used by persistence
/// to recognise leads it already holds.
pub fn fingerprint(name: &str, phone: Option<&str>, website: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_name(name).as_bytes());
    hasher.update(b"|");
    hasher.update(phone.map(normalize_phone).unwrap_or_default().as_bytes());
    hasher.update(b"|");
    hasher.update(website.map(normalize_domain).unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}
