/// Contact validation shared by source adapters and enrichment providers.
///
/// Email checks reject placeholder and bot addresses before a value is
/// accepted; phone canonicalisation uses libphonenumber rules so the same
/// number from two sources normalises to the same digits.
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use std::sync::OnceLock;

/// Domains that only ever show up as placeholders or tracking addresses.
const PLACEHOLDER_DOMAINS: &[&str] = &[
    "example.com",
    "example.org",
    "example.net",
    "test.com",
    "domain.com",
    "yourdomain.com",
    "email.com",
    "sentry.io",
    "wixpress.com",
    "sentry-next.wixpress.com",
];

/// Local parts of automated mailboxes nobody reads.
const BOT_LOCAL_PARTS: &[&str] = &[
    "noreply",
    "no-reply",
    "donotreply",
    "do-not-reply",
    "mailer-daemon",
    "bounce",
];

/// Repeated/sequential digits typed into forms to get past them.
const FAKE_PATTERNS: &[&str] = &["999999", "111111", "000000", "123456789"];

/// Asset suffixes that regex scraping mistakes for emails (`logo@2x.png`).
const ASSET_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp"];

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // RFC 5322 simplified: local@domain.tld
    RE.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
        )
        .unwrap()
    })
}

/// Validate an email address for outreach use.
///
/// Checks for:
/// - Basic structure (local@domain.tld)
/// - Placeholder domains (example.com and friends)
/// - Bot mailboxes (noreply@, mailer-daemon@)
/// - Fake digit patterns and scraped asset names
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.len() < 6 || !email.contains('@') || !email.contains('.') {
        return false;
    }

    let lower = email.to_lowercase();

    if ASSET_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        return false;
    }

    for pattern in FAKE_PATTERNS {
        if lower.contains(pattern) {
            tracing::debug!("Rejected email (fake pattern '{}'): {}", pattern, email);
            return false;
        }
    }

    let Some((local, domain)) = lower.rsplit_once('@') else {
        return false;
    };

    if BOT_LOCAL_PARTS
        .iter()
        .any(|bot| local == *bot || local.starts_with(&format!("{}.", bot)) || local.starts_with(&format!("{}+", bot)))
    {
        tracing::debug!("Rejected email (bot mailbox): {}", email);
        return false;
    }

    if PLACEHOLDER_DOMAINS
        .iter()
        .any(|d| domain == *d || domain.ends_with(&format!(".{}", d)))
    {
        tracing::debug!("Rejected email (placeholder domain): {}", email);
        return false;
    }

    email_regex().is_match(email)
}

/// Maps an ISO region code to a libphonenumber country, defaulting to US.
pub fn phone_region(code: &str) -> CountryId {
    match code.trim().to_uppercase().as_str() {
        "CA" => CountryId::CA,
        "GB" | "UK" => CountryId::GB,
        "AU" => CountryId::AU,
        "NZ" => CountryId::NZ,
        "IE" => CountryId::IE,
        "BR" => CountryId::BR,
        "DE" => CountryId::DE,
        "FR" => CountryId::FR,
        "ES" => CountryId::ES,
        "MX" => CountryId::MX,
        "IN" => CountryId::IN,
        _ => CountryId::US,
    }
}

/// Canonicalise a phone number to E.164 when it parses as valid for `region`.
///
/// Returns `None` for blank input; numbers libphonenumber rejects are kept
/// as given (trimmed) so no source data is thrown away.
pub fn canonical_phone(raw: &str, region: CountryId) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match phonenumber::parse(Some(region), trimmed) {
        Ok(number) if phonenumber::is_valid(&number) => {
            Some(number.format().mode(Mode::E164).to_string())
        }
        Ok(_) => {
            tracing::debug!("Phone not valid for region, keeping raw: {}", trimmed);
            Some(trimmed.to_string())
        }
        Err(e) => {
            tracing::debug!("Failed to parse phone '{}': {:?}", trimmed, e);
            Some(trimmed.to_string())
        }
    }
}
