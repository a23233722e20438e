//! Persistence collaborator: where discovered leads end up.

use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::RwLock;

use crate::dedup::{fingerprint, normalize_domain, normalize_name, normalize_phone};
use crate::errors::AppError;
use crate::models::Lead;

#[async_trait]
pub trait LeadRepository: Send + Sync {
    /// True when a stored lead shares the normalized name, phone digits or
    /// website domain. Blank inputs never match.
    async fn exists(
        &self,
        name: &str,
        phone: Option<&str>,
        website: Option<&str>,
    ) -> Result<bool, AppError>;

    async fn save(&self, lead: &Lead) -> Result<(), AppError>;
}

/// Normalized lookup keys for a lead, blanks dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityKeys {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub domain: Option<String>,
}

impl IdentityKeys {
    pub fn new(name: &str, phone: Option<&str>, website: Option<&str>) -> Self {
        let keep = |s: String| (!s.is_empty()).then_some(s);
        Self {
            name: keep(normalize_name(name)),
            phone: phone.map(normalize_phone).and_then(keep),
            domain: website.map(normalize_domain).and_then(keep),
        }
    }

    pub fn for_lead(lead: &Lead) -> Self {
        Self::new(&lead.name, lead.phone.as_deref(), lead.website.as_deref())
    }
}

#[derive(Default)]
struct KnownLeads {
    names: HashSet<String>,
    phones: HashSet<String>,
    domains: HashSet<String>,
    fingerprints: HashSet<String>,
    leads: Vec<Lead>,
}

/// Process-local repository used when no database is configured.
#[derive(Default)]
pub struct InMemoryLeadRepository {
    inner: RwLock<KnownLeads>,
}

impl InMemoryLeadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.leads.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn all(&self) -> Vec<Lead> {
        self.inner.read().await.leads.clone()
    }
}

#[async_trait]
impl LeadRepository for InMemoryLeadRepository {
    async fn exists(
        &self,
        name: &str,
        phone: Option<&str>,
        website: Option<&str>,
    ) -> Result<bool, AppError> {
        let keys = IdentityKeys::new(name, phone, website);
        let known = self.inner.read().await;
        Ok(keys.name.is_some_and(|k| known.names.contains(&k))
            || keys.phone.is_some_and(|k| known.phones.contains(&k))
            || keys.domain.is_some_and(|k| known.domains.contains(&k)))
    }

    async fn save(&self, lead: &Lead) -> Result<(), AppError> {
        let fp = fingerprint(&lead.name, lead.phone.as_deref(), lead.website.as_deref());
        let keys = IdentityKeys::for_lead(lead);
        let mut known = self.inner.write().await;
        if !known.fingerprints.insert(fp) {
            tracing::debug!("Lead '{}' already stored", lead.name);
            return Ok(());
        }
        if let Some(k) = keys.name {
            known.names.insert(k);
        }
        if let Some(k) = keys.phone {
            known.phones.insert(k);
        }
        if let Some(k) = keys.domain {
            known.domains.insert(k);
        }
        known.leads.push(lead.clone());
        Ok(())
    }
}
