use std::env;
use uuid::Uuid;

use rust_lead_discovery::db::Database;
use rust_lead_discovery::db_storage::LeadStorage;
use rust_lead_discovery::models::{Candidate, Lead, SourceName};
use rust_lead_discovery::repository::LeadRepository;

/// Integration smoke test for Postgres lead storage.
/// Marked ignored to avoid running against production by accident; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn save_and_find_lead_smoke_test() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    let storage = LeadStorage::new(db.pool.clone());
    storage
        .ensure_schema()
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    // Unique identity so repeated runs don't collide.
    let suffix = Uuid::new_v4().simple().to_string();
    let mut candidate = Candidate::new(
        format!("Smoke Test Plumbing {}", &suffix[..8]),
        "Plumbing",
        SourceName::Maps,
        90,
    );
    candidate.website = Some(format!("https://smoke-{}.test", &suffix[..12]));
    let lead = Lead::from_candidate(candidate, "Austin, TX");

    assert!(!storage
        .exists(&lead.name, None, lead.website.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?);

    storage
        .save(&lead)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    // Second save hits the fingerprint conflict and is a no-op
    storage
        .save(&lead)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    assert!(storage
        .exists(&lead.name.to_uppercase(), None, None)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?);
    assert!(storage
        .exists("someone else", None, lead.website.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?);

    Ok(())
}
