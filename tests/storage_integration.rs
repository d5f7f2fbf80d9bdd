use lead_api::config::Config;
use lead_api::db::Database;
use lead_api::errors::AppError;
use lead_api::models::{LeadPayload, LeadQuery, LeadStage, TrackingUpdate};
use lead_api::repository::{LeadRepository, PgLeadRepository};
use lead_api::validation::validate_lead;

/// Integration smoke test for the PostgreSQL lead repository.
/// Marked ignored to avoid running against production by accident; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn pg_repository_crud_smoke_test() -> anyhow::Result<()> {
    let db_url = std::env::var("TEST_DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL to run this test"))?;
    let db_name = std::env::var("TEST_DATABASE_NAME").unwrap_or_else(|_| "lead_api_test".into());

    let config = Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some(db_url.clone()),
        "DATABASE_NAME" => Some(db_name.clone()),
        "LLM_API_KEY" | "SECRET_KEY" => Some("test".to_string()),
        _ => None,
    })?;
    let db = Database::new(&config).await?;
    let repo = PgLeadRepository::new(db.pool.clone());

    repo.ping().await?;

    let marker = uuid::Uuid::new_v4().simple().to_string();
    let created = repo
        .create(validate_lead(LeadPayload {
            name: Some(format!("Smoke Test {}", marker)),
            industry: Some("Testing".into()),
            technologies: vec!["Rust".into()],
            ..Default::default()
        })?)
        .await?;

    let fetched = repo.get_by_id(created.id).await?;
    assert_eq!(fetched, created);

    let found = repo
        .search(&LeadQuery {
            q: Some(marker.clone()),
            ..Default::default()
        })
        .await?;
    assert_eq!(found.len(), 1);

    let tracked = repo
        .update_tracking(
            created.id,
            TrackingUpdate {
                stage: Some(LeadStage::Contacted),
                notes: Some(Some("call back".into())),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(tracked.tracking.stage, LeadStage::Contacted);
    assert_eq!(tracked.tracking.notes.as_deref(), Some("call back"));

    let cleared = repo
        .update_tracking(
            created.id,
            TrackingUpdate {
                notes: Some(None),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(cleared.tracking.notes, None);
    assert_eq!(cleared.tracking.stage, LeadStage::Contacted);

    let page = repo
        .search(&LeadQuery {
            name: Some(format!("  {}  ", marker)),
            ..Default::default()
        })
        .await?;
    assert_eq!(page.len(), 1);

    repo.delete(created.id).await?;
    assert!(matches!(
        repo.get_by_id(created.id).await,
        Err(AppError::NotFound(_))
    ));
    Ok(())
}
