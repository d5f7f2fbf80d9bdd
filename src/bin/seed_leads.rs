//! Inserts a handful of sample leads for local development.
//!
//! Usage: `cargo run --bin seed_leads` with the usual environment in `.env`.

use lead_api::config::Config;
use lead_api::db::Database;
use lead_api::models::LeadPayload;
use lead_api::repository::{LeadRepository, PgLeadRepository};
use lead_api::validation::validate_lead;

fn samples() -> Vec<LeadPayload> {
    vec![
        LeadPayload {
            name: Some("TechStartup Inc".into()),
            website: Some("https://techstartup.com".into()),
            industry: Some("Technology".into()),
            company_size: Some("startup".into()),
            description: Some("SaaS platform development".into()),
            technologies: vec!["React".into(), "Node.js".into(), "AWS".into()],
            contact_email: Some("hello@techstartup.com".into()),
            ..Default::default()
        },
        LeadPayload {
            name: Some("Local Restaurant".into()),
            website: Some("localrestaurant.com".into()),
            industry: Some("Food & Beverage".into()),
            company_size: Some("small".into()),
            contact_email: Some("info@localrestaurant.com".into()),
            contact_phone: Some("+1 (555) 010-2030".into()),
            ..Default::default()
        },
        LeadPayload {
            name: Some("Acme Manufacturing".into()),
            website: Some("https://acme-manufacturing.example".into()),
            industry: Some("Manufacturing".into()),
            company_size: Some("enterprise".into()),
            ..Default::default()
        },
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let db = Database::new(&config).await?;
    let repo = PgLeadRepository::new(db.pool);

    let mut created = 0usize;
    for payload in samples() {
        let lead = repo.create(validate_lead(payload)?).await?;
        println!("Created lead {} ({})", lead.id, lead.name);
        created += 1;
    }

    println!("Seeded {} leads", created);
    Ok(())
}
