use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Lead, LeadQuery, NewLead, TrackingUpdate, DEFAULT_LIST_LIMIT};
use crate::repository::LeadRepository;

/// In-memory lead store for tests and `LEAD_STORE=memory` runs. The mutex is
/// held for a single operation only.
pub struct InMemoryLeadRepository {
    inner: Mutex<Store>,
}

#[derive(Default)]
struct Store {
    leads: HashMap<Uuid, Lead>,
    last_stamp: Option<DateTime<Utc>>,
}

impl Store {
    /// Timestamps strictly increase so `created_at` stays a usable sort key
    /// even when two leads are created within the same clock tick.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if last >= now => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

impl InMemoryLeadRepository {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Store::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Store>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::InternalError("lead store mutex poisoned".into()))
    }
}

impl Default for InMemoryLeadRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeadRepository for InMemoryLeadRepository {
    async fn create(&self, lead: NewLead) -> Result<Lead, AppError> {
        let mut store = self.lock()?;
        let lead = Lead::new(lead, store.next_timestamp());
        store.leads.insert(lead.id, lead.clone());
        Ok(lead)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Lead, AppError> {
        let store = self.lock()?;
        store
            .leads
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::lead_not_found(id))
    }

    async fn search(&self, criteria: &LeadQuery) -> Result<Vec<Lead>, AppError> {
        let store = self.lock()?;
        let mut items: Vec<&Lead> = store
            .leads
            .values()
            .filter(|l| l.matches(criteria))
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(items
            .into_iter()
            .skip(criteria.skip())
            .take(criteria.limit_or(DEFAULT_LIST_LIMIT))
            .cloned()
            .collect())
    }

    async fn update(&self, id: Uuid, lead: NewLead) -> Result<Lead, AppError> {
        let mut store = self.lock()?;
        let now = store.next_timestamp();
        let existing = store
            .leads
            .get_mut(&id)
            .ok_or_else(|| AppError::lead_not_found(id))?;
        existing.replace_attributes(lead, now);
        Ok(existing.clone())
    }

    async fn update_tracking(&self, id: Uuid, update: TrackingUpdate) -> Result<Lead, AppError> {
        let mut store = self.lock()?;
        let now = store.next_timestamp();
        let existing = store
            .leads
            .get_mut(&id)
            .ok_or_else(|| AppError::lead_not_found(id))?;
        update.apply(&mut existing.tracking, now);
        existing.updated_at = now;
        Ok(existing.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut store = self.lock()?;
        store
            .leads
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::lead_not_found(id))
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LeadStage;

    fn new_lead(name: &str) -> NewLead {
        NewLead {
            name: name.to_string(),
            website: None,
            industry: Some("Software".into()),
            company_size: None,
            description: None,
            technologies: vec!["Rust".into()],
            contact_email: None,
            contact_phone: None,
            contact_address: None,
        }
    }

    #[tokio::test]
    async fn create_get_roundtrip() {
        let repo = InMemoryLeadRepository::new();
        let created = repo.create(new_lead("Acme")).await.unwrap();
        let fetched = repo.get_by_id(created.id).await.unwrap();
        assert_eq!(created, fetched);
        assert_eq!(fetched.tracking.stage, LeadStage::New);
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let repo = InMemoryLeadRepository::new();
        let id = Uuid::new_v4();
        assert!(matches!(repo.get_by_id(id).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            repo.update(id, new_lead("x")).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(repo.delete(id).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            repo.update_tracking(id, TrackingUpdate::default()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn search_pages_in_creation_order() {
        let repo = InMemoryLeadRepository::new();
        let mut ids = Vec::new();
        for i in 0..7 {
            ids.push(repo.create(new_lead(&format!("Lead {i}"))).await.unwrap().id);
        }

        let page = |skip| LeadQuery {
            limit: Some(3),
            skip: Some(skip),
            ..Default::default()
        };
        let mut seen = Vec::new();
        for skip in [0, 3, 6] {
            seen.extend(repo.search(&page(skip)).await.unwrap().into_iter().map(|l| l.id));
        }
        assert_eq!(seen, ids);

        let again: Vec<_> = repo
            .search(&page(0))
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(again, ids[..3]);
    }

    #[tokio::test]
    async fn update_keeps_identity_and_tracking() {
        let repo = InMemoryLeadRepository::new();
        let created = repo.create(new_lead("Acme")).await.unwrap();
        repo.update_tracking(
            created.id,
            TrackingUpdate {
                stage: Some(LeadStage::Qualified),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let updated = repo.update(created.id, new_lead("Acme Holdings")).await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.name, "Acme Holdings");
        assert_eq!(updated.tracking.stage, LeadStage::Qualified);
        assert!(updated.updated_at > created.updated_at);
    }

    #[tokio::test]
    async fn timestamps_strictly_increase() {
        let repo = InMemoryLeadRepository::new();
        let mut last = None;
        for i in 0..50 {
            let lead = repo.create(new_lead(&format!("Lead {i}"))).await.unwrap();
            if let Some(prev) = last {
                assert!(lead.created_at > prev);
            }
            last = Some(lead.created_at);
        }
    }
}
