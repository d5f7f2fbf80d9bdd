use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const DEFAULT_SEARCH_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 500;

// ============ Lead ============

/// A sales lead. `id` is assigned once at creation and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub company_size: Option<String>,
    pub description: Option<String>,
    pub technologies: Vec<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_address: Option<String>,
    pub tracking: LeadTracking,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Builds a fresh lead from validated input.
    pub fn new(input: NewLead, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: input.name,
            website: input.website,
            industry: input.industry,
            company_size: input.company_size,
            description: input.description,
            technologies: input.technologies,
            contact_email: input.contact_email,
            contact_phone: input.contact_phone,
            contact_address: input.contact_address,
            tracking: LeadTracking::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces every descriptive attribute; id, tracking and `created_at` stay.
    pub fn replace_attributes(&mut self, input: NewLead, now: DateTime<Utc>) {
        self.name = input.name;
        self.website = input.website;
        self.industry = input.industry;
        self.company_size = input.company_size;
        self.description = input.description;
        self.technologies = input.technologies;
        self.contact_email = input.contact_email;
        self.contact_phone = input.contact_phone;
        self.contact_address = input.contact_address;
        self.updated_at = now;
    }

    pub fn matches(&self, criteria: &LeadQuery) -> bool {
        fn contains(haystack: Option<&str>, needle: &str) -> bool {
            haystack.is_some_and(|h| h.to_lowercase().contains(needle))
        }

        if let Some(q) = criteria.text() {
            let q = q.to_lowercase();
            let hit = contains(Some(self.name.as_str()), &q)
                || contains(self.website.as_deref(), &q)
                || contains(self.industry.as_deref(), &q)
                || contains(self.contact_email.as_deref(), &q);
            if !hit {
                return false;
            }
        }
        if let Some(name) = criteria.name_term() {
            if !contains(Some(self.name.as_str()), &name.to_lowercase()) {
                return false;
            }
        }
        if let Some(industry) = criteria.industry_term() {
            if !contains(self.industry.as_deref(), &industry.to_lowercase()) {
                return false;
            }
        }
        if let Some(stage) = criteria.stage {
            if self.tracking.stage != stage {
                return false;
            }
        }
        true
    }
}

/// Validated attributes for creating or replacing a lead.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLead {
    pub name: String,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub company_size: Option<String>,
    pub description: Option<String>,
    pub technologies: Vec<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_address: Option<String>,
}

/// Raw request body for POST/PUT, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeadPayload {
    pub name: Option<String>,
    pub website: Option<String>,
    pub industry: Option<String>,
    #[serde(alias = "size")]
    pub company_size: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_address: Option<String>,
}

// ============ Tracking ============

/// Stage in the sales pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStage {
    #[default]
    New,
    Contacted,
    Qualified,
    ProposalGenerated,
    ProposalSent,
    Negotiation,
    Won,
    Lost,
}

impl LeadStage {
    pub const ALL: [LeadStage; 8] = [
        LeadStage::New,
        LeadStage::Contacted,
        LeadStage::Qualified,
        LeadStage::ProposalGenerated,
        LeadStage::ProposalSent,
        LeadStage::Negotiation,
        LeadStage::Won,
        LeadStage::Lost,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LeadStage::New => "new",
            LeadStage::Contacted => "contacted",
            LeadStage::Qualified => "qualified",
            LeadStage::ProposalGenerated => "proposal_generated",
            LeadStage::ProposalSent => "proposal_sent",
            LeadStage::Negotiation => "negotiation",
            LeadStage::Won => "won",
            LeadStage::Lost => "lost",
        }
    }
}

impl fmt::Display for LeadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LeadStage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown lead stage '{}'", s))
    }
}

/// Pipeline tracking attached to every lead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadTracking {
    pub stage: LeadStage,
    pub proposal_generated: bool,
    pub proposal_sent: bool,
    pub proposal_sent_at: Option<DateTime<Utc>>,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub next_follow_up_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Partial update of [`LeadTracking`]. Absent fields are left alone; an
/// explicit `null` clears the nullable ones.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackingUpdate {
    pub stage: Option<LeadStage>,
    pub proposal_generated: Option<bool>,
    pub proposal_sent: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub proposal_sent_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "present")]
    pub last_contacted_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "present")]
    pub next_follow_up_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "present")]
    pub notes: Option<Option<String>>,
}

/// Marks a field as present in the payload, so `null` becomes `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl TrackingUpdate {
    pub fn is_empty(&self) -> bool {
        *self == TrackingUpdate::default()
    }

    /// Fills in `stage` from the proposal flags when the caller did not set it.
    pub fn with_derived_stage(mut self) -> Self {
        if self.stage.is_none() {
            if self.proposal_sent == Some(true) {
                self.stage = Some(LeadStage::ProposalSent);
            } else if self.proposal_generated == Some(true) {
                self.stage = Some(LeadStage::ProposalGenerated);
            }
        }
        self
    }

    pub fn apply(&self, tracking: &mut LeadTracking, now: DateTime<Utc>) {
        if let Some(stage) = self.stage {
            tracking.stage = stage;
        }
        if let Some(generated) = self.proposal_generated {
            tracking.proposal_generated = generated;
        }
        if let Some(sent) = self.proposal_sent {
            tracking.proposal_sent = sent;
        }
        if let Some(sent_at) = self.proposal_sent_at {
            tracking.proposal_sent_at = sent_at;
        }
        if let Some(contacted_at) = self.last_contacted_at {
            tracking.last_contacted_at = contacted_at;
        }
        if let Some(follow_up_at) = self.next_follow_up_at {
            tracking.next_follow_up_at = follow_up_at;
        }
        if let Some(notes) = &self.notes {
            tracking.notes = notes.clone();
        }
        tracking.updated_at = Some(now);
    }
}

// ============ Search ============

/// Query-string criteria for listing and searching leads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadQuery {
    pub q: Option<String>,
    /// Alias of `q`, kept for older clients.
    pub query: Option<String>,
    pub name: Option<String>,
    pub industry: Option<String>,
    pub stage: Option<LeadStage>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

impl LeadQuery {
    /// Free-text term, `q` winning over `query`.
    pub fn text(&self) -> Option<&str> {
        non_blank(self.q.as_deref().or(self.query.as_deref()))
    }

    pub fn name_term(&self) -> Option<&str> {
        non_blank(self.name.as_deref())
    }

    pub fn industry_term(&self) -> Option<&str> {
        non_blank(self.industry.as_deref())
    }

    pub fn has_criteria(&self) -> bool {
        self.text().is_some()
            || self.name_term().is_some()
            || self.industry_term().is_some()
            || self.stage.is_some()
    }

    pub fn limit_or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).min(MAX_LIMIT)
    }

    pub fn skip(&self) -> usize {
        self.skip.unwrap_or(0)
    }

    /// Paging values as SQL `LIMIT`/`OFFSET` operands.
    pub fn sql_paging(&self, default_limit: usize) -> Result<(i64, i64), String> {
        let limit = i64::try_from(self.limit_or(default_limit))
            .map_err(|_| "limit out of range".to_string())?;
        let skip = i64::try_from(self.skip())
            .map_err(|_| format!("skip must be at most {}", i64::MAX))?;
        Ok((limit, skip))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

// ============ Database rows ============

/// Flat row shape of the `leads` table.
#[derive(Debug, Clone, FromRow)]
pub struct LeadRow {
    pub id: Uuid,
    pub name: String,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub company_size: Option<String>,
    pub description: Option<String>,
    pub technologies: Vec<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_address: Option<String>,
    pub stage: String,
    pub proposal_generated: bool,
    pub proposal_sent: bool,
    pub proposal_sent_at: Option<DateTime<Utc>>,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub next_follow_up_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub tracking_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<LeadRow> for Lead {
    type Error = String;

    fn try_from(row: LeadRow) -> Result<Self, Self::Error> {
        Ok(Lead {
            id: row.id,
            name: row.name,
            website: row.website,
            industry: row.industry,
            company_size: row.company_size,
            description: row.description,
            technologies: row.technologies,
            contact_email: row.contact_email,
            contact_phone: row.contact_phone,
            contact_address: row.contact_address,
            tracking: LeadTracking {
                stage: row.stage.parse()?,
                proposal_generated: row.proposal_generated,
                proposal_sent: row.proposal_sent,
                proposal_sent_at: row.proposal_sent_at,
                last_contacted_at: row.last_contacted_at,
                next_follow_up_at: row.next_follow_up_at,
                notes: row.notes,
                updated_at: row.tracking_updated_at,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Lead {
        Lead::new(
            NewLead {
                name: "Acme Corp".into(),
                website: Some("https://acme.example".into()),
                industry: Some("Manufacturing".into()),
                company_size: None,
                description: None,
                technologies: vec![],
                contact_email: Some("sales@acme.example".into()),
                contact_phone: None,
                contact_address: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn stage_parses_from_wire_names() {
        for stage in LeadStage::ALL {
            assert_eq!(stage.as_str().parse::<LeadStage>(), Ok(stage));
        }
        assert!("archived".parse::<LeadStage>().is_err());
    }

    #[test]
    fn text_search_is_case_insensitive_across_fields() {
        let lead = sample();
        let by = |q: &str| LeadQuery {
            q: Some(q.into()),
            ..Default::default()
        };
        assert!(lead.matches(&by("ACME")));
        assert!(lead.matches(&by("manufact")));
        assert!(lead.matches(&by("sales@")));
        assert!(!lead.matches(&by("globex")));
    }

    #[test]
    fn stage_derived_from_proposal_flags() {
        let update = TrackingUpdate {
            proposal_generated: Some(true),
            proposal_sent: Some(true),
            ..Default::default()
        }
        .with_derived_stage();
        assert_eq!(update.stage, Some(LeadStage::ProposalSent));

        let explicit = TrackingUpdate {
            stage: Some(LeadStage::Won),
            proposal_sent: Some(true),
            ..Default::default()
        }
        .with_derived_stage();
        assert_eq!(explicit.stage, Some(LeadStage::Won));
    }

    #[test]
    fn apply_leaves_absent_fields() {
        let mut tracking = LeadTracking {
            notes: Some("call back".into()),
            ..Default::default()
        };
        TrackingUpdate {
            stage: Some(LeadStage::Contacted),
            ..Default::default()
        }
        .apply(&mut tracking, Utc::now());
        assert_eq!(tracking.stage, LeadStage::Contacted);
        assert_eq!(tracking.notes.as_deref(), Some("call back"));
        assert!(tracking.updated_at.is_some());
    }

    #[test]
    fn explicit_null_clears_tracking_fields() {
        let mut tracking = LeadTracking {
            notes: Some("call back".into()),
            last_contacted_at: Some(Utc::now()),
            ..Default::default()
        };
        let update: TrackingUpdate =
            serde_json::from_str(r#"{"notes": null, "last_contacted_at": null}"#).unwrap();
        assert!(!update.is_empty());
        assert_eq!(update.notes, Some(None));
        assert_eq!(update.next_follow_up_at, None);

        update.apply(&mut tracking, Utc::now());
        assert_eq!(tracking.notes, None);
        assert_eq!(tracking.last_contacted_at, None);
    }

    #[test]
    fn name_and_industry_criteria_are_trimmed() {
        let lead = sample();
        let by_name = LeadQuery {
            name: Some("  acme ".into()),
            ..Default::default()
        };
        assert!(lead.matches(&by_name));

        let by_industry = LeadQuery {
            industry: Some(" manufacturing\t".into()),
            ..Default::default()
        };
        assert!(lead.matches(&by_industry));

        let blank = LeadQuery {
            name: Some("   ".into()),
            ..Default::default()
        };
        assert!(!blank.has_criteria());
    }

    #[test]
    fn oversized_skip_is_rejected() {
        let query = LeadQuery {
            skip: Some(usize::MAX),
            ..Default::default()
        };
        assert!(query.sql_paging(DEFAULT_LIST_LIMIT).is_err());
        assert_eq!(
            LeadQuery::default().sql_paging(DEFAULT_SEARCH_LIMIT),
            Ok((50, 0))
        );
    }

    #[test]
    fn limit_is_capped() {
        let query = LeadQuery {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(query.limit_or(DEFAULT_LIST_LIMIT), MAX_LIMIT);
        assert_eq!(LeadQuery::default().limit_or(DEFAULT_SEARCH_LIMIT), 50);
    }
}
