//! Browse filters over a listing snapshot.
//!
//! All criteria are optional and combine with AND. Matching is
//! case-insensitive; blank criteria are ignored.

use crate::models::TeamRequest;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    /// Exact match on the poster's gender.
    pub gender: Option<String>,
    /// A skill any sought member must list.
    pub skill: Option<String>,
    /// Free text searched in name, bio and member roles and skills.
    pub query: Option<String>,
}

impl RequestFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    pub fn skill(mut self, skill: impl Into<String>) -> Self {
        self.skill = Some(skill.into());
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Records matching every criterion, in input order.
    pub fn apply(&self, records: &[TeamRequest]) -> Vec<TeamRequest> {
        records
            .iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect()
    }

    pub fn matches(&self, record: &TeamRequest) -> bool {
        if let Some(gender) = normalized(&self.gender) {
            let stored = record.gender.as_deref().unwrap_or_default();
            if stored.trim().to_lowercase() != gender {
                return false;
            }
        }

        if let Some(skill) = normalized(&self.skill) {
            let listed = record
                .members
                .iter()
                .flat_map(|m| m.skills.iter())
                .any(|s| s.trim().to_lowercase() == skill);
            if !listed {
                return false;
            }
        }

        if let Some(query) = normalized(&self.query) {
            return searchable_text(record).any(|text| text.to_lowercase().contains(&query));
        }

        true
    }
}

fn normalized(criterion: &Option<String>) -> Option<String> {
    criterion
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

fn searchable_text(record: &TeamRequest) -> impl Iterator<Item = &str> {
    let members = record.members.iter().flat_map(|m| {
        m.role
            .as_deref()
            .into_iter()
            .chain(m.skills.iter().map(String::as_str))
    });

    record
        .name
        .as_deref()
        .into_iter()
        .chain(record.bio.as_deref())
        .chain(members)
}
