//! Database repository for team request CRUD.
//!
//! A request row owns its member rows; writes touching both run in one transaction.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::errors::AppError;
use crate::models::{TeamMember, TeamRequest};

const REQUEST_COLUMNS: &str =
    "id, owner_fingerprint, name, gender, phone, bio, extra, created_at, updated_at";

/// Database repository for team requests and their members.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List all requests, newest first, each with its members in order.
    pub async fn list_requests(&self) -> Result<Vec<TeamRequest>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM team_requests ORDER BY created_at DESC",
            REQUEST_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let member_rows = sqlx::query(
            "SELECT request_id, role, skills, gender_preference, extra FROM team_members ORDER BY request_id, position",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut members: HashMap<String, Vec<TeamMember>> = HashMap::new();
        for row in &member_rows {
            members
                .entry(row.get("request_id"))
                .or_default()
                .push(member_from_row(row));
        }

        Ok(rows
            .iter()
            .map(|row| {
                let mut request = request_from_row(row);
                if let Some(id) = request.id.as_deref() {
                    request.members = members.remove(id).unwrap_or_default();
                }
                request
            })
            .collect())
    }

    /// Get a request by ID.
    pub async fn get_request(&self, id: &str) -> Result<Option<TeamRequest>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM team_requests WHERE id = ?",
            REQUEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut request = request_from_row(&row);
        request.members = self.list_members(id).await?;
        Ok(Some(request))
    }

    async fn list_members(&self, request_id: &str) -> Result<Vec<TeamMember>, AppError> {
        let rows = sqlx::query(
            "SELECT role, skills, gender_preference, extra FROM team_members WHERE request_id = ? ORDER BY position",
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(member_from_row).collect())
    }

    /// Create a request.
    ///
    /// A client-supplied id is honoured. Re-creating an existing id with the
    /// same owner returns the stored record unchanged, so replayed offline
    /// creates do not duplicate.
    pub async fn create_request(&self, request: TeamRequest) -> Result<TeamRequest, AppError> {
        if let Some(id) = request.identity() {
            if let Some(existing) = self.get_request(id).await? {
                if existing.owner_fingerprint != request.owner_fingerprint {
                    return Err(AppError::Forbidden(format!(
                        "Team request {} belongs to another owner",
                        id
                    )));
                }
                tracing::debug!("Create for existing team request {} treated as replay", id);
                return Ok(existing);
            }
        }

        let id = request
            .identity()
            .map(String::from)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let created_at = request
            .created_at
            .clone()
            .unwrap_or_else(|| Utc::now().to_rfc3339());

        let record = TeamRequest {
            id: Some(id.clone()),
            created_at: Some(created_at),
            updated_at: None,
            ..request
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO team_requests (id, owner_fingerprint, name, gender, phone, bio, extra, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&record.owner_fingerprint)
        .bind(&record.name)
        .bind(&record.gender)
        .bind(&record.phone)
        .bind(&record.bio)
        .bind(extra_to_json(&record.extra))
        .bind(&record.created_at)
        .bind(&record.updated_at)
        .execute(&mut *tx)
        .await?;

        insert_members(&mut tx, &id, &record.members).await?;
        tx.commit().await?;

        Ok(record)
    }

    /// Replace a request's content and members, checking ownership.
    pub async fn update_request(
        &self,
        id: &str,
        request: TeamRequest,
    ) -> Result<TeamRequest, AppError> {
        let existing = self
            .get_request(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Team request {} not found", id)))?;

        ensure_owner(&existing, &request.owner_fingerprint)?;

        let record = TeamRequest {
            id: existing.id,
            owner_fingerprint: existing.owner_fingerprint,
            created_at: existing.created_at,
            updated_at: Some(Utc::now().to_rfc3339()),
            ..request
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE team_requests SET name = ?, gender = ?, phone = ?, bio = ?, extra = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&record.name)
        .bind(&record.gender)
        .bind(&record.phone)
        .bind(&record.bio)
        .bind(extra_to_json(&record.extra))
        .bind(&record.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM team_members WHERE request_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_members(&mut tx, id, &record.members).await?;
        tx.commit().await?;

        Ok(record)
    }

    /// Delete a request after checking ownership. Members cascade.
    pub async fn delete_request(&self, id: &str, owner_fingerprint: &str) -> Result<(), AppError> {
        let existing = self
            .get_request(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Team request {} not found", id)))?;

        ensure_owner(&existing, owner_fingerprint)?;
        self.force_delete_request(id).await
    }

    /// Delete a request without an ownership check (moderation).
    pub async fn force_delete_request(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM team_requests WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Team request {} not found", id)));
        }
        Ok(())
    }

    /// Count member rows for a request, including orphans.
    pub async fn count_member_rows(&self, request_id: &str) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM team_members WHERE request_id = ?")
            .bind(request_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

fn ensure_owner(existing: &TeamRequest, owner_fingerprint: &str) -> Result<(), AppError> {
    if existing.owner_fingerprint != owner_fingerprint {
        return Err(AppError::Forbidden(format!(
            "Not the owner of team request {}",
            existing.id.as_deref().unwrap_or_default()
        )));
    }
    Ok(())
}

async fn insert_members(
    tx: &mut Transaction<'_, Sqlite>,
    request_id: &str,
    members: &[TeamMember],
) -> Result<(), AppError> {
    for (position, member) in members.iter().enumerate() {
        let skills_json = serde_json::to_string(&member.skills)?;
        sqlx::query(
            "INSERT INTO team_members (request_id, position, role, skills, gender_preference, extra) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(request_id)
        .bind(position as i64)
        .bind(&member.role)
        .bind(&skills_json)
        .bind(&member.gender_preference)
        .bind(extra_to_json(&member.extra))
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn extra_to_json(extra: &Map<String, Value>) -> Option<String> {
    if extra.is_empty() {
        None
    } else {
        serde_json::to_string(extra).ok()
    }
}

fn extra_from_json(raw: Option<String>) -> Map<String, Value> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

fn request_from_row(row: &SqliteRow) -> TeamRequest {
    TeamRequest {
        id: Some(row.get("id")),
        owner_fingerprint: row.get("owner_fingerprint"),
        name: row.get("name"),
        gender: row.get("gender"),
        phone: row.get("phone"),
        bio: row.get("bio"),
        created_at: Some(row.get("created_at")),
        updated_at: row.get("updated_at"),
        members: Vec::new(),
        extra: extra_from_json(row.get("extra")),
    }
}

fn member_from_row(row: &SqliteRow) -> TeamMember {
    let skills: Option<String> = row.get("skills");
    TeamMember {
        role: row.get("role"),
        skills: skills
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        gender_preference: row.get("gender_preference"),
        extra: extra_from_json(row.get("extra")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    async fn repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("repo.sqlite"))
            .await
            .unwrap();
        (Repository::new(pool), temp_dir)
    }

    fn sample(owner: &str) -> TeamRequest {
        TeamRequest {
            owner_fingerprint: owner.to_string(),
            name: Some("Mira".to_string()),
            members: vec![
                TeamMember {
                    role: Some("frontend".to_string()),
                    skills: vec!["react".to_string()],
                    ..TeamMember::default()
                },
                TeamMember {
                    role: Some("ml".to_string()),
                    skills: vec!["python".to_string(), "pytorch".to_string()],
                    ..TeamMember::default()
                },
            ],
            ..TeamRequest::default()
        }
    }

    #[tokio::test]
    async fn test_create_assigns_identity_and_keeps_member_order() {
        let (repo, _dir) = repo().await;

        let created = repo.create_request(sample("fp-a")).await.unwrap();
        let id = created.id.clone().unwrap();
        assert!(created.created_at.is_some());
        assert!(created.updated_at.is_none());

        let fetched = repo.get_request(&id).await.unwrap().unwrap();
        assert_eq!(fetched.members.len(), 2);
        assert_eq!(fetched.members[0].role.as_deref(), Some("frontend"));
        assert_eq!(fetched.members[1].skills, vec!["python", "pytorch"]);
    }

    #[tokio::test]
    async fn test_create_with_existing_id_is_idempotent() {
        let (repo, _dir) = repo().await;

        let mut offline = sample("fp-a");
        offline.id = Some("local-1".to_string());
        offline.created_at = Some("2024-03-01T08:00:00+00:00".to_string());

        let first = repo.create_request(offline.clone()).await.unwrap();
        let second = repo.create_request(offline.clone()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.created_at.as_deref(), Some("2024-03-01T08:00:00+00:00"));
        assert_eq!(repo.list_requests().await.unwrap().len(), 1);

        offline.owner_fingerprint = "fp-b".to_string();
        let err = repo.create_request(offline).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_update_replaces_members_and_checks_owner() {
        let (repo, _dir) = repo().await;
        let created = repo.create_request(sample("fp-a")).await.unwrap();
        let id = created.id.clone().unwrap();

        let mut change = sample("fp-b");
        change.members.truncate(1);
        let err = repo.update_request(&id, change.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        change.owner_fingerprint = "fp-a".to_string();
        change.created_at = Some("1999-01-01T00:00:00Z".to_string());
        let updated = repo.update_request(&id, change).await.unwrap();
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at.is_some());
        assert_eq!(updated.members.len(), 1);
        assert_eq!(repo.count_member_rows(&id).await.unwrap(), 1);

        let err = repo.update_request("missing", sample("fp-a")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_checks_owner_and_cascades() {
        let (repo, _dir) = repo().await;
        let created = repo.create_request(sample("fp-a")).await.unwrap();
        let id = created.id.unwrap();

        let err = repo.delete_request(&id, "fp-b").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        repo.delete_request(&id, "fp-a").await.unwrap();
        assert!(repo.get_request(&id).await.unwrap().is_none());
        assert_eq!(repo.count_member_rows(&id).await.unwrap(), 0);

        let err = repo.delete_request(&id, "fp-a").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
