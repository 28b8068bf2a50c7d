//! Identity repository

use chrono::{DateTime, Utc};
use rekrut_core::types::{AuditEntry, Identity, NewIdentity, Role};
use rekrut_core::{Error, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};
use uuid::Uuid;

type IdentityRow = (
    String,         // id
    String,         // email
    Option<String>, // directory_id
    Option<String>, // local_credential_hash
    String,         // role
    String,         // first_name
    String,         // last_name
    Option<String>, // last_directory_sync_at
    String,         // created_at
);

const IDENTITY_COLUMNS: &str = "id, email, directory_id, local_credential_hash, role, \
     first_name, last_name, last_directory_sync_at, created_at";

pub struct IdentityStore {
    pool: SqlitePool,
}

impl IdentityStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        // email is the sole natural key; COLLATE NOCASE makes the
        // uniqueness constraint case-insensitive
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS identities (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                directory_id TEXT UNIQUE,
                local_credential_hash TEXT,
                role TEXT NOT NULL DEFAULT 'standard',
                first_name TEXT NOT NULL DEFAULT '',
                last_name TEXT NOT NULL DEFAULT '',
                last_directory_sync_at TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                actor TEXT NOT NULL,
                detail TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        debug!("identity store initialized");
        Ok(())
    }

    /// Either match counts: handles a changed directory UID with a stable
    /// email, and the reverse.
    pub async fn find_by_email_or_directory_id(
        &self,
        email: &str,
        directory_id: Option<&str>,
    ) -> Result<Option<Identity>> {
        let row: Option<IdentityRow> = sqlx::query_as(&format!(
            "SELECT {} FROM identities WHERE email = ? OR (directory_id IS NOT NULL AND directory_id = ?)",
            IDENTITY_COLUMNS
        ))
        .bind(email.to_lowercase())
        .bind(directory_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        row.map(identity_from_row).transpose()
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let row: Option<IdentityRow> = sqlx::query_as(&format!(
            "SELECT {} FROM identities WHERE email = ?",
            IDENTITY_COLUMNS
        ))
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        row.map(identity_from_row).transpose()
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>> {
        let row: Option<IdentityRow> = sqlx::query_as(&format!(
            "SELECT {} FROM identities WHERE id = ?",
            IDENTITY_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        row.map(identity_from_row).transpose()
    }

    /// Insert a new identity row. A duplicate email (or directory id)
    /// surfaces as `Error::Conflict`, which the reconciler treats as "go
    /// fetch and update".
    pub async fn create(&self, new: NewIdentity) -> Result<Identity> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let email = new.email.to_lowercase();

        sqlx::query(
            r#"
            INSERT INTO identities
                (id, email, directory_id, local_credential_hash, role,
                 first_name, last_name, last_directory_sync_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&email)
        .bind(&new.directory_id)
        .bind(&new.local_credential_hash)
        .bind(new.role.as_str())
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.last_directory_sync_at.map(|t| t.to_rfc3339()))
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::Conflict(email.clone())
            } else {
                Error::Database(e.to_string())
            }
        })?;

        info!(%id, %email, "identity created");

        Ok(Identity {
            id,
            email,
            directory_id: new.directory_id,
            local_credential_hash: new.local_credential_hash,
            role: new.role,
            first_name: new.first_name,
            last_name: new.last_name,
            last_directory_sync_at: new.last_directory_sync_at,
            created_at: now,
        })
    }

    /// Profile-field sync from the directory. The local credential hash is
    /// deliberately untouched; local-login capability is independent of
    /// directory state.
    pub async fn update_profile_fields(
        &self,
        id: Uuid,
        directory_id: &str,
        first_name: &str,
        last_name: &str,
        role: Role,
        synced_at: DateTime<Utc>,
    ) -> Result<Identity> {
        let updated = sqlx::query(
            r#"
            UPDATE identities
            SET directory_id = ?, first_name = ?, last_name = ?, role = ?,
                last_directory_sync_at = ?
            WHERE id = ?
            "#,
        )
        .bind(directory_id)
        .bind(first_name)
        .bind(last_name)
        .bind(role.as_str())
        .bind(synced_at.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        self.find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub async fn set_local_credential(&self, id: Uuid, hash: &str) -> Result<()> {
        let updated = sqlx::query("UPDATE identities SET local_credential_hash = ? WHERE id = ?")
            .bind(hash)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        info!(%id, "local credential set");
        Ok(())
    }

    /// Fire-and-forget target: callers spawn this and only log failures.
    pub async fn record_audit(&self, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (action, entity_type, entity_id, actor, detail, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.actor)
        .bind(&entry.detail)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

fn identity_from_row(row: IdentityRow) -> Result<Identity> {
    Ok(Identity {
        id: Uuid::parse_str(&row.0).map_err(|e| Error::Database(e.to_string()))?,
        email: row.1,
        directory_id: row.2,
        local_credential_hash: row.3,
        role: row.4.parse()?,
        first_name: row.5,
        last_name: row.6,
        last_directory_sync_at: row.7.as_deref().map(parse_ts).transpose()?,
        created_at: parse_ts(&row.8)?,
    })
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Database(format!("bad timestamp {}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> IdentityStore {
        IdentityStore::new("sqlite::memory:").await.unwrap()
    }

    fn new_identity(email: &str) -> NewIdentity {
        NewIdentity {
            email: email.to_string(),
            directory_id: None,
            local_credential_hash: None,
            role: Role::Standard,
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            last_directory_sync_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = memory_store().await;

        let created = store.create(new_identity("Jane.Doe@sunrise.net")).await.unwrap();
        assert_eq!(created.email, "jane.doe@sunrise.net");

        let found = store.find_by_email("JANE.DOE@sunrise.net").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.role, Role::Standard);
        assert!(found.local_credential_hash.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let store = memory_store().await;

        store.create(new_identity("a@sunrise.net")).await.unwrap();
        let err = store.create(new_identity("A@sunrise.net")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_find_by_email_or_directory_id() {
        let store = memory_store().await;

        let mut new = new_identity("a@sunrise.net");
        new.directory_id = Some("uid-1001".to_string());
        let created = store.create(new).await.unwrap();

        // Email changed in the directory, UID stable
        let by_uid = store
            .find_by_email_or_directory_id("renamed@sunrise.net", Some("uid-1001"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_uid.id, created.id);

        // UID changed, email stable
        let by_email = store
            .find_by_email_or_directory_id("a@sunrise.net", Some("uid-9999"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, created.id);

        let none = store
            .find_by_email_or_directory_id("other@sunrise.net", None)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_update_preserves_credential_hash() {
        let store = memory_store().await;

        let mut new = new_identity("a@sunrise.net");
        new.local_credential_hash = Some("$argon2id$stub".to_string());
        let created = store.create(new).await.unwrap();

        let updated = store
            .update_profile_fields(created.id, "uid-1001", "Janet", "Doe", Role::Administrator, Utc::now())
            .await
            .unwrap();

        assert_eq!(updated.first_name, "Janet");
        assert_eq!(updated.role, Role::Administrator);
        assert_eq!(updated.local_credential_hash.as_deref(), Some("$argon2id$stub"));
        assert!(updated.last_directory_sync_at.is_some());
    }

    #[tokio::test]
    async fn test_set_local_credential() {
        let store = memory_store().await;

        let created = store.create(new_identity("a@sunrise.net")).await.unwrap();
        store.set_local_credential(created.id, "$argon2id$new").await.unwrap();

        let found = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.local_credential_hash.as_deref(), Some("$argon2id$new"));

        let err = store
            .set_local_credential(Uuid::new_v4(), "$argon2id$x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_record_audit() {
        let store = memory_store().await;
        let entry = AuditEntry::login("a@sunrise.net", "ldap", "success", "10.0.0.9");
        store.record_audit(&entry).await.unwrap();
    }
}
