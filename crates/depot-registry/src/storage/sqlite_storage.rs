//! SQLite metadata storage implementation
//!
//! Stores artifacts and their published versions in a local SQLite database
//! file. Version creation runs as one unit of work, so an artifact row is
//! never left behind without the version it was created for.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::str::FromStr;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;
use uuid::Uuid;

use crate::collaborators::Persister;
use crate::entities::{Artifact, ArtifactVersion, PackageFormat};
use crate::error::{RegistryError, Result};
use crate::unit_of_work::with_tx;

/// SQLite-based artifact storage
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance with the given database url
    ///
    /// Example: `sqlite:./data/depot.db`. The file is created if missing.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize database schema
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS artifacts (
                id TEXT PRIMARY KEY,                 -- UUID
                name TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL,
                format TEXT NOT NULL,                -- package format tag (e.g. "gomod")
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS artifact_versions (
                id TEXT PRIMARY KEY,
                artifact_id TEXT NOT NULL REFERENCES artifacts(id) ON DELETE CASCADE,
                version TEXT NOT NULL,
                uri TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (artifact_id, version)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_artifacts_created ON artifacts(created_at)",
            "CREATE INDEX IF NOT EXISTS idx_artifacts_updated ON artifacts(updated_at)",
            "CREATE INDEX IF NOT EXISTS idx_versions_created ON artifact_versions(created_at)",
            "CREATE INDEX IF NOT EXISTS idx_versions_updated ON artifact_versions(updated_at)",
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    /// Persist an artifact together with its pending versions
    ///
    /// The artifact row is looked up by name and created when absent. Every
    /// version in `artifact.versions` is inserted; an existing
    /// `(artifact, version)` pair fails with
    /// [`RegistryError::AlreadyPublished`] and nothing is written.
    pub async fn create_artifact(&self, artifact: Artifact) -> Result<Artifact> {
        artifact.validate()?;
        let name = artifact.name.clone();

        let created = with_tx(&self.pool, move |conn| {
            Box::pin(async move {
                let mut artifact = artifact;
                let id = resolve_artifact(conn, &mut artifact).await?;
                for version in &mut artifact.versions {
                    insert_version(conn, id, &artifact.name, version).await?;
                }
                if !artifact.versions.is_empty() {
                    touch_artifact(conn, &mut artifact).await?;
                }
                Ok::<_, RegistryError>(artifact)
            })
        })
        .await?;

        info!(artifact = %name, versions = created.versions.len(), "artifact persisted");
        Ok(created)
    }

    /// Get an artifact and all of its versions by name
    pub async fn get_artifact(&self, name: &str) -> Result<Artifact> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, format, created_at, updated_at
            FROM artifacts
            WHERE name = ?
        "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RegistryError::ArtifactNotFound(name.to_string()))?;

        let mut artifact = artifact_from_row(&row)?;
        artifact.versions = self.list_versions(parse_id(&row.try_get::<String, _>("id")?)?).await?;
        Ok(artifact)
    }

    /// List all artifacts ordered by name, each with its versions
    pub async fn list_artifacts(&self) -> Result<Vec<Artifact>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, format, created_at, updated_at
            FROM artifacts
            ORDER BY name ASC
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut artifacts = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut artifact = artifact_from_row(row)?;
            artifact.versions = self.list_versions(parse_id(&row.try_get::<String, _>("id")?)?).await?;
            artifacts.push(artifact);
        }
        Ok(artifacts)
    }

    /// Get one published version of an artifact
    pub async fn get_version(&self, name: &str, version: &str) -> Result<ArtifactVersion> {
        let row = sqlx::query(
            r#"
            SELECT v.id, v.version, v.uri, v.created_at, v.updated_at
            FROM artifact_versions v
            JOIN artifacts a ON a.id = v.artifact_id
            WHERE a.name = ? AND v.version = ?
        "#,
        )
        .bind(name)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RegistryError::VersionNotFound {
            name: name.to_string(),
            version: version.to_string(),
        })?;

        version_from_row(&row)
    }

    async fn list_versions(&self, artifact_id: Uuid) -> Result<Vec<ArtifactVersion>> {
        let rows = sqlx::query(
            r#"
            SELECT id, version, uri, created_at, updated_at
            FROM artifact_versions
            WHERE artifact_id = ?
            ORDER BY created_at ASC, version ASC
        "#,
        )
        .bind(artifact_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(version_from_row).collect()
    }
}

#[async_trait]
impl Persister for SqliteStorage {
    async fn create_artifact(&self, artifact: Artifact) -> Result<Artifact> {
        SqliteStorage::create_artifact(self, artifact).await
    }

    async fn version_exists(&self, name: &str, version: &str) -> Result<bool> {
        match self.get_version(name, version).await {
            Ok(_) => Ok(true),
            Err(RegistryError::VersionNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Find the artifact row by name, inserting it if absent, and fill in the
/// stored id and timestamps
async fn resolve_artifact(conn: &mut SqliteConnection, artifact: &mut Artifact) -> Result<Uuid> {
    sqlx::query(
        r#"
        INSERT INTO artifacts (id, name, description, format, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (name) DO NOTHING
    "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&artifact.name)
    .bind(&artifact.description)
    .bind(artifact.format.as_str())
    .bind(format_timestamp(artifact.created_at)?)
    .bind(format_timestamp(artifact.updated_at)?)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query(
        r#"
        SELECT id, name, description, format, created_at, updated_at
        FROM artifacts
        WHERE name = ?
    "#,
    )
    .bind(&artifact.name)
    .fetch_one(&mut *conn)
    .await?;

    let stored = artifact_from_row(&row)?;
    if stored.format != artifact.format {
        return Err(RegistryError::FormatMismatch {
            name: artifact.name.clone(),
            existing: stored.format.to_string(),
            requested: artifact.format.to_string(),
        });
    }

    artifact.id = stored.id;
    artifact.description = stored.description;
    artifact.created_at = stored.created_at;
    artifact.updated_at = stored.updated_at;

    stored
        .id
        .ok_or_else(|| RegistryError::ArtifactNotFound(artifact.name.clone()))
}

async fn insert_version(
    conn: &mut SqliteConnection,
    artifact_id: Uuid,
    name: &str,
    version: &mut ArtifactVersion,
) -> Result<()> {
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO artifact_versions (id, artifact_id, version, uri, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
    "#,
    )
    .bind(id.to_string())
    .bind(artifact_id.to_string())
    .bind(&version.version)
    .bind(&version.uri)
    .bind(format_timestamp(version.created_at)?)
    .bind(format_timestamp(version.updated_at)?)
    .execute(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            RegistryError::AlreadyPublished {
                name: name.to_string(),
                version: version.version.clone(),
            }
        }
        other => RegistryError::Database(other),
    })?;

    version.id = Some(id);
    Ok(())
}

async fn touch_artifact(conn: &mut SqliteConnection, artifact: &mut Artifact) -> Result<()> {
    let now = OffsetDateTime::now_utc();
    let id = artifact
        .id
        .ok_or_else(|| RegistryError::ArtifactNotFound(artifact.name.clone()))?;

    sqlx::query("UPDATE artifacts SET updated_at = ? WHERE id = ?")
        .bind(format_timestamp(now)?)
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;

    artifact.updated_at = now;
    Ok(())
}

fn artifact_from_row(row: &SqliteRow) -> Result<Artifact> {
    let format: String = row.try_get("format")?;

    Ok(Artifact {
        id: Some(parse_id(&row.try_get::<String, _>("id")?)?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        format: PackageFormat::from_str(&format)?,
        versions: Vec::new(),
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn version_from_row(row: &SqliteRow) -> Result<ArtifactVersion> {
    Ok(ArtifactVersion {
        id: Some(parse_id(&row.try_get::<String, _>("id")?)?),
        version: row.try_get("version")?,
        uri: row.try_get("uri")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn parse_id(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| RegistryError::Invalid(format!("stored id {value}: {e}")))
}

fn format_timestamp(ts: OffsetDateTime) -> Result<String> {
    ts.format(&Rfc3339)
        .map_err(|e| RegistryError::Time(format!("Failed to format timestamp: {}", e)))
}

fn parse_timestamp(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|e| RegistryError::Time(format!("Failed to parse timestamp: {}", e)))
}
