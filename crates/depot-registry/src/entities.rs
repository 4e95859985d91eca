//! Core entities for the depot registry

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{RegistryError, Result};

pub(crate) const MAX_NAME_LEN: usize = 300;
pub(crate) const MAX_VERSION_LEN: usize = 50;
const MAX_URI_LEN: usize = 1000;

/// Distributable package format an artifact is published in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageFormat {
    /// Go module zip
    #[serde(rename = "gomod")]
    GoModule,
    /// Gzip-compressed tarball
    #[serde(rename = "tgz")]
    Tarball,
}

impl PackageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageFormat::GoModule => "gomod",
            PackageFormat::Tarball => "tgz",
        }
    }

    /// File extension of the packaged archive
    pub fn extension(&self) -> &'static str {
        match self {
            PackageFormat::GoModule => "zip",
            PackageFormat::Tarball => "tar.gz",
        }
    }
}

impl fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageFormat {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gomod" => Ok(PackageFormat::GoModule),
            "tgz" => Ok(PackageFormat::Tarball),
            other => Err(RegistryError::UnknownPackager(other.to_string())),
        }
    }
}

/// Version control system a source archive is fetched from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsKind {
    /// A directory on the local filesystem
    Local,
    GitHub,
    GitLab,
}

impl VcsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VcsKind::Local => "local",
            VcsKind::GitHub => "github",
            VcsKind::GitLab => "gitlab",
        }
    }
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VcsKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(VcsKind::Local),
            "github" => Ok(VcsKind::GitHub),
            "gitlab" => Ok(VcsKind::GitLab),
            other => Err(RegistryError::UnknownFetcher(other.to_string())),
        }
    }
}

/// Kind of store a packaged artifact is uploaded to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageKind {
    #[serde(rename = "fs")]
    FileSystem,
    #[serde(rename = "mem")]
    Memory,
    #[serde(rename = "s3")]
    S3,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::FileSystem => "fs",
            StorageKind::Memory => "mem",
            StorageKind::S3 => "s3",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fs" => Ok(StorageKind::FileSystem),
            "mem" => Ok(StorageKind::Memory),
            "s3" => Ok(StorageKind::S3),
            other => Err(RegistryError::UnknownUploader(other.to_string())),
        }
    }
}

/// A named publishable unit, e.g. one library
///
/// `id` stays `None` until the artifact has been persisted. Versions listed
/// on an unpersisted artifact are the ones waiting to be created with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Option<Uuid>,

    /// Unique across the registry
    pub name: String,

    pub description: String,

    pub format: PackageFormat,

    pub versions: Vec<ArtifactVersion>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Artifact {
    pub fn new(name: impl Into<String>, description: impl Into<String>, format: PackageFormat) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: None,
            name: name.into(),
            description: description.into(),
            format,
            versions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a pending version
    pub fn with_version(mut self, version: ArtifactVersion) -> Self {
        self.versions.push(version);
        self
    }

    /// Look up one of this artifact's versions
    pub fn version(&self, version: &str) -> Option<&ArtifactVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    /// Check length limits on the artifact and every pending version
    pub fn validate(&self) -> Result<()> {
        check_len("artifact name", &self.name, MAX_NAME_LEN)?;
        for version in &self.versions {
            version.validate()?;
        }
        Ok(())
    }
}

/// One published revision of an artifact, pointing at its stored archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactVersion {
    pub id: Option<Uuid>,

    pub version: String,

    /// Where the packaged archive lives
    pub uri: String,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ArtifactVersion {
    pub fn new(version: impl Into<String>, uri: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: None,
            version: version.into(),
            uri: uri.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_len("version", &self.version, MAX_VERSION_LEN)?;
        check_len("uri", &self.uri, MAX_URI_LEN)
    }
}

pub(crate) fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    if value.is_empty() {
        return Err(RegistryError::Invalid(format!("{field} must not be empty")));
    }
    if value.chars().count() > max {
        return Err(RegistryError::Invalid(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}
