use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LookError;
use crate::grading::{GradingParams, LookMetrics};
use crate::images::ImageHandle;

/// Immutable snapshot of one successful transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct Version {
    pub id: String,
    pub seq: u64,
    pub name: String,
    pub params: GradingParams,
    pub metrics: LookMetrics,
    pub preview: ImageHandle,
    pub is_favorite: bool,
    pub created_at: String,
}

impl Version {
    /// Serializable view without the preview payload.
    pub fn record(&self) -> VersionRecord {
        VersionRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            params: self.params,
            metrics: self.metrics,
            preview_mime: self.preview.mime().to_string(),
            is_favorite: self.is_favorite,
            created_at: self.created_at.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: String,
    pub name: String,
    pub params: GradingParams,
    pub metrics: LookMetrics,
    pub preview_mime: String,
    pub is_favorite: bool,
    pub created_at: String,
}

/// What a restore pushes back into the live session.
#[derive(Debug, Clone, PartialEq)]
pub struct Restoration {
    pub params: GradingParams,
    pub metrics: LookMetrics,
    pub preview: ImageHandle,
}

/// Append-only history, newest first. Ids are never reused within a session.
#[derive(Debug, Clone, Default)]
pub struct VersionHistory {
    versions: Vec<Version>,
    next_seq: u64,
}

impl VersionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit(
        &mut self,
        params: GradingParams,
        metrics: LookMetrics,
        preview: ImageHandle,
    ) -> Version {
        self.next_seq += 1;
        let seq = self.next_seq;
        let version = Version {
            id: format!("v{seq}"),
            seq,
            name: format!("Look {} {seq}", params.preset),
            params,
            metrics,
            preview,
            is_favorite: false,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        self.versions.insert(0, version.clone());
        version
    }

    pub fn list(&self) -> &[Version] {
        &self.versions
    }

    pub fn get(&self, id: &str) -> Result<&Version, LookError> {
        self.versions
            .iter()
            .find(|version| version.id == id)
            .ok_or_else(|| LookError::UnknownVersion(id.to_string()))
    }

    pub fn latest(&self) -> Option<&Version> {
        self.versions.first()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn records(&self) -> Vec<VersionRecord> {
        self.versions.iter().map(Version::record).collect()
    }

    /// Drops every version; only a project switch or reset does this.
    pub fn clear(&mut self) {
        self.versions.clear();
        self.next_seq = 0;
    }
}

pub fn restore(version: &Version) -> Restoration {
    Restoration {
        params: version.params,
        metrics: version.metrics,
        preview: version.preview.clone(),
    }
}
