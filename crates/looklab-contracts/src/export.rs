use std::path::{Path, PathBuf};

use chrono::{NaiveDate, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::batch::{Batch, BatchItem};
use crate::error::LookError;
use crate::events::sanitize_payload;
use crate::images::ImageHandle;
use crate::versions::VersionHistory;

pub const EXPORT_SCHEMA_VERSION: u64 = 1;
pub const MASTER_REFERENCE_FILENAME: &str = "Master_Reference.jpg";
pub const MANIFEST_FILENAME: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq)]
pub struct ExportEntry {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Raw bytes plus suggested names; packaging into an archive is up to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportBundle {
    pub folder: String,
    pub entries: Vec<ExportEntry>,
    pub manifest: Value,
}

/// Project name with every whitespace run collapsed to `_`.
pub fn folder_name(project_name: &str) -> String {
    let folder = project_name.split_whitespace().collect::<Vec<_>>().join("_");
    if folder.is_empty() {
        "LookLab_Export".to_string()
    } else {
        folder
    }
}

pub fn master_filename(date: NaiveDate) -> String {
    format!("LookLab_Master_{}.jpg", date.format("%Y-%m-%d"))
}

pub fn processed_filename(item_id: &str) -> String {
    format!("looklab-{item_id}-processed.png")
}

pub fn batch_entry_filename(position: usize) -> String {
    format!("Batch_{position}_Look.png")
}

pub fn build_export_bundle(
    project_name: &str,
    reference: Option<&ImageHandle>,
    batch: &Batch,
    history: &VersionHistory,
) -> Result<ExportBundle, LookError> {
    if batch.is_empty() {
        return Err(LookError::NotReady("batch is empty".to_string()));
    }

    let mut entries = Vec::new();
    if let Some(reference) = reference {
        entries.push(ExportEntry {
            filename: MASTER_REFERENCE_FILENAME.to_string(),
            mime: reference.mime().to_string(),
            bytes: reference.read_bytes()?,
        });
    }

    let mut items = Vec::new();
    for (idx, (item, processed)) in batch.processed().enumerate() {
        let filename = batch_entry_filename(idx + 1);
        items.push(json!({
            "item_id": item.id(),
            "filename": filename,
            "quality_score": item.quality_score(),
        }));
        entries.push(ExportEntry {
            filename,
            mime: processed.mime().to_string(),
            bytes: processed.read_bytes()?,
        });
    }
    if items.is_empty() {
        return Err(LookError::NotReady(
            "no processed batch items to export".to_string(),
        ));
    }

    let versions = serde_json::to_value(history.records())
        .map_err(|err| LookError::Io(format!("failed encoding versions: {err}")))?;
    let manifest = sanitize_payload(&json!({
        "schema_version": EXPORT_SCHEMA_VERSION,
        "project": project_name,
        "exported_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        "reference": reference.map(|_| MASTER_REFERENCE_FILENAME),
        "items": items,
        "versions": versions,
    }));

    Ok(ExportBundle {
        folder: folder_name(project_name),
        entries,
        manifest,
    })
}

/// The reference image under its dated single-file name.
pub fn master_entry(
    reference: Option<&ImageHandle>,
    date: NaiveDate,
) -> Result<ExportEntry, LookError> {
    let Some(reference) = reference else {
        return Err(LookError::NotReady("no reference image to save".to_string()));
    };
    Ok(ExportEntry {
        filename: master_filename(date),
        mime: reference.mime().to_string(),
        bytes: reference.read_bytes()?,
    })
}

pub fn processed_entry(item: &BatchItem) -> Result<ExportEntry, LookError> {
    let Some(processed) = item.processed() else {
        return Err(LookError::NotReady(format!(
            "batch item {} has no processed image",
            item.id()
        )));
    };
    Ok(ExportEntry {
        filename: processed_filename(item.id()),
        mime: processed.mime().to_string(),
        bytes: processed.read_bytes()?,
    })
}

/// Writes `<dir>/<folder>/` with every entry plus `manifest.json`.
pub fn write_bundle(dir: &Path, bundle: &ExportBundle) -> anyhow::Result<PathBuf> {
    let root = dir.join(&bundle.folder);
    std::fs::create_dir_all(&root)?;
    for entry in &bundle.entries {
        std::fs::write(root.join(&entry.filename), &entry.bytes)?;
    }
    std::fs::write(
        root.join(MANIFEST_FILENAME),
        serde_json::to_string_pretty(&bundle.manifest)?,
    )?;
    Ok(root)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    use super::{
        build_export_bundle, folder_name, master_entry, master_filename, processed_entry,
        processed_filename, write_bundle,
    };
    use crate::batch::{Batch, BatchItem, QUALITY_SCORE};
    use crate::error::ErrorKind;
    use crate::grading::{GradingParams, LookMetrics};
    use crate::images::data_url;
    use crate::versions::VersionHistory;

    fn done_item(id: &str, processed: &[u8]) -> BatchItem {
        let mut item = BatchItem::with_id(id, data_url::encode(b"original", "image/png"));
        item.begin_processing().unwrap();
        item.complete(data_url::encode(processed, "image/jpeg"), QUALITY_SCORE)
            .unwrap();
        item
    }

    #[test]
    fn names_follow_export_conventions() {
        assert_eq!(folder_name("Campagna  SS25\tfinal"), "Campagna_SS25_final");
        assert_eq!(folder_name("   "), "LookLab_Export");
        let date = NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();
        assert_eq!(master_filename(date), "LookLab_Master_2024-09-01.jpg");
        assert_eq!(processed_filename("b-7"), "looklab-b-7-processed.png");
    }

    #[test]
    fn nothing_processed_is_not_ready() {
        let history = VersionHistory::new();
        let empty = Batch::new();
        let err = build_export_bundle("P", None, &empty, &history).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReady);

        let mut pending = Batch::new();
        pending.push(BatchItem::with_id("b-1", data_url::encode(b"o", "image/png")));
        let err = build_export_bundle("P", None, &pending, &history).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReady);
    }

    #[test]
    fn bundle_numbers_processed_items_and_omits_images() -> anyhow::Result<()> {
        let mut batch = Batch::new();
        batch.push(BatchItem::with_id("b-0", data_url::encode(b"o", "image/png")));
        batch.push(done_item("b-1", b"first"));
        batch.push(done_item("b-2", b"second"));
        let mut history = VersionHistory::new();
        history.commit(
            GradingParams::default(),
            LookMetrics::NEUTRAL,
            data_url::encode(b"first", "image/jpeg"),
        );
        let reference = data_url::encode(b"reference", "image/jpeg");

        let bundle = build_export_bundle("Urban Run", Some(&reference), &batch, &history)?;
        let names: Vec<&str> = bundle.entries.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(
            names,
            ["Master_Reference.jpg", "Batch_1_Look.png", "Batch_2_Look.png"]
        );
        assert_eq!(bundle.entries[2].bytes, b"second");
        assert_eq!(bundle.manifest["items"][0]["item_id"], json!("b-1"));
        assert_eq!(bundle.manifest["versions"][0]["id"], json!("v1"));
        assert!(!bundle.manifest.to_string().contains("base64"));

        let temp = tempfile::tempdir()?;
        let root = write_bundle(temp.path(), &bundle)?;
        assert!(root.ends_with("Urban_Run"));
        assert_eq!(std::fs::read(root.join("Master_Reference.jpg"))?, b"reference");
        let manifest: Value =
            serde_json::from_str(&std::fs::read_to_string(root.join("manifest.json"))?)?;
        assert_eq!(manifest["project"], json!("Urban Run"));
        Ok(())
    }

    #[test]
    fn single_file_entries_need_content() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        assert_eq!(
            master_entry(None, date).unwrap_err().kind(),
            ErrorKind::NotReady
        );
        let reference = data_url::encode(b"reference", "image/jpeg");
        let master = master_entry(Some(&reference), date).unwrap();
        assert_eq!(master.filename, "LookLab_Master_2025-01-02.jpg");
        assert_eq!(master.bytes, b"reference");

        let pending = BatchItem::with_id("b-3", data_url::encode(b"o", "image/png"));
        assert_eq!(
            processed_entry(&pending).unwrap_err().kind(),
            ErrorKind::NotReady
        );
        let entry = processed_entry(&done_item("b-4", b"look")).unwrap();
        assert_eq!(entry.filename, "looklab-b-4-processed.png");
        assert_eq!(entry.mime, "image/jpeg");
    }
}
