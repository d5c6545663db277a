//! Live editing state for one project and the orchestration around it.
//!
//! A generation is split in three so the slow part never borrows the session:
//! [`LookSession::begin_generation`] snapshots inputs into a
//! [`GenerationTicket`], [`LookPipeline::run`] renders it, and
//! [`LookSession::finish_generation`] applies the outcome. A ticket issued
//! before a reset carries a stale epoch and its result is discarded.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use looklab_contracts::batch::{Batch, BatchItem, TargetPolicy, QUALITY_SCORE};
use looklab_contracts::events::{EventPayload, EventWriter};
use looklab_contracts::export::{
    build_export_bundle, master_entry, processed_entry, write_bundle, ExportBundle, ExportEntry,
};
use looklab_contracts::grading::{GradingParams, LookMetrics, Preset};
use looklab_contracts::images::ImageHandle;
use looklab_contracts::versions::{restore, Restoration, Version, VersionHistory};
use looklab_contracts::{ErrorKind, LookError};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::pipeline::{LookPipeline, Rendered};

/// Inputs of one generation, frozen when it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTicket {
    session_epoch: u64,
    pub item_id: String,
    pub item_index: usize,
    pub reference: ImageHandle,
    pub target: ImageHandle,
    pub params: GradingParams,
    pub metrics: LookMetrics,
}

impl GenerationTicket {
    pub fn session_epoch(&self) -> u64 {
        self.session_epoch
    }

    #[cfg(test)]
    pub(crate) fn detached(
        item_id: &str,
        reference: ImageHandle,
        target: ImageHandle,
        params: GradingParams,
        metrics: LookMetrics,
    ) -> Self {
        Self {
            session_epoch: 0,
            item_id: item_id.to_string(),
            item_index: 0,
            reference,
            target,
            params,
            metrics,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Committed(Version),
    /// The session was reset while the ticket was in flight.
    Discarded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceOutcome {
    pub metrics: LookMetrics,
    /// Set when analysis failed softly and neutral metrics were used.
    pub degraded: Option<LookError>,
}

#[derive(Debug, Default)]
pub struct LookSession {
    reference: Option<ImageHandle>,
    params: GradingParams,
    metrics: LookMetrics,
    batch: Batch,
    history: VersionHistory,
    policy: TargetPolicy,
    busy: bool,
    epoch: u64,
    events: Option<EventWriter>,
}

impl LookSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: EventWriter) -> Self {
        let session = Self {
            events: Some(events),
            ..Self::default()
        };
        session.emit("session_started", json!({ "policy": "first_item" }));
        session
    }

    pub fn reference(&self) -> Option<&ImageHandle> {
        self.reference.as_ref()
    }

    pub fn params(&self) -> GradingParams {
        self.params
    }

    pub fn metrics(&self) -> LookMetrics {
        self.metrics
    }

    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    pub fn history(&self) -> &VersionHistory {
        &self.history
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn events(&self) -> Option<&EventWriter> {
        self.events.as_ref()
    }

    /// Keeps appending to the same log under a new session id.
    pub fn rekey_events(&mut self, session_id: &str) {
        self.events = self.events.as_ref().map(|events| events.rekey(session_id));
    }

    /// Back to a blank session. Any in-flight ticket becomes stale.
    pub fn reset(&mut self) {
        self.reference = None;
        self.params = GradingParams::default();
        self.metrics = LookMetrics::default();
        self.batch.clear();
        self.history.clear();
        self.busy = false;
        self.epoch += 1;
    }

    pub fn set_preset(&mut self, preset: Preset) {
        self.params.preset = preset;
    }

    pub fn set_intensity(&mut self, value: i64) -> Result<(), LookError> {
        self.params.set_intensity(value)
    }

    pub fn set_shadows(&mut self, value: i64) -> Result<(), LookError> {
        self.params.set_shadows(value)
    }

    pub fn set_highlights(&mut self, value: i64) -> Result<(), LookError> {
        self.params.set_highlights(value)
    }

    /// Installs a reference and analyzes it. The image is embedded first, so
    /// later edits to a source file never reach the session.
    ///
    /// Credential, quota and input failures propagate and leave the session
    /// untouched. A malformed or failed analysis degrades to neutral metrics.
    pub async fn load_reference(
        &mut self,
        pipeline: &LookPipeline,
        reference: ImageHandle,
    ) -> Result<ReferenceOutcome, LookError> {
        let reference = reference.materialize()?;
        self.emit("reference_loaded", json!({ "mime": reference.mime() }));
        let outcome = match pipeline.analyze(&reference).await {
            Ok(metrics) => {
                self.emit("reference_analyzed", json!({ "metrics": metrics }));
                ReferenceOutcome {
                    metrics,
                    degraded: None,
                }
            }
            Err(err) if degrades_silently(&err) => {
                warn!(error = %err, "analysis degraded to neutral metrics");
                self.emit(
                    "metrics_degraded",
                    json!({ "kind": err.kind().as_str(), "error": err.to_string() }),
                );
                ReferenceOutcome {
                    metrics: LookMetrics::NEUTRAL,
                    degraded: Some(err),
                }
            }
            Err(err) => return Err(err),
        };
        self.reference = Some(reference);
        self.metrics = outcome.metrics;
        Ok(outcome)
    }

    /// Embeds and appends images as pending items. Nothing is added when any
    /// of them cannot be read.
    pub fn upload_batch(
        &mut self,
        originals: impl IntoIterator<Item = ImageHandle>,
    ) -> Result<Vec<String>, LookError> {
        let embedded = originals
            .into_iter()
            .map(|original| original.materialize())
            .collect::<Result<Vec<_>, _>>()?;
        let ids = self.batch.upload(embedded);
        info!(count = ids.len(), total = self.batch.len(), "batch uploaded");
        self.emit(
            "batch_uploaded",
            json!({ "item_ids": ids, "total": self.batch.len() }),
        );
        Ok(ids)
    }

    /// Moves the target item to `processing` and hands out its ticket.
    pub fn begin_generation(&mut self) -> Result<GenerationTicket, LookError> {
        if self.busy {
            return Err(LookError::GenerationInFlight);
        }
        let Some(reference) = self.reference.clone() else {
            return Err(LookError::NotReady("no reference image loaded".to_string()));
        };
        let Some(index) = self.policy.select(&self.batch) else {
            return Err(LookError::NotReady("batch is empty".to_string()));
        };
        self.batch.update(index, BatchItem::begin_processing)?;
        let Some(item) = self.batch.get(index) else {
            return Err(LookError::NotReady("batch is empty".to_string()));
        };

        let ticket = GenerationTicket {
            session_epoch: self.epoch,
            item_id: item.id().to_string(),
            item_index: index,
            reference,
            target: item.original().clone(),
            params: self.params,
            metrics: self.metrics,
        };
        self.busy = true;
        self.emit(
            "generation_started",
            json!({
                "item_id": ticket.item_id,
                "preset": ticket.params.preset.as_str(),
                "intensity": ticket.params.intensity,
            }),
        );
        Ok(ticket)
    }

    /// Applies a render result. Failures mark the item failed and are
    /// returned unchanged; no version is committed for them.
    pub fn finish_generation(
        &mut self,
        ticket: GenerationTicket,
        result: Result<Rendered, LookError>,
    ) -> Result<GenerationOutcome, LookError> {
        if ticket.session_epoch != self.epoch {
            info!(item_id = %ticket.item_id, "discarding result from a previous session");
            self.emit(
                "generation_discarded",
                json!({ "item_id": ticket.item_id, "epoch": ticket.session_epoch }),
            );
            return Ok(GenerationOutcome::Discarded);
        }
        self.busy = false;
        let index = self
            .batch
            .position(&ticket.item_id)
            .unwrap_or(ticket.item_index);

        match result {
            Ok(rendered) => {
                let composite = rendered.composite;
                self.batch.update(index, |item| {
                    item.complete(composite.clone(), QUALITY_SCORE)
                })?;
                let version = self
                    .history
                    .commit(ticket.params, ticket.metrics, composite);
                info!(version = %version.id, item_id = %ticket.item_id, "version created");
                self.emit(
                    "version_created",
                    json!({
                        "version_id": version.id,
                        "name": version.name,
                        "item_id": ticket.item_id,
                        "params": version.params,
                        "metrics": version.metrics,
                        "reused_stylized": rendered.reused_stylized,
                    }),
                );
                Ok(GenerationOutcome::Committed(version))
            }
            Err(err) => {
                self.batch.update(index, BatchItem::fail)?;
                warn!(item_id = %ticket.item_id, error = %err, "generation failed");
                self.emit(
                    "generation_failed",
                    json!({
                        "item_id": ticket.item_id,
                        "kind": err.kind().as_str(),
                        "error": err.to_string(),
                    }),
                );
                Err(err)
            }
        }
    }

    pub async fn generate(
        &mut self,
        pipeline: &LookPipeline,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, LookError> {
        let ticket = self.begin_generation()?;
        let result = pipeline.run(&ticket, cancel).await;
        self.finish_generation(ticket, result)
    }

    /// Pushes a version's params and metrics back into the live session and
    /// re-attaches its preview to the target item.
    pub fn restore(&mut self, version_id: &str) -> Result<Restoration, LookError> {
        if self.busy {
            return Err(LookError::GenerationInFlight);
        }
        let restoration = restore(self.history.get(version_id)?);
        self.params = restoration.params;
        self.metrics = restoration.metrics;
        if let Some(index) = self.policy.select(&self.batch) {
            let preview = restoration.preview.clone();
            self.batch
                .update(index, |item| item.attach_preview(preview))?;
        }
        self.emit(
            "version_restored",
            json!({ "version_id": version_id, "params": restoration.params }),
        );
        Ok(restoration)
    }

    pub fn export(&self, project_name: &str) -> Result<ExportBundle, LookError> {
        build_export_bundle(
            project_name,
            self.reference.as_ref(),
            &self.batch,
            &self.history,
        )
    }

    pub fn write_export(&self, dir: &Path, project_name: &str) -> anyhow::Result<PathBuf> {
        let bundle = self.export(project_name)?;
        let root = write_bundle(dir, &bundle)?;
        info!(path = %root.display(), entries = bundle.entries.len(), "export written");
        self.emit(
            "export_written",
            json!({
                "path": root.display().to_string(),
                "files": bundle
                    .entries
                    .iter()
                    .map(|entry| entry.filename.as_str())
                    .collect::<Vec<_>>(),
            }),
        );
        Ok(root)
    }

    /// Saves the reference alone as `LookLab_Master_<date>.jpg`.
    pub fn write_master(&self, dir: &Path, date: NaiveDate) -> anyhow::Result<PathBuf> {
        let entry = master_entry(self.reference.as_ref(), date)?;
        self.write_single(dir, &entry)
    }

    /// Saves one processed item; defaults to the generation target.
    pub fn write_processed(
        &self,
        dir: &Path,
        item_id: Option<&str>,
    ) -> anyhow::Result<PathBuf> {
        let index = match item_id {
            Some(id) => self.batch.position(id).ok_or_else(|| {
                LookError::InvalidInput(format!("unknown batch item '{id}'"))
            })?,
            None => self
                .policy
                .select(&self.batch)
                .ok_or_else(|| LookError::NotReady("batch is empty".to_string()))?,
        };
        let Some(item) = self.batch.get(index) else {
            return Err(LookError::NotReady("batch is empty".to_string()).into());
        };
        let entry = processed_entry(item)?;
        self.write_single(dir, &entry)
    }

    fn write_single(&self, dir: &Path, entry: &ExportEntry) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&entry.filename);
        std::fs::write(&path, &entry.bytes)?;
        info!(path = %path.display(), "file saved");
        self.emit(
            "export_written",
            json!({ "path": path.display().to_string(), "files": [entry.filename] }),
        );
        Ok(path)
    }

    pub(crate) fn emit(&self, event_type: &str, payload: Value) {
        let Some(events) = &self.events else {
            return;
        };
        let payload = match payload {
            Value::Object(map) => map,
            _ => EventPayload::new(),
        };
        if let Err(err) = events.emit(event_type, payload) {
            warn!(event_type, error = %err, "failed writing session event");
        }
    }
}

fn degrades_silently(err: &LookError) -> bool {
    matches!(
        err.kind(),
        ErrorKind::AnalysisMalformed | ErrorKind::AnalysisFailed
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use looklab_contracts::batch::{BatchStatus, QUALITY_SCORE};
    use looklab_contracts::events::EventWriter;
    use looklab_contracts::grading::{LookMetrics, Preset};
    use looklab_contracts::images::{data_url, ImageHandle};
    use looklab_contracts::ErrorKind;
    use serde_json::Value;
    use tokio::sync::Notify;
    use tokio_util::sync::CancellationToken;

    use super::{GenerationOutcome, LookSession};
    use crate::oracle::{LookReply, OracleFailure};
    use crate::pipeline::{LookPipeline, PipelineOptions};
    use crate::test_support::{image_reply, metrics_reply, png_bytes, solid_png, StubOracle};

    const METRICS: &str =
        r#"{"contrast":70,"saturation":60,"warmth":40,"uniformity":80,"exposure":55}"#;

    fn pipeline(oracle: Arc<StubOracle>) -> LookPipeline {
        LookPipeline::new(
            oracle.clone(),
            oracle,
            "stub-analysis",
            "stub-look",
            PipelineOptions::default(),
        )
    }

    fn read_events(path: &std::path::Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn reference_to_version_end_to_end() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let original = solid_png(8, 6, [20, 30, 40]);
        let stylized = solid_png(8, 6, [220, 180, 90]);
        let oracle = Arc::new(StubOracle::new(
            metrics_reply(METRICS),
            image_reply(&stylized),
        ));
        let pipeline = pipeline(oracle);
        let mut session = LookSession::with_events(EventWriter::new(&events_path, "s-1"));

        let outcome = session
            .load_reference(&pipeline, solid_png(4, 4, [1, 2, 3]))
            .await?;
        assert!(outcome.degraded.is_none());
        let expected = LookMetrics {
            contrast: 70,
            saturation: 60,
            warmth: 40,
            uniformity: 80,
            exposure: 55,
        };
        assert_eq!(session.metrics(), expected);

        let ids = session.upload_batch([original.clone()])?;
        assert_eq!(session.batch().get(0).unwrap().status(), BatchStatus::Pending);

        session.set_preset(Preset::Dark);
        session.set_intensity(50)?;
        let GenerationOutcome::Committed(version) = session
            .generate(&pipeline, &CancellationToken::new())
            .await?
        else {
            panic!("generation was discarded");
        };

        let item = session.batch().get(0).unwrap();
        assert_eq!(item.id(), ids[0]);
        assert_eq!(item.status(), BatchStatus::Done);
        assert_eq!(item.quality_score(), Some(QUALITY_SCORE));
        let composite = item.processed().unwrap().clone();
        assert_ne!(composite, original);
        assert_ne!(composite.read_bytes()?, stylized.read_bytes()?);

        assert_eq!(session.history().list(), &[version.clone()]);
        assert_eq!(version.params.preset, Preset::Dark);
        assert_eq!(version.params.intensity, 50);
        assert_eq!(version.metrics, expected);
        assert_eq!(version.preview, composite);
        assert!(!session.is_busy());

        let events = read_events(&events_path);
        let types: Vec<&str> = events
            .iter()
            .filter_map(|event| event["type"].as_str())
            .collect();
        assert_eq!(
            types,
            [
                "session_started",
                "reference_loaded",
                "reference_analyzed",
                "batch_uploaded",
                "generation_started",
                "version_created",
            ]
        );
        assert!(!std::fs::read_to_string(&events_path)?.contains("base64"));
        Ok(())
    }

    #[tokio::test]
    async fn failed_generation_marks_item_and_commits_nothing() -> anyhow::Result<()> {
        let oracle = Arc::new(StubOracle::new(
            metrics_reply(METRICS),
            Ok(LookReply::default()),
        ));
        let pipeline = pipeline(oracle);
        let mut session = LookSession::new();
        session
            .load_reference(&pipeline, solid_png(2, 2, [0, 0, 0]))
            .await?;
        session.upload_batch([solid_png(2, 2, [9, 9, 9])])?;

        let err = session
            .generate(&pipeline, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SafetyBlocked);
        let item = session.batch().get(0).unwrap();
        assert_eq!(item.status(), BatchStatus::Failed);
        assert!(item.processed().is_none());
        assert!(session.history().is_empty());
        assert!(!session.is_busy());
        Ok(())
    }

    #[tokio::test]
    async fn undecodable_look_leaves_history_and_other_items_alone() -> anyhow::Result<()> {
        let good = pipeline(Arc::new(StubOracle::new(
            metrics_reply(METRICS),
            image_reply(&solid_png(2, 2, [200, 0, 0])),
        )));
        let broken = pipeline(Arc::new(StubOracle::new(
            metrics_reply(METRICS),
            image_reply(&data_url::encode(b"not a png", "image/png")),
        )));
        let cancel = CancellationToken::new();
        let mut session = LookSession::new();
        session
            .load_reference(&good, solid_png(2, 2, [0, 0, 0]))
            .await?;
        session.upload_batch([solid_png(2, 2, [9, 9, 9]), solid_png(2, 2, [7, 7, 7])])?;
        session.set_intensity(50)?;
        session.generate(&good, &cancel).await?;
        let committed = session.history().list().to_vec();

        let err = session.generate(&broken, &cancel).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeFailed);
        assert_eq!(session.history().list(), committed.as_slice());
        assert_eq!(session.history().list()[0].id, "v1");
        assert_eq!(session.batch().get(0).unwrap().status(), BatchStatus::Failed);
        assert_eq!(session.batch().get(1).unwrap().status(), BatchStatus::Pending);
        assert!(!session.is_busy());
        Ok(())
    }

    #[tokio::test]
    async fn file_backed_images_are_snapshotted_on_intake() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let target_path = temp.path().join("target.png");
        let reference_path = temp.path().join("reference.png");
        std::fs::write(&target_path, png_bytes(3, 3, [10, 20, 30]))?;
        std::fs::write(&reference_path, png_bytes(3, 3, [1, 2, 3]))?;
        let pipeline = pipeline(Arc::new(StubOracle::new(
            metrics_reply(METRICS),
            image_reply(&solid_png(3, 3, [200, 0, 0])),
        )));
        let mut session = LookSession::new();
        session
            .load_reference(&pipeline, ImageHandle::referenced(&reference_path))
            .await?;
        session.upload_batch([ImageHandle::referenced(&target_path)])?;
        session.set_intensity(0)?;
        let GenerationOutcome::Committed(version) = session
            .generate(&pipeline, &CancellationToken::new())
            .await?
        else {
            panic!("generation was discarded");
        };
        let before = version.preview.read_bytes()?;
        assert!(version.preview.is_embedded());

        std::fs::write(&target_path, png_bytes(3, 3, [250, 250, 250]))?;
        std::fs::remove_file(&reference_path)?;
        assert_eq!(session.history().list()[0].preview.read_bytes()?, before);
        assert_eq!(
            session.batch().get(0).unwrap().processed().unwrap().read_bytes()?,
            before
        );
        session.export("Snapshot")?;
        Ok(())
    }

    #[tokio::test]
    async fn malformed_analysis_degrades_but_credential_errors_propagate() -> anyhow::Result<()> {
        let soft = pipeline(Arc::new(StubOracle::new(
            metrics_reply("not json"),
            Ok(LookReply::default()),
        )));
        let mut session = LookSession::new();
        let outcome = session
            .load_reference(&soft, solid_png(2, 2, [0, 0, 0]))
            .await?;
        assert_eq!(outcome.metrics, LookMetrics::NEUTRAL);
        assert_eq!(
            outcome.degraded.map(|err| err.kind()),
            Some(ErrorKind::AnalysisMalformed)
        );
        assert!(session.reference().is_some());

        let hard = pipeline(Arc::new(StubOracle::new(
            Err(OracleFailure::MissingCredential),
            Ok(LookReply::default()),
        )));
        let mut fresh = LookSession::new();
        let err = fresh
            .load_reference(&hard, solid_png(2, 2, [0, 0, 0]))
            .await
            .unwrap_err();
        assert!(err.needs_credential_selection());
        assert!(fresh.reference().is_none());
        assert_eq!(fresh.metrics(), LookMetrics::default());
        Ok(())
    }

    #[tokio::test]
    async fn second_generation_is_rejected_while_busy() -> anyhow::Result<()> {
        let gate = Arc::new(Notify::new());
        let oracle = Arc::new(
            StubOracle::new(
                metrics_reply(METRICS),
                image_reply(&solid_png(2, 2, [200, 0, 0])),
            )
            .with_gate(gate.clone()),
        );
        let pipeline = pipeline(oracle);
        let mut session = LookSession::new();
        session
            .load_reference(&pipeline, solid_png(2, 2, [0, 0, 0]))
            .await?;
        session.upload_batch([solid_png(2, 2, [9, 9, 9])])?;

        let ticket = session.begin_generation()?;
        assert_eq!(
            session.begin_generation().unwrap_err().kind(),
            ErrorKind::GenerationInFlight
        );
        assert_eq!(
            session.batch().get(0).unwrap().status(),
            BatchStatus::Processing
        );

        gate.notify_one();
        let result = pipeline.run(&ticket, &CancellationToken::new()).await;
        let outcome = session.finish_generation(ticket, result)?;
        assert!(matches!(outcome, GenerationOutcome::Committed(_)));
        assert!(!session.is_busy());
        Ok(())
    }

    #[tokio::test]
    async fn result_after_reset_is_discarded() -> anyhow::Result<()> {
        let oracle = Arc::new(StubOracle::new(
            metrics_reply(METRICS),
            image_reply(&solid_png(2, 2, [200, 0, 0])),
        ));
        let pipeline = pipeline(oracle);
        let mut session = LookSession::new();
        session
            .load_reference(&pipeline, solid_png(2, 2, [0, 0, 0]))
            .await?;
        session.upload_batch([solid_png(2, 2, [9, 9, 9])])?;

        let ticket = session.begin_generation()?;
        session.reset();
        let result = pipeline.run(&ticket, &CancellationToken::new()).await;
        let outcome = session.finish_generation(ticket, result)?;
        assert_eq!(outcome, GenerationOutcome::Discarded);
        assert!(session.batch().is_empty());
        assert!(session.history().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn restore_reapplies_params_and_preview() -> anyhow::Result<()> {
        let oracle = Arc::new(StubOracle::new(
            metrics_reply(METRICS),
            image_reply(&solid_png(2, 2, [200, 0, 0])),
        ));
        let pipeline = pipeline(oracle);
        let cancel = CancellationToken::new();
        let mut session = LookSession::new();
        session
            .load_reference(&pipeline, solid_png(2, 2, [0, 0, 0]))
            .await?;
        session.upload_batch([solid_png(2, 2, [9, 9, 9])])?;

        session.set_preset(Preset::Analog);
        session.set_intensity(100)?;
        session.generate(&pipeline, &cancel).await?;
        session.set_preset(Preset::Corporate);
        session.set_intensity(0)?;
        session.generate(&pipeline, &cancel).await?;

        let ids: Vec<String> = session
            .history()
            .list()
            .iter()
            .map(|version| version.id.clone())
            .collect();
        assert_eq!(ids, ["v2", "v1"]);

        let restored = session.restore("v1")?;
        assert_eq!(session.params().preset, Preset::Analog);
        assert_eq!(session.params().intensity, 100);
        assert_eq!(
            session.batch().get(0).unwrap().processed(),
            Some(&restored.preview)
        );
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history().list()[0].id, "v2");

        assert_eq!(
            session.restore("v9").unwrap_err().kind(),
            ErrorKind::UnknownVersion
        );
        Ok(())
    }

    #[tokio::test]
    async fn export_requires_processed_items() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let oracle = Arc::new(StubOracle::new(
            metrics_reply(METRICS),
            image_reply(&solid_png(2, 2, [200, 0, 0])),
        ));
        let pipeline = pipeline(oracle);
        let mut session = LookSession::new();
        assert_eq!(
            session.export("Spring Shoot").unwrap_err().kind(),
            ErrorKind::NotReady
        );

        session
            .load_reference(&pipeline, solid_png(2, 2, [0, 0, 0]))
            .await?;
        session.upload_batch([solid_png(2, 2, [9, 9, 9])])?;
        assert_eq!(
            session.export("Spring Shoot").unwrap_err().kind(),
            ErrorKind::NotReady
        );

        session.generate(&pipeline, &CancellationToken::new()).await?;
        let root = session.write_export(temp.path(), "Spring Shoot")?;
        assert!(root.ends_with("Spring_Shoot"));
        assert!(root.join("Master_Reference.jpg").exists());
        assert!(root.join("Batch_1_Look.png").exists());
        assert!(root.join("manifest.json").exists());

        let date = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let master = session.write_master(temp.path(), date)?;
        assert!(master.ends_with("LookLab_Master_2026-02-01.jpg"));
        let id = session.batch().get(0).unwrap().id().to_string();
        let single = session.write_processed(temp.path(), None)?;
        assert_eq!(single, temp.path().join(format!("looklab-{id}-processed.png")));
        assert!(session.write_processed(temp.path(), Some("b-nope")).is_err());
        Ok(())
    }
}
