use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LookError;
use crate::images::ImageHandle;

/// Quality score attached to every successfully processed item.
pub const QUALITY_SCORE: u8 = 92;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl BatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    id: String,
    original: ImageHandle,
    processed: Option<ImageHandle>,
    status: BatchStatus,
    quality_score: Option<u8>,
}

impl BatchItem {
    pub fn new(original: ImageHandle) -> Self {
        Self::with_id(format!("b-{}", Uuid::new_v4().simple()), original)
    }

    pub fn with_id(id: impl Into<String>, original: ImageHandle) -> Self {
        Self {
            id: id.into(),
            original,
            processed: None,
            status: BatchStatus::Pending,
            quality_score: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn original(&self) -> &ImageHandle {
        &self.original
    }

    pub fn processed(&self) -> Option<&ImageHandle> {
        self.processed.as_ref()
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn quality_score(&self) -> Option<u8> {
        self.quality_score
    }

    /// `pending | done | failed -> processing`. A finished item may be
    /// re-targeted; its processed fields are overwritten on completion.
    pub fn begin_processing(&mut self) -> Result<(), LookError> {
        if self.status == BatchStatus::Processing {
            return Err(self.invalid(BatchStatus::Processing));
        }
        self.status = BatchStatus::Processing;
        Ok(())
    }

    /// `processing -> done`.
    pub fn complete(&mut self, processed: ImageHandle, quality_score: u8) -> Result<(), LookError> {
        if self.status != BatchStatus::Processing {
            return Err(self.invalid(BatchStatus::Done));
        }
        self.processed = Some(processed);
        self.quality_score = Some(quality_score);
        self.status = BatchStatus::Done;
        Ok(())
    }

    /// `processing -> failed`; no partial artifact survives.
    pub fn fail(&mut self) -> Result<(), LookError> {
        if self.status != BatchStatus::Processing {
            return Err(self.invalid(BatchStatus::Failed));
        }
        self.processed = None;
        self.quality_score = None;
        self.status = BatchStatus::Failed;
        Ok(())
    }

    /// Re-attaches a restored version preview without running a transfer.
    pub fn attach_preview(&mut self, preview: ImageHandle) -> Result<(), LookError> {
        if self.status == BatchStatus::Processing {
            return Err(self.invalid(BatchStatus::Done));
        }
        self.processed = Some(preview);
        self.quality_score = Some(QUALITY_SCORE);
        self.status = BatchStatus::Done;
        Ok(())
    }

    fn invalid(&self, to: BatchStatus) -> LookError {
        LookError::InvalidTransition {
            from: self.status.as_str(),
            to: to.as_str(),
        }
    }
}

/// Which item a generation request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetPolicy {
    /// Always the first uploaded item.
    #[default]
    FirstItem,
}

impl TargetPolicy {
    pub fn select(self, batch: &Batch) -> Option<usize> {
        match self {
            Self::FirstItem => (!batch.is_empty()).then_some(0),
        }
    }
}

/// Ordered batch of target images.
///
/// Items sit behind `Arc` and are only ever swapped whole, so a snapshot
/// handed to a viewer stays internally consistent while a generation lands.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    items: Vec<Arc<BatchItem>>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload(&mut self, originals: impl IntoIterator<Item = ImageHandle>) -> Vec<String> {
        let mut ids = Vec::new();
        for original in originals {
            let item = BatchItem::new(original);
            ids.push(item.id().to_string());
            self.items.push(Arc::new(item));
        }
        ids
    }

    pub fn push(&mut self, item: BatchItem) {
        self.items.push(Arc::new(item));
    }

    pub fn items(&self) -> &[Arc<BatchItem>] {
        &self.items
    }

    pub fn snapshot(&self) -> Vec<Arc<BatchItem>> {
        self.items.clone()
    }

    pub fn get(&self, index: usize) -> Option<&BatchItem> {
        self.items.get(index).map(Arc::as_ref)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Applies `change` to a copy of the item and swaps it in only on success.
    pub fn update<F>(&mut self, index: usize, change: F) -> Result<(), LookError>
    where
        F: FnOnce(&mut BatchItem) -> Result<(), LookError>,
    {
        let Some(current) = self.items.get(index) else {
            return Err(LookError::InvalidInput(format!(
                "batch index {index} out of range"
            )));
        };
        let mut next = BatchItem::clone(current);
        change(&mut next)?;
        self.items[index] = Arc::new(next);
        Ok(())
    }

    pub fn processed(&self) -> impl Iterator<Item = (&BatchItem, &ImageHandle)> {
        self.items.iter().filter_map(|item| {
            if item.status() != BatchStatus::Done {
                return None;
            }
            item.processed().map(|processed| (&**item, processed))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Batch, BatchItem, BatchStatus, TargetPolicy, QUALITY_SCORE};
    use crate::error::ErrorKind;
    use crate::images::data_url;

    fn item(id: &str) -> BatchItem {
        BatchItem::with_id(id, data_url::encode(b"original", "image/png"))
    }

    #[test]
    fn item_walks_pending_processing_done() {
        let mut item = item("b-1");
        assert_eq!(item.status(), BatchStatus::Pending);
        item.begin_processing().unwrap();
        let processed = data_url::encode(b"composite", "image/jpeg");
        item.complete(processed.clone(), QUALITY_SCORE).unwrap();
        assert_eq!(item.status(), BatchStatus::Done);
        assert_eq!(item.processed(), Some(&processed));
        assert_eq!(item.quality_score(), Some(92));
    }

    #[test]
    fn failure_clears_processed_fields() {
        let mut item = item("b-1");
        item.begin_processing().unwrap();
        item.complete(data_url::encode(b"v1", "image/jpeg"), QUALITY_SCORE)
            .unwrap();

        item.begin_processing().unwrap();
        item.fail().unwrap();
        assert_eq!(item.status(), BatchStatus::Failed);
        assert!(item.processed().is_none());
        assert!(item.quality_score().is_none());
    }

    #[test]
    fn processing_cannot_restart_or_skip() {
        let mut item = item("b-1");
        assert_eq!(
            item.complete(data_url::encode(b"x", "image/png"), 1)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidTransition
        );
        item.begin_processing().unwrap();
        assert_eq!(
            item.begin_processing().unwrap_err().to_string(),
            "invalid batch transition: processing -> processing"
        );
        assert!(item
            .attach_preview(data_url::encode(b"x", "image/png"))
            .is_err());
    }

    #[test]
    fn update_swaps_whole_items_and_keeps_snapshots_stable() {
        let mut batch = Batch::new();
        batch.push(item("b-1"));
        batch.push(item("b-2"));
        let before = batch.snapshot();

        batch.update(0, BatchItem::begin_processing).unwrap();
        assert_eq!(before[0].status(), BatchStatus::Pending);
        assert_eq!(batch.items()[0].status(), BatchStatus::Processing);

        let err = batch.update(1, BatchItem::fail).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(batch.items()[1].status(), BatchStatus::Pending);
    }

    #[test]
    fn first_item_policy_targets_index_zero() {
        let mut batch = Batch::new();
        assert_eq!(TargetPolicy::FirstItem.select(&batch), None);
        let ids = batch.upload([
            data_url::encode(b"a", "image/png"),
            data_url::encode(b"b", "image/png"),
        ]);
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(TargetPolicy::FirstItem.select(&batch), Some(0));
        assert_eq!(batch.position(&ids[1]), Some(1));
    }
}
