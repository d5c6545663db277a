use std::collections::HashMap;

use looklab_contracts::grading::Preset;
use looklab_contracts::images::ImageHandle;
use looklab_contracts::LookError;
use sha2::{Digest, Sha256};

/// In-memory store of max-strength looks keyed by their inputs.
///
/// Entries belong to one session epoch; moving to another epoch drops them.
/// Nothing is persisted.
#[derive(Debug, Default)]
pub struct StylizedCache {
    epoch: Option<u64>,
    entries: HashMap<String, ImageHandle>,
}

impl StylizedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches to `epoch`, clearing entries left by any other epoch.
    pub fn enter_epoch(&mut self, epoch: u64) {
        if self.epoch != Some(epoch) {
            self.entries.clear();
            self.epoch = Some(epoch);
        }
    }

    pub fn get(&self, key: &str) -> Option<ImageHandle> {
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, key: String, stylized: ImageHandle) {
        self.entries.insert(key, stylized);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SHA-256 over the image content, preset and model, hex encoded.
pub fn stylized_key(
    reference: &ImageHandle,
    target: &ImageHandle,
    preset: Preset,
    model: &str,
) -> Result<String, LookError> {
    let mut hasher = Sha256::new();
    for bytes in [reference.read_bytes()?, target.read_bytes()?] {
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
    hasher.update(preset.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(model.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
