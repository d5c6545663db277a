use std::sync::{Arc, Mutex};

use looklab_contracts::grading::LookMetrics;
use looklab_contracts::images::ImageHandle;
use looklab_contracts::LookError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::analyzer::Analyzer;
use crate::blender::Blender;
use crate::cache::{stylized_key, StylizedCache};
use crate::config::EngineConfig;
use crate::oracle::{AnalysisOracle, LookOracle, OracleRegistry};
use crate::requester::Requester;
use crate::session::GenerationTicket;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Reuse the max-strength look for repeated (reference, target, preset)
    /// inputs and only re-blend. Off by default: every generation calls out.
    pub reuse_stylized: bool,
}

/// Result of one successful render.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub composite: ImageHandle,
    pub reused_stylized: bool,
}

/// Analyzer, requester and blender wired to one pair of oracles.
///
/// Holds no session state; tickets carry everything a render needs.
pub struct LookPipeline {
    analyzer: Analyzer,
    requester: Requester,
    blender: Blender,
    options: PipelineOptions,
    cache: Mutex<StylizedCache>,
}

impl LookPipeline {
    pub fn new(
        analysis: Arc<dyn AnalysisOracle>,
        look: Arc<dyn LookOracle>,
        analysis_model: impl Into<String>,
        image_model: impl Into<String>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            analyzer: Analyzer::new(analysis, analysis_model),
            requester: Requester::new(look, image_model),
            blender: Blender::default(),
            options,
            cache: Mutex::new(StylizedCache::new()),
        }
    }

    pub fn from_config(
        config: &EngineConfig,
        registry: &OracleRegistry,
    ) -> Result<Self, LookError> {
        let pipeline = Self::new(
            registry.analysis(&config.provider)?,
            registry.look(&config.provider)?,
            config.analysis_model.clone(),
            config.image_model.clone(),
            PipelineOptions {
                reuse_stylized: config.reuse_stylized,
            },
        );
        info!(
            provider = %config.provider,
            analysis_model = %config.analysis_model,
            image_model = %config.image_model,
            reuse_stylized = config.reuse_stylized,
            "look pipeline ready"
        );
        Ok(pipeline)
    }

    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    pub async fn analyze(&self, reference: &ImageHandle) -> Result<LookMetrics, LookError> {
        self.analyzer.analyze(reference).await
    }

    /// Renders a ticket. Cancelling drops the outstanding oracle call and
    /// yields [`LookError::Cancelled`].
    #[instrument(
        skip_all,
        fields(
            item_id = %ticket.item_id,
            preset = %ticket.params.preset,
            intensity = ticket.params.intensity
        )
    )]
    pub async fn run(
        &self,
        ticket: &GenerationTicket,
        cancel: &CancellationToken,
    ) -> Result<Rendered, LookError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("generation cancelled");
                Err(LookError::Cancelled)
            }
            rendered = self.render(ticket) => rendered,
        }
    }

    async fn render(&self, ticket: &GenerationTicket) -> Result<Rendered, LookError> {
        let key = if self.options.reuse_stylized {
            Some(stylized_key(
                &ticket.reference,
                &ticket.target,
                ticket.params.preset,
                self.requester.model(),
            )?)
        } else {
            None
        };

        let epoch = ticket.session_epoch();
        let cached = key.as_deref().and_then(|key| self.cached(epoch, key));
        let reused_stylized = cached.is_some();
        let stylized = match cached {
            Some(stylized) => {
                debug!("reusing stylized result");
                stylized
            }
            None => {
                let stylized = self
                    .requester
                    .transfer(&ticket.reference, &ticket.target, ticket.params.preset)
                    .await?;
                if let Some(key) = key {
                    self.remember(epoch, key, stylized.clone());
                }
                stylized
            }
        };

        let composite = self
            .blender
            .blend(&ticket.target, &stylized, ticket.params.intensity)
            .await?;
        Ok(Rendered {
            composite,
            reused_stylized,
        })
    }

    fn cached(&self, epoch: u64, key: &str) -> Option<ImageHandle> {
        let mut cache = self.cache.lock().ok()?;
        cache.enter_epoch(epoch);
        cache.get(key)
    }

    fn remember(&self, epoch: u64, key: String, stylized: ImageHandle) {
        match self.cache.lock() {
            Ok(mut cache) => {
                cache.enter_epoch(epoch);
                cache.insert(key, stylized);
            }
            Err(_) => warn!("stylized cache lock poisoned; result not cached"),
        }
    }
}
