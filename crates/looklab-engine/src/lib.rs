pub mod analyzer;
pub mod blender;
pub mod cache;
pub mod config;
pub mod oracle;
pub mod pipeline;
pub mod requester;
pub mod session;
pub mod studio;

#[cfg(test)]
mod test_support;

pub use analyzer::{parse_metrics, Analyzer, ANALYSIS_INSTRUCTION};
pub use blender::{composite, Blender};
pub use config::{CredentialSource, EngineConfig};
pub use oracle::{
    default_oracle_registry, AnalysisOracle, DryrunOracle, GeminiOracle, LookOracle,
    OracleFailure, OracleRegistry,
};
pub use pipeline::{LookPipeline, PipelineOptions, Rendered};
pub use requester::{interpret_reply, look_instruction, Requester};
pub use session::{GenerationOutcome, GenerationTicket, LookSession, ReferenceOutcome};
pub use studio::Studio;
