//! Analysis orchestration.
//!
//! One analysis makes four generation calls arranged as two branches joined
//! at compose time:
//!
//! ```text
//! source ─┬─ summary ──── sentiment(summary) ────┐
//!         └─ key_points ─ sentiment(key_points) ─┴─ compose ─ persist
//! ```
//!
//! Sentiment stages only ever see the output of their own upstream stage.

pub mod report;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Settings;
use crate::llm::{
    LlmClient, LlmError, PromptBuilder, RetryingGenerator, TemplateKind, TextGenerator,
};
use crate::source::{SourceError, SourceResolver};

pub use report::{FsReportStore, PersistError, ReportPersister, ReportStore};

/// Default deadline for a single generation stage.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(300);

/// The four generation stages of an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "summary")]
    Summary,
    #[serde(rename = "key_points")]
    KeyPoints,
    #[serde(rename = "sentiment_summary")]
    SentimentSummary,
    #[serde(rename = "sentiment_keypoints")]
    SentimentKeyPoints,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Summary => "summary",
            Stage::KeyPoints => "key_points",
            Stage::SentimentSummary => "sentiment_summary",
            Stage::SentimentKeyPoints => "sentiment_keypoints",
        }
    }

    /// Template used to build this stage's prompt.
    pub fn template_kind(&self) -> TemplateKind {
        match self {
            Stage::Summary => TemplateKind::Summary,
            Stage::KeyPoints => TemplateKind::KeyPoints,
            Stage::SentimentSummary | Stage::SentimentKeyPoints => TemplateKind::Sentiment,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the two analysis branches are scheduled.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    /// Summary, key points, then both sentiments, one call at a time
    #[default]
    Sequential,
    /// Both branches in flight at once; the first failure drops the other
    Concurrent,
}

/// Whether `analyze_with` writes a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistMode {
    Save,
    Skip,
}

/// Generated text plus its sentiment label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedSection {
    pub text: String,
    pub sentiment: String,
}

/// Outcome of one successful analysis.
///
/// Serialized field names match what the browser client reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(rename = "analyzedFile")]
    pub source: String,
    #[serde(with = "timestamp_millis")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "savedFilePath")]
    pub report_ref: Option<String>,
    pub summary: AnalyzedSection,
    pub key_points: AnalyzedSection,
}

/// ISO-8601 UTC with millisecond precision and a `Z` suffix.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

mod timestamp_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("{stage} stage failed: {source}")]
    Generation {
        stage: Stage,
        #[source]
        source: LlmError,
    },
}

impl AnalysisError {
    /// The stage that failed, for generation errors.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            AnalysisError::Generation { stage, .. } => Some(*stage),
            AnalysisError::Source(_) => None,
        }
    }
}

/// Runs the analysis pipeline against a text generator.
pub struct Analyzer {
    resolver: SourceResolver,
    prompts: PromptBuilder,
    generator: Arc<dyn TextGenerator>,
    persister: ReportPersister,
    strategy: ExecutionStrategy,
    stage_timeout: Option<Duration>,
}

impl Analyzer {
    pub fn new(
        resolver: SourceResolver,
        prompts: PromptBuilder,
        generator: Arc<dyn TextGenerator>,
        persister: ReportPersister,
    ) -> Self {
        Self {
            resolver,
            prompts,
            generator,
            persister,
            strategy: ExecutionStrategy::default(),
            stage_timeout: Some(DEFAULT_STAGE_TIMEOUT),
        }
    }

    /// Build an analyzer backed by the configured Ollama endpoint.
    pub fn from_settings(settings: &Settings) -> Result<Self, reqwest::Error> {
        let client = LlmClient::new(settings.llm.clone())?;
        let generator = RetryingGenerator::new(client, settings.llm.retry_policy());

        Ok(Self::new(
            SourceResolver::new(&settings.storage_dir, settings.default_source.clone()),
            PromptBuilder::new(
                settings.analysis.prompts.clone(),
                settings.analysis.max_input_chars,
            ),
            Arc::new(generator),
            ReportPersister::new(Arc::new(FsReportStore::new(&settings.reports_dir))),
        )
        .with_strategy(settings.analysis.strategy)
        .with_stage_timeout(settings.analysis.stage_timeout()))
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the per-stage deadline (`None` disables it).
    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn resolver(&self) -> &SourceResolver {
        &self.resolver
    }

    pub fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    /// Analyze a reference (or the default) and persist the report.
    pub async fn analyze(&self, reference: Option<&str>) -> Result<AnalysisResult, AnalysisError> {
        self.analyze_with(reference, PersistMode::Save).await
    }

    /// Analyze a reference, persisting the report only in [`PersistMode::Save`].
    ///
    /// A failed write is logged and leaves `report_ref` empty; it never
    /// fails the analysis.
    pub async fn analyze_with(
        &self,
        reference: Option<&str>,
        mode: PersistMode,
    ) -> Result<AnalysisResult, AnalysisError> {
        let source = self.resolver.resolve(reference).await?;
        info!(
            "Analyzing {} ({} chars, {:?})",
            source.reference,
            source.content.chars().count(),
            self.strategy
        );

        let (summary, key_points) = match self.strategy {
            ExecutionStrategy::Sequential => {
                let summary = self.run_stage(Stage::Summary, &source.content).await?;
                let key_points = self.run_stage(Stage::KeyPoints, &source.content).await?;
                let summary_sentiment = self.run_stage(Stage::SentimentSummary, &summary).await?;
                let key_points_sentiment =
                    self.run_stage(Stage::SentimentKeyPoints, &key_points).await?;
                (
                    AnalyzedSection {
                        text: summary,
                        sentiment: summary_sentiment,
                    },
                    AnalyzedSection {
                        text: key_points,
                        sentiment: key_points_sentiment,
                    },
                )
            }
            ExecutionStrategy::Concurrent => {
                tokio::try_join!(
                    self.run_branch(Stage::Summary, Stage::SentimentSummary, &source.content),
                    self.run_branch(Stage::KeyPoints, Stage::SentimentKeyPoints, &source.content),
                )?
            }
        };

        let result = AnalysisResult {
            source: source.reference,
            timestamp: Utc::now().trunc_subsecs(3),
            report_ref: None,
            summary,
            key_points,
        };

        let report_ref = match mode {
            PersistMode::Skip => None,
            PersistMode::Save => match self.persister.persist(&result).await {
                Ok(name) => Some(name),
                Err(e) => {
                    warn!("Analysis of {} not saved: {}", result.source, e);
                    None
                }
            },
        };

        info!(
            "Analysis of {} complete (report: {})",
            result.source,
            report_ref.as_deref().unwrap_or("none")
        );

        Ok(AnalysisResult {
            report_ref,
            ..result
        })
    }

    /// Generate text for `stage`, then classify it with `sentiment_stage`.
    async fn run_branch(
        &self,
        stage: Stage,
        sentiment_stage: Stage,
        text: &str,
    ) -> Result<AnalyzedSection, AnalysisError> {
        let output = self.run_stage(stage, text).await?;
        let sentiment = self.run_stage(sentiment_stage, &output).await?;
        Ok(AnalyzedSection {
            text: output,
            sentiment,
        })
    }

    async fn run_stage(&self, stage: Stage, payload: &str) -> Result<String, AnalysisError> {
        let prompt = self.prompts.render(stage.template_kind(), payload);
        info!("Running {} stage", stage);

        let call = self.generator.generate(&prompt);
        let outcome = match self.stage_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(LlmError::Timeout(limit)),
            },
            None => call.await,
        };

        outcome
            .map(|text| text.trim().to_string())
            .map_err(|source| AnalysisError::Generation { stage, source })
    }
}
