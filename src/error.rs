use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SegmentError {
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    InvalidWindow { chunk_size: usize, overlap: usize },
}

/// Failures that stop a run. Everything recoverable is a [`Degradation`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source '{source_ref}' is unavailable: {source:#}")]
    SourceUnavailable {
        source_ref: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("answer backend failed for question {position} ('{question}'): {source:#}")]
    AnswerUnavailable {
        position: usize,
        question: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to start question workers: {0}")]
    Workers(String),
}

/// Why a result was produced with less evidence than a clean run would have had.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// An embedding call failed; `call` names the call site (`corpus` or
    /// `question`).
    EmbeddingUnavailable { call: String, detail: String },
    EmptyQuestion,
    AnswerUnavailable { detail: String },
}

impl Degradation {
    pub fn embedding(call: impl Into<String>, err: &anyhow::Error) -> Self {
        Degradation::EmbeddingUnavailable {
            call: call.into(),
            detail: format!("{:#}", err),
        }
    }
}

impl std::fmt::Display for Degradation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Degradation::EmbeddingUnavailable { call, detail } => {
                write!(f, "embedding unavailable ({}): {}", call, detail)
            }
            Degradation::EmptyQuestion => write!(f, "question text is empty"),
            Degradation::AnswerUnavailable { detail } => write!(f, "answer unavailable: {}", detail),
        }
    }
}
