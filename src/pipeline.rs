//! End-to-end question answering over one document.
//!
//! document -> chunks -> vectors -> index, then per question:
//! question -> vector -> neighbours -> context -> answer.

use anyhow::Result;
use rayon::prelude::*;

use crate::config::{Number, Settings, DEFAULT_TOP_K};
use crate::error::{Degradation, PipelineError};
use crate::index::{EmbeddingRecord, ScoredRecord, VectorIndex};
use crate::model::{closest_expected, Answer, Document, QaResult, Question, RetrievalResult};
use crate::segmenter::{Chunk, Segmenter};

pub trait DocumentSource: Send + Sync {
    /// Identifier used in error messages (usually a path).
    fn describe(&self) -> String;
    fn extract(&self) -> Result<Document>;
}

pub trait QuestionSource: Send + Sync {
    fn describe(&self) -> String;
    fn load(&self) -> Result<Vec<Question>>;
}

/// Batch embedding backend. Output order must follow input order.
pub trait Embedder: Send + Sync {
    fn embed(&self, inputs: &[&str]) -> Result<Vec<Vec<Number>>>;
}

pub trait Answerer: Send + Sync {
    fn answer(&self, question: &str, context: &str) -> Result<Answer>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub top_k: usize,
    pub concurrency: usize,
    pub isolate_answer_failures: bool,
    pub snap_to_expected: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            concurrency: 1,
            isolate_answer_failures: false,
            snap_to_expected: false,
        }
    }
}

impl From<&Settings> for PipelineOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            top_k: settings.top_k,
            concurrency: settings.concurrency,
            isolate_answer_failures: settings.isolate_answer_failures,
            snap_to_expected: settings.snap_to_expected,
        }
    }
}

/// The corpus index plus the reason it is empty, if embedding failed.
#[derive(Debug)]
pub struct IndexOutcome {
    pub index: VectorIndex,
    pub degradation: Option<Degradation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContextOutcome {
    Retrieved { context: String, sources: Vec<String> },
    Degraded(Degradation),
}

impl ContextOutcome {
    pub fn into_retrieval(self, question: &str) -> RetrievalResult {
        match self {
            ContextOutcome::Retrieved { context, sources } => RetrievalResult {
                question: question.to_string(),
                context,
                sources,
                degraded: None,
            },
            ContextOutcome::Degraded(reason) => RetrievalResult {
                question: question.to_string(),
                context: String::new(),
                sources: Vec::new(),
                degraded: Some(reason),
            },
        }
    }
}

/// Joins neighbours as `[id] text` blocks separated by a blank line.
pub fn format_context(neighbours: &[ScoredRecord<'_>]) -> String {
    neighbours
        .iter()
        .map(|n| format!("[{}] {}", n.record.id, n.record.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct RetrievalPipeline<'a> {
    documents: &'a dyn DocumentSource,
    questions: &'a dyn QuestionSource,
    embedder: &'a dyn Embedder,
    answerer: &'a dyn Answerer,
    segmenter: Segmenter,
    options: PipelineOptions,
}

impl<'a> RetrievalPipeline<'a> {
    pub fn new(
        documents: &'a dyn DocumentSource,
        questions: &'a dyn QuestionSource,
        embedder: &'a dyn Embedder,
        answerer: &'a dyn Answerer,
    ) -> Self {
        Self {
            documents,
            questions,
            embedder,
            answerer,
            segmenter: Segmenter::default(),
            options: PipelineOptions::default(),
        }
    }

    pub fn with_segmenter(mut self, segmenter: Segmenter) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs the whole batch. Results come back in input question order.
    pub fn run(&self) -> Result<Vec<QaResult>, PipelineError> {
        let document =
            self.documents
                .extract()
                .map_err(|source| PipelineError::SourceUnavailable {
                    source_ref: self.documents.describe(),
                    source,
                })?;
        let questions =
            self.questions
                .load()
                .map_err(|source| PipelineError::SourceUnavailable {
                    source_ref: self.questions.describe(),
                    source,
                })?;

        let chunks = self.segmenter.chunks(&document);
        tracing::info!(
            chars = document.text.chars().count(),
            pages = document.page_count(),
            chunks = chunks.len(),
            questions = questions.len(),
            "document segmented"
        );

        let outcome = self.build_index(&chunks);
        let answer_all = || -> Result<Vec<QaResult>, PipelineError> {
            if self.options.concurrency > 1 {
                // Collected per question so the reported failure is the earliest one.
                let answered: Vec<Result<QaResult, PipelineError>> = questions
                    .par_iter()
                    .enumerate()
                    .map(|(position, question)| self.process(&outcome, position, question))
                    .collect();
                answered.into_iter().collect()
            } else {
                questions
                    .iter()
                    .enumerate()
                    .map(|(position, question)| self.process(&outcome, position, question))
                    .collect()
            }
        };

        if self.options.concurrency > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.concurrency)
                .thread_name(|i| format!("docqa-question-{}", i))
                .build()
                .map_err(|err| PipelineError::Workers(err.to_string()))?;
            pool.install(answer_all)
        } else {
            answer_all()
        }
    }

    /// Embeds every chunk in one batch and builds a fresh index. Any embedding
    /// failure yields an empty index instead of an error.
    pub fn build_index(&self, chunks: &[Chunk]) -> IndexOutcome {
        if chunks.is_empty() {
            return IndexOutcome {
                index: VectorIndex::new(),
                degradation: None,
            };
        }

        let inputs: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = match self.embedder.embed(&inputs) {
            Ok(vectors) => vectors,
            Err(err) => {
                tracing::warn!(
                    call = "corpus",
                    batch = inputs.len(),
                    "embedding failed, continuing without retrieval: {:#}",
                    err
                );
                return IndexOutcome {
                    index: VectorIndex::new(),
                    degradation: Some(Degradation::embedding("corpus", &err)),
                };
            }
        };

        if vectors.len() != chunks.len() {
            tracing::warn!(
                expected = chunks.len(),
                received = vectors.len(),
                "embedding batch size mismatch; chunks without a vector are unretrievable"
            );
        }

        let mut vectors = vectors.into_iter();
        let records = chunks
            .iter()
            .map(|chunk| {
                EmbeddingRecord::new(
                    chunk.id.clone(),
                    chunk.text.clone(),
                    vectors.next().unwrap_or_default(),
                )
            })
            .collect();

        IndexOutcome {
            index: VectorIndex::with_records(records),
            degradation: None,
        }
    }

    /// Selects grounding context for one question.
    pub fn retrieve(&self, index: &VectorIndex, position: usize, question: &str) -> ContextOutcome {
        if question.trim().is_empty() {
            tracing::warn!(question = position, "skipping retrieval for empty question");
            return ContextOutcome::Degraded(Degradation::EmptyQuestion);
        }

        let vector = match self.embedder.embed(&[question]) {
            Ok(vectors) => vectors.into_iter().next(),
            Err(err) => {
                tracing::warn!(
                    call = "question",
                    question = position,
                    batch = 1,
                    "embedding failed, answering without context: {:#}",
                    err
                );
                return ContextOutcome::Degraded(Degradation::embedding("question", &err));
            }
        };
        let Some(vector) = vector else {
            tracing::warn!(question = position, "embedding backend returned no vector");
            return ContextOutcome::Degraded(Degradation::EmbeddingUnavailable {
                call: "question".to_string(),
                detail: "backend returned no vector".to_string(),
            });
        };

        let neighbours = index.query(&vector, self.options.top_k);
        let scores: Vec<(&str, Number)> = neighbours
            .iter()
            .map(|n| (n.record.id.as_str(), n.similarity))
            .collect();
        tracing::debug!(question = position, neighbours = ?scores, "retrieved context");
        ContextOutcome::Retrieved {
            context: format_context(&neighbours),
            sources: neighbours.iter().map(|n| n.record.id.clone()).collect(),
        }
    }

    fn process(
        &self,
        outcome: &IndexOutcome,
        position: usize,
        question: &Question,
    ) -> Result<QaResult, PipelineError> {
        let mut retrieval = self
            .retrieve(&outcome.index, position, &question.text)
            .into_retrieval(&question.text);
        if retrieval.degraded.is_none() {
            retrieval.degraded = outcome.degradation.clone();
        }

        let (answer, degraded) = match self.answerer.answer(&question.text, &retrieval.context) {
            Ok(answer) => (answer, retrieval.degraded),
            Err(err) if self.options.isolate_answer_failures => {
                tracing::warn!(question = position, "answer backend failed: {:#}", err);
                let reason = Degradation::AnswerUnavailable {
                    detail: format!("{:#}", err),
                };
                (
                    Answer {
                        text: String::new(),
                        raw: serde_json::Value::Null,
                    },
                    Some(reason),
                )
            }
            Err(source) => {
                return Err(PipelineError::AnswerUnavailable {
                    position,
                    question: question.text.clone(),
                    source,
                })
            }
        };

        let closest = if self.options.snap_to_expected {
            closest_expected(&answer.text, &question.expected_values).map(str::to_string)
        } else {
            None
        };

        Ok(QaResult {
            question: question.text.clone(),
            kind: question.kind.clone(),
            expected_values: question.expected_values.clone(),
            answer: answer.text,
            raw: answer.raw,
            context: retrieval.context,
            sources: retrieval.sources,
            degraded,
            closest_expected: closest,
        })
    }
}
