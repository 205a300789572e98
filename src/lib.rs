//! Question answering over a single document with exact vector retrieval.
//!
//! The document is split into overlapping character windows, every window is
//! embedded once, and each question is answered with its nearest windows as
//! grounding context.

pub mod backend;
pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod segmenter;
pub mod sources;
pub mod vector_ops;

pub use error::{Degradation, PipelineError, SegmentError};
pub use index::{EmbeddingRecord, ScoredRecord, VectorIndex};
pub use model::{Answer, Document, QaResult, Question, RetrievalResult};
pub use pipeline::{Answerer, DocumentSource, Embedder, QuestionSource, RetrievalPipeline};
pub use segmenter::{Chunk, Segmenter};
