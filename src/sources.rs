use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::model::{Document, Question};
use crate::pipeline::{DocumentSource, QuestionSource};

/// Reads a document from disk. `.pdf` files are extracted page by page,
/// anything else is read as UTF-8 text.
#[derive(Debug, Clone)]
pub struct DocumentFile {
    path: PathBuf,
}

impl DocumentFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn is_pdf(&self) -> bool {
        self.path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("pdf"))
    }

    fn extract_pdf(&self) -> Result<Document> {
        let pdf = lopdf::Document::load(&self.path)
            .with_context(|| format!("Failed to open PDF '{}'", self.path.display()))?;
        let mut pages = Vec::new();
        for page_number in pdf.get_pages().keys() {
            let text = pdf.extract_text(&[*page_number]).with_context(|| {
                format!(
                    "Failed to extract text from page {} of '{}'",
                    page_number,
                    self.path.display()
                )
            })?;
            pages.push(text);
        }
        tracing::debug!(path = %self.path.display(), pages = pages.len(), "extracted PDF text");
        Ok(Document::from_pages(pages))
    }
}

impl DocumentSource for DocumentFile {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn extract(&self) -> Result<Document> {
        if !self.path.exists() {
            anyhow::bail!("document file '{}' not found", self.path.display());
        }
        if self.is_pdf() {
            self.extract_pdf()
        } else {
            let text = std::fs::read_to_string(&self.path)
                .with_context(|| format!("Failed to read document '{}'", self.path.display()))?;
            Ok(Document::plain(text))
        }
    }
}

/// Loads questions from a CSV file with `question`, `type` and
/// `expected values` columns. Missing columns read as empty.
#[derive(Debug, Clone)]
pub struct CsvQuestions {
    path: PathBuf,
}

impl CsvQuestions {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

fn column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

/// `"a, b,c"` -> `["a", "b", "c"]`; quotes are dropped and blank input yields
/// no values.
pub fn parse_expected_values(raw: &str) -> Vec<String> {
    let cleaned = raw.trim().replace('"', "");
    if cleaned.trim().is_empty() {
        return Vec::new();
    }
    cleaned.split(',').map(|v| v.trim().to_string()).collect()
}

impl QuestionSource for CsvQuestions {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Vec<Question>> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to open questions file '{}'", self.path.display()))?;

        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read CSV header of '{}'", self.path.display()))?
            .clone();
        let question_col = column(&headers, "question");
        let type_col = column(&headers, "type");
        let expected_col = column(&headers, "expected values");

        let field = |record: &csv::StringRecord, col: Option<usize>| -> String {
            col.and_then(|i| record.get(i))
                .unwrap_or("")
                .trim()
                .to_string()
        };

        let mut questions = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.with_context(|| {
                format!("Failed to parse row {} of '{}'", row + 1, self.path.display())
            })?;
            questions.push(Question {
                text: field(&record, question_col),
                kind: field(&record, type_col),
                expected_values: parse_expected_values(&field(&record, expected_col)),
            });
        }
        tracing::debug!(path = %self.path.display(), questions = questions.len(), "loaded questions");
        Ok(questions)
    }
}
