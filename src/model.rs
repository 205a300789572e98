use serde::{Deserialize, Serialize};

use crate::error::Degradation;

/// Extracted document text. Pages are joined with `\n`; `page_starts` holds the
/// byte offset where each page begins and is empty for unpaged sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    page_starts: Vec<usize>,
}

impl Document {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page_starts: Vec::new(),
        }
    }

    pub fn from_pages(pages: Vec<String>) -> Self {
        let mut text = String::new();
        let mut page_starts = Vec::with_capacity(pages.len());
        for (i, page) in pages.iter().enumerate() {
            if i > 0 {
                text.push('\n');
            }
            page_starts.push(text.len());
            text.push_str(page);
        }
        Self { text, page_starts }
    }

    pub fn page_count(&self) -> usize {
        self.page_starts.len()
    }

    /// 1-based page containing `byte`, or `None` for unpaged documents.
    pub fn page_at(&self, byte: usize) -> Option<usize> {
        if self.page_starts.is_empty() {
            return None;
        }
        Some(self.page_starts.partition_point(|&start| start <= byte).max(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub expected_values: Vec<String>,
}

/// What the answer backend returned: the extracted answer and the full payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub raw: serde_json::Value,
}

/// Grounding context selected for one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub question: String,
    pub context: String,
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<Degradation>,
}

/// One row of the final output, in input question order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QaResult {
    pub question: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub expected_values: Vec<String>,
    pub answer: String,
    pub raw: serde_json::Value,
    pub context: String,
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<Degradation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closest_expected: Option<String>,
}

/// Picks the expected value sharing the most words with `answer`.
///
/// A word counts when it occurs anywhere in the lower-cased answer. The first
/// expected value wins ties.
pub fn closest_expected<'a>(answer: &str, expected: &'a [String]) -> Option<&'a str> {
    let answer = answer.to_lowercase();
    let score = |value: &str| {
        value
            .to_lowercase()
            .split_whitespace()
            .filter(|word| answer.contains(word))
            .count()
    };

    let mut best: Option<(&str, usize)> = None;
    for value in expected {
        let s = score(value);
        if best.map_or(true, |(_, top)| s > top) {
            best = Some((value.as_str(), s));
        }
    }
    best.map(|(value, _)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_lookup() {
        let doc = Document::from_pages(vec!["aa".into(), "bbb".into(), "".into(), "c".into()]);
        assert_eq!(doc.text, "aa\nbbb\n\nc");
        assert_eq!(doc.page_count(), 4);
        assert_eq!(doc.page_at(0), Some(1));
        assert_eq!(doc.page_at(2), Some(1));
        assert_eq!(doc.page_at(3), Some(2));
        assert_eq!(doc.page_at(8), Some(4));
    }

    #[test]
    fn closest_expected_prefers_word_overlap() {
        let expected = vec![
            "Green bonds".to_string(),
            "Social loans".to_string(),
            "Sustainability linked loans".to_string(),
        ];
        assert_eq!(
            closest_expected("They issued sustainability-linked LOANS in 2023", &expected),
            Some("Sustainability linked loans")
        );
        assert_eq!(closest_expected("nothing matches", &expected), Some("Green bonds"));
        assert_eq!(closest_expected("anything", &[]), None);
    }

    #[test]
    fn serializes_with_reference_field_names() {
        let result = QaResult {
            question: "q".into(),
            kind: "text".into(),
            expected_values: vec![],
            answer: "a".into(),
            raw: serde_json::Value::Null,
            context: String::new(),
            sources: vec![],
            degraded: Some(Degradation::EmptyQuestion),
            closest_expected: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["degraded"]["kind"], "empty_question");
        assert!(json.get("closest_expected").is_none());
    }
}
