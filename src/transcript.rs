//! Typed transcript layer.
//!
//! The engine's generic node model carries transcript documents: paragraphs
//! attributed to a speaker, containing timed text tokens. This module gives
//! that shape concrete types and converts to and from the generic
//! [`Node`](crate::editor::Node) model used by the operation pipeline.

use crate::editor::{Children, Node};
use crate::value::{Scalar, Value};
use serde::{Deserialize, Serialize};

/// A timed, confidence-scored text token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextToken {
    /// Literal text content.
    pub text: String,
    /// Start timestamp in milliseconds, if aligned to media.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_ms: Option<i64>,
    /// End timestamp in milliseconds, if aligned to media.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_ms: Option<i64>,
    /// Recognizer confidence in `[0, 1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl TextToken {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            start_ms: None,
            end_ms: None,
            confidence: None,
        }
    }

    pub fn timed(text: impl Into<String>, start_ms: i64, end_ms: i64) -> Self {
        Self {
            text: text.into(),
            start_ms: Some(start_ms),
            end_ms: Some(end_ms),
            confidence: None,
        }
    }

    /// Convert to a generic node.
    pub fn to_node(&self) -> Node {
        let mut node = Node::text(self.text.clone());
        if let Some(start) = self.start_ms {
            node.props.insert("start_ms".to_string(), Value::int(start));
        }
        if let Some(end) = self.end_ms {
            node.props.insert("end_ms".to_string(), Value::int(end));
        }
        if let Some(c) = self.confidence {
            node.props.insert("confidence".to_string(), Value::float(c));
        }
        node
    }

    /// Read a token back from a generic node.
    pub fn from_node(node: &Node) -> Option<Self> {
        let text = match &node.children {
            Children::Text(s) => s.clone(),
            Children::Nodes(_) => return None,
        };
        Some(Self {
            text,
            start_ms: node.props.get("start_ms").and_then(|v| v.as_scalar()).and_then(Scalar::as_int),
            end_ms: node.props.get("end_ms").and_then(|v| v.as_scalar()).and_then(Scalar::as_int),
            confidence: node
                .props
                .get("confidence")
                .and_then(|v| v.as_scalar())
                .and_then(Scalar::as_float),
        })
    }
}

/// A speaker-attributed transcript paragraph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    /// BCP 47 language tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Attributed speaker id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    /// Other plausible speaker ids for this paragraph.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternative_speakers: Vec<String>,
    /// Timed text tokens, in reading order.
    pub tokens: Vec<TextToken>,
}

impl Paragraph {
    pub fn new(tokens: Vec<TextToken>) -> Self {
        Self {
            language: None,
            speaker: None,
            alternative_speakers: Vec::new(),
            tokens,
        }
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Concatenated token text.
    pub fn full_text(&self) -> String {
        self.tokens.iter().map(|t| t.text.as_str()).collect()
    }

    /// Convert to a generic node.
    pub fn to_node(&self) -> Node {
        let mut node = Node::empty();
        if let Some(lang) = &self.language {
            node.props.insert("language".to_string(), Value::str(lang.clone()));
        }
        if let Some(speaker) = &self.speaker {
            node.props.insert("speaker".to_string(), Value::str(speaker.clone()));
        }
        if !self.alternative_speakers.is_empty() {
            node.props.insert(
                "alternative_speakers".to_string(),
                Value::List(
                    self.alternative_speakers
                        .iter()
                        .map(|s| Value::str(s.clone()))
                        .collect(),
                ),
            );
        }
        node.children = Children::Nodes(self.tokens.iter().map(TextToken::to_node).collect());
        node
    }

    /// Insert-node payload for this paragraph.
    pub fn to_value(&self) -> Value {
        self.to_node().to_value()
    }

    /// Read a paragraph back from a generic node.
    pub fn from_node(node: &Node) -> Option<Self> {
        let children = match &node.children {
            Children::Nodes(n) => n,
            Children::Text(_) => return None,
        };
        let tokens = children.iter().filter_map(TextToken::from_node).collect();
        let string_prop = |key: &str| {
            node.props
                .get(key)
                .and_then(|v| v.as_scalar())
                .and_then(Scalar::as_str)
                .map(str::to_string)
        };
        let alternative_speakers = node
            .props
            .get("alternative_speakers")
            .and_then(Value::as_list)
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_scalar().and_then(Scalar::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            language: string_prop("language"),
            speaker: string_prop("speaker"),
            alternative_speakers,
            tokens,
        })
    }
}

/// Read every well-formed paragraph out of a document.
pub fn paragraphs_of(doc: &crate::editor::Document) -> Vec<Paragraph> {
    doc.paragraphs().iter().filter_map(Paragraph::from_node).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::Document;
    use crate::op::Operation;

    #[test]
    fn test_token_roundtrip() {
        let token = TextToken {
            text: "hello".to_string(),
            start_ms: Some(120),
            end_ms: Some(480),
            confidence: Some(0.92),
        };
        let node = token.to_node();
        assert_eq!(TextToken::from_node(&node), Some(token));
    }

    #[test]
    fn test_paragraph_roundtrip() {
        let para = Paragraph {
            language: Some("en".to_string()),
            speaker: Some("s1".to_string()),
            alternative_speakers: vec!["s2".to_string()],
            tokens: vec![TextToken::timed("hi", 0, 300), TextToken::new(" there")],
        };
        let node = para.to_node();
        assert_eq!(Paragraph::from_node(&node), Some(para.clone()));
        assert_eq!(para.full_text(), "hi there");
    }

    #[test]
    fn test_paragraph_through_document() {
        let para = Paragraph::new(vec![TextToken::new("word")]).with_speaker("s1");
        let mut doc = Document::new();
        doc.apply(&Operation::InsertNode {
            path: vec![0],
            node: para.to_value(),
        })
        .unwrap();
        let read = paragraphs_of(&doc);
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].speaker.as_deref(), Some("s1"));
        assert_eq!(read[0].full_text(), "word");
    }
}
