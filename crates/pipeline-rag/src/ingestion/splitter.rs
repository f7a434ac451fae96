//! Windowed document splitting with overlap and page tracking

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::config::SplitterConfig;
use crate::error::Result;
use crate::pipeline::{PortSpec, PortType, PortValue, PortValues, Stage};
use crate::types::Document;

use super::converter::PAGE_BREAK;

/// Unit a document is split into
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SplitBy {
    /// Space separated words
    #[default]
    Word,
    /// Unicode sentence boundaries
    Sentence,
    /// Blank-line separated paragraphs
    Passage,
    /// Form-feed separated pages
    Page,
    /// Newline separated lines
    Line,
}

impl SplitBy {
    fn delimiter(self) -> Option<&'static str> {
        match self {
            Self::Word => Some(" "),
            Self::Sentence => None,
            Self::Passage => Some("\n\n"),
            Self::Page => Some("\x0c"),
            Self::Line => Some("\n"),
        }
    }

    /// Split `text` into units whose concatenation is `text` again
    fn units(self, text: &str) -> Vec<&str> {
        match self.delimiter() {
            Some(delimiter) => text.split_inclusive(delimiter).collect(),
            None => text.split_sentence_bounds().collect(),
        }
    }
}

/// One produced split before it becomes a document
#[derive(Debug, PartialEq)]
struct Split {
    text: String,
    page_number: usize,
    idx_start: usize,
}

/// Splits documents into overlapping windows of units
pub struct DocumentSplitter {
    split_by: SplitBy,
    split_length: usize,
    split_overlap: usize,
    split_threshold: usize,
}

impl DocumentSplitter {
    /// Create a splitter; fails when overlap is not smaller than length
    pub fn new(config: &SplitterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            split_by: config.split_by,
            split_length: config.split_length,
            split_overlap: config.split_overlap,
            split_threshold: config.split_threshold,
        })
    }

    fn concatenate_units(&self, units: &[&str]) -> Vec<Split> {
        let step = self.split_length - self.split_overlap;
        let mut splits: Vec<Split> = Vec::new();
        let mut idx_start = 0usize;
        let mut page_number = 1usize;
        let mut start = 0usize;

        while start < units.len() {
            let end = (start + self.split_length).min(units.len());
            let window = &units[start..end];
            let text: String = window.concat();

            if window.len() < self.split_threshold && !splits.is_empty() {
                if let Some(last) = splits.last_mut() {
                    last.text.push_str(&text);
                }
            } else if !text.is_empty() {
                splits.push(Split {
                    text,
                    page_number,
                    idx_start,
                });
            }

            let processed = &window[..step.min(window.len())];
            idx_start += processed.iter().map(|u| u.len()).sum::<usize>();
            page_number += match self.split_by {
                SplitBy::Page => processed.len(),
                _ => processed.iter().map(|u| u.matches(PAGE_BREAK).count()).sum(),
            };

            if start + self.split_length >= units.len() {
                break;
            }
            start += step;
        }

        splits
    }

    /// Split one document. Each split inherits the metadata and records where it came from.
    pub fn split(&self, document: &Document) -> Vec<Document> {
        let units = self.split_by.units(&document.content);
        self.concatenate_units(&units)
            .into_iter()
            .enumerate()
            .map(|(split_id, split)| {
                let mut meta = document.meta.clone();
                meta.insert("source_id".to_string(), document.id.clone().into());
                meta.insert("page_number".to_string(), split.page_number.into());
                meta.insert("split_id".to_string(), split_id.into());
                meta.insert("split_idx_start".to_string(), split.idx_start.into());
                Document::new(split.text, meta)
            })
            .collect()
    }
}

#[async_trait]
impl Stage for DocumentSplitter {
    fn type_name(&self) -> &'static str {
        "DocumentSplitter"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::required("documents", PortType::Documents)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::required("documents", PortType::Documents)]
    }

    async fn run(&self, mut inputs: PortValues) -> Result<PortValues> {
        let documents = inputs.take_documents("documents")?;
        let mut splits = Vec::new();
        for document in &documents {
            if document.content.is_empty() {
                tracing::warn!("Document {} has no content, skipping split", document.id);
                continue;
            }
            splits.extend(self.split(document));
        }
        tracing::info!(
            "Split {} documents into {} chunks ({:?}, length {}, overlap {})",
            documents.len(),
            splits.len(),
            self.split_by,
            self.split_length,
            self.split_overlap
        );
        Ok(PortValues::new().with("documents", PortValue::Documents(splits)))
    }
}
