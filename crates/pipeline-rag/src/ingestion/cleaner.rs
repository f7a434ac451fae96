//! Text cleanup before splitting: whitespace, empty lines, headers/footers

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;

use crate::config::CleanerConfig;
use crate::error::{Error, Result};
use crate::pipeline::{PortSpec, PortType, PortValue, PortValues, Stage};
use crate::types::Document;

use super::converter::PAGE_BREAK;

/// Characters from the start and end of each page searched for headers/footers
const HEADER_FOOTER_CHARS: usize = 300;
const MIN_NGRAM: usize = 3;
const MAX_NGRAM: usize = 30;

/// Cleans document text page by page
pub struct DocumentCleaner {
    remove_empty_lines: bool,
    remove_extra_whitespaces: bool,
    remove_repeated_substrings: bool,
    remove_substrings: Vec<String>,
    remove_regex: Option<Regex>,
    whitespace: Regex,
}

impl DocumentCleaner {
    /// Create a cleaner; fails if `remove_regex` does not compile
    pub fn new(config: &CleanerConfig) -> Result<Self> {
        let remove_regex = config
            .remove_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::config(format!("cleaner.remove_regex is invalid: {}", e)))?;
        let whitespace = Regex::new(r"\s\s+")
            .map_err(|e| Error::internal(format!("whitespace pattern: {}", e)))?;

        Ok(Self {
            remove_empty_lines: config.remove_empty_lines,
            remove_extra_whitespaces: config.remove_extra_whitespaces,
            remove_repeated_substrings: config.remove_repeated_substrings,
            remove_substrings: config.remove_substrings.clone(),
            remove_regex,
            whitespace,
        })
    }

    /// Clean one text, keeping page breaks in place
    pub fn clean_text(&self, text: &str) -> String {
        let mut text = text.to_string();

        if self.remove_extra_whitespaces {
            text = map_pages(&text, |page| self.whitespace.replace_all(page, " ").trim().to_string());
        }
        if self.remove_empty_lines {
            text = map_pages(&text, |page| {
                page.split('\n')
                    .filter(|line| !line.trim().is_empty())
                    .collect::<Vec<_>>()
                    .join("\n")
            });
        }
        for substring in &self.remove_substrings {
            if !substring.is_empty() {
                text = text.replace(substring.as_str(), "");
            }
        }
        if let Some(re) = &self.remove_regex {
            text = map_pages(&text, |page| re.replace_all(page, "").trim().to_string());
        }
        if self.remove_repeated_substrings {
            text = remove_headers_and_footers(&text);
        }

        text
    }

    /// Clean a document; metadata is kept and the id recomputed
    pub fn clean(&self, document: &Document) -> Document {
        let cleaned = self.clean_text(&document.content);
        Document::new(cleaned, document.meta.clone())
    }
}

fn map_pages(text: &str, f: impl Fn(&str) -> String) -> String {
    text.split(PAGE_BREAK)
        .map(f)
        .collect::<Vec<_>>()
        .join(&PAGE_BREAK.to_string())
}

/// Strip the longest word n-gram shared by the start (then the end) of every inner page.
/// The first and last pages are ignored when searching but cleaned too.
fn remove_headers_and_footers(text: &str) -> String {
    let mut pages: Vec<String> = text.split(PAGE_BREAK).map(str::to_string).collect();
    if pages.len() < 3 {
        return text.to_string();
    }

    let starts: Vec<String> = pages[1..pages.len() - 1]
        .iter()
        .map(|p| p.chars().take(HEADER_FOOTER_CHARS).collect())
        .collect();
    if let Some(header) = longest_common_ngram(&starts) {
        tracing::debug!("Removing repeated header: {:?}", header);
        for page in &mut pages {
            *page = page.replace(&header, "");
        }
    }

    let ends: Vec<String> = pages[1..pages.len() - 1]
        .iter()
        .map(|p| {
            let skip = p.chars().count().saturating_sub(HEADER_FOOTER_CHARS);
            p.chars().skip(skip).collect()
        })
        .collect();
    if let Some(footer) = longest_common_ngram(&ends) {
        tracing::debug!("Removing repeated footer: {:?}", footer);
        for page in &mut pages {
            *page = page.replace(&footer, "");
        }
    }

    pages.join(&PAGE_BREAK.to_string())
}

fn longest_common_ngram(sequences: &[String]) -> Option<String> {
    let mut sets = sequences.iter().filter(|s| !s.is_empty()).map(|s| all_ngrams(s));
    let first = sets.next()?;
    let common = sets.fold(first, |acc, set| acc.intersection(&set).cloned().collect());

    // Longest wins; among equals the lexicographically first, for determinism
    common
        .into_iter()
        .filter(|ngram| !ngram.trim().is_empty())
        .fold(None, |best: Option<String>, ngram| match best {
            Some(b) if b.len() >= ngram.len() => Some(b),
            _ => Some(ngram),
        })
}

/// Word n-grams of `MIN_NGRAM..MAX_NGRAM` words. Newlines and tabs stay attached to the
/// following word so n-grams map back onto the original text.
fn all_ngrams(text: &str) -> BTreeSet<String> {
    let spaced = text.replace('\n', " \n").replace('\t', " \t");
    let words: Vec<&str> = spaced.split(' ').collect();

    let mut ngrams = BTreeSet::new();
    for n in MIN_NGRAM..MAX_NGRAM {
        if n > words.len() {
            break;
        }
        for window in words.windows(n) {
            let ngram = window.join(" ").replace(" \n", "\n").replace(" \t", "\t");
            ngrams.insert(ngram);
        }
    }
    ngrams
}

#[async_trait]
impl Stage for DocumentCleaner {
    fn type_name(&self) -> &'static str {
        "DocumentCleaner"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::required("documents", PortType::Documents)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::required("documents", PortType::Documents)]
    }

    async fn run(&self, mut inputs: PortValues) -> Result<PortValues> {
        let documents = inputs.take_documents("documents")?;
        let cleaned: Vec<Document> = documents.iter().map(|doc| self.clean(doc)).collect();
        tracing::debug!("Cleaned {} documents", cleaned.len());
        Ok(PortValues::new().with("documents", PortValue::Documents(cleaned)))
    }
}
