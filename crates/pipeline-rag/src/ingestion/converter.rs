//! Source file to document conversion (PDF, plain text, markdown)

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::config::ConverterConfig;
use crate::error::{Error, Result};
use crate::pipeline::{PortSpec, PortType, PortValue, PortValues, Stage};
use crate::types::{Document, FileType, Meta};

/// Page separator inside converted content
pub const PAGE_BREAK: char = '\x0c';

/// Typographic characters PDF fonts emit, mapped to plain text
const PDF_CHAR_REPLACEMENTS: &[(char, &str)] = &[
    ('\u{2010}', "-"),
    ('\u{2011}', "-"),
    ('\u{2012}', "-"),
    ('\u{2013}', "-"),
    ('\u{2014}', "--"),
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201A}', "'"),
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{201E}', "\""),
    ('\u{2022}', "* "),
    ('\u{2026}', "..."),
    ('\u{2212}', "-"),
    ('\u{00A0}', " "),
    ('\u{2002}', " "),
    ('\u{2003}', " "),
    ('\u{2009}', " "),
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
    ('\0', ""),
];

/// Glyph names leaked by fonts without a ToUnicode map, e.g. "(uni2019)" or "uni2019"
const GLYPH_NAME_PATTERN: &str = r"[(<]?\buni([0-9A-F]{4})[)>]?";

/// Reads source files into one document each
pub struct FileConverter {
    skip_unreadable: bool,
    glyph_names: Regex,
}

impl FileConverter {
    /// Create a converter
    pub fn new(config: &ConverterConfig) -> Result<Self> {
        let glyph_names = Regex::new(GLYPH_NAME_PATTERN)
            .map_err(|e| Error::internal(format!("glyph name pattern: {}", e)))?;
        Ok(Self {
            skip_unreadable: config.skip_unreadable,
            glyph_names,
        })
    }

    /// Replace leaked glyph names and typographic characters with plain text
    pub fn cleanup_pdf_text(&self, text: &str) -> String {
        let resolved = self.glyph_names.replace_all(text, |caps: &regex::Captures<'_>| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        });

        let mut result = String::with_capacity(resolved.len());
        for c in resolved.chars() {
            match PDF_CHAR_REPLACEMENTS.iter().find(|(from, _)| *from == c) {
                Some((_, to)) => result.push_str(to),
                None => result.push(c),
            }
        }
        result
    }

    /// Convert a single file
    pub async fn convert(&self, path: &Path) -> Result<Document> {
        let filename = path.display().to_string();
        let file_type = FileType::from_path(path);
        if !file_type.is_supported() {
            return Err(Error::UnsupportedFileType(filename));
        }

        let data = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(filename.clone())
            } else {
                Error::file_parse(&filename, e.to_string())
            }
        })?;

        let content = match file_type {
            FileType::Pdf => self.extract_pdf_text(&filename, &data)?,
            _ => String::from_utf8_lossy(&data).into_owned(),
        };

        let page_count = Document::page_count(&content);
        let mut meta = Meta::new();
        meta.insert("file_path".to_string(), filename.clone().into());
        meta.insert("file_type".to_string(), serde_json::to_value(file_type)?);
        meta.insert("page_count".to_string(), page_count.into());
        let document = Document::new(content, meta);

        tracing::info!(
            "Converted {} ({}, {} pages, {} chars)",
            filename,
            file_type.display_name(),
            page_count,
            document.content.len()
        );
        Ok(document)
    }

    /// Convert every source in order
    pub async fn convert_all(&self, sources: &[PathBuf]) -> Result<Vec<Document>> {
        let mut documents = Vec::with_capacity(sources.len());
        for path in sources {
            match self.convert(path).await {
                Ok(doc) => documents.push(doc),
                Err(e) if self.skip_unreadable => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(documents)
    }

    /// Per-page text via lopdf, whole-document pdf-extract as fallback
    fn extract_pdf_text(&self, filename: &str, data: &[u8]) -> Result<String> {
        let per_page = match lopdf::Document::load_mem(data) {
            Ok(doc) => {
                let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
                let mut texts = Vec::with_capacity(pages.len());
                for page in &pages {
                    match doc.extract_text(&[*page]) {
                        Ok(text) => texts.push(text),
                        Err(e) => {
                            tracing::debug!("Could not extract page {} of {}: {}", page, filename, e);
                            texts.push(String::new());
                        }
                    }
                }
                Some(texts)
            }
            Err(e) => {
                tracing::warn!("lopdf could not load {}: {}, trying pdf-extract", filename, e);
                None
            }
        };

        let text = match per_page {
            Some(pages) if pages.iter().any(|p| !p.trim().is_empty()) => pages
                .iter()
                .map(|p| self.cleanup_pdf_text(p))
                .collect::<Vec<_>>()
                .join(&PAGE_BREAK.to_string()),
            _ => {
                let text = pdf_extract::extract_text_from_mem(data)
                    .map_err(|e| Error::file_parse(filename, format!("Failed to extract PDF text: {}", e)))?;
                self.cleanup_pdf_text(&text)
            }
        };

        if text.trim_matches(|c: char| c.is_whitespace() || c == PAGE_BREAK).is_empty() {
            return Err(Error::file_parse(
                filename,
                "No text content could be extracted from PDF (image-based or encrypted?)",
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl Stage for FileConverter {
    fn type_name(&self) -> &'static str {
        "FileConverter"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::required("sources", PortType::Sources)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::required("documents", PortType::Documents)]
    }

    async fn run(&self, mut inputs: PortValues) -> Result<PortValues> {
        let sources = inputs.take_sources("sources")?;
        let documents = self.convert_all(&sources).await?;
        Ok(PortValues::new().with("documents", PortValue::Documents(documents)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn converter(skip_unreadable: bool) -> FileConverter {
        FileConverter::new(&ConverterConfig { skip_unreadable }).unwrap()
    }

    #[test]
    fn test_cleanup_resolves_glyph_names_and_ligatures() {
        let text = "It(uni2019)s a \u{FB01}ne o\u{FB03}ce \u{201C}quote\u{201D}\0";
        assert_eq!(converter(false).cleanup_pdf_text(text), "It's a fine office \"quote\"");
    }

    #[test]
    fn test_cleanup_keeps_page_breaks() {
        assert_eq!(converter(false).cleanup_pdf_text("one\x0ctwo"), "one\x0ctwo");
    }

    #[tokio::test]
    async fn test_text_file_becomes_one_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "first line\nsecond line\x0cpage two").unwrap();

        let doc = converter(false).convert(&path).await.unwrap();
        assert_eq!(doc.content, "first line\nsecond line\x0cpage two");
        assert_eq!(doc.meta["file_type"], "txt");
        assert_eq!(doc.meta["page_count"], 2);
        assert_eq!(doc.meta["file_path"], path.display().to_string());
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sheet.xlsx");
        std::fs::write(&path, b"PK").unwrap();
        assert!(matches!(
            converter(false).convert(&path).await,
            Err(Error::UnsupportedFileType(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file_fails_or_is_skipped() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.md");
        std::fs::write(&good, "# Title").unwrap();
        let sources = vec![dir.path().join("missing.txt"), good];

        assert!(matches!(
            converter(false).convert_all(&sources).await,
            Err(Error::NotFound(_))
        ));

        let docs = converter(true).convert_all(&sources).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "# Title");
    }

    #[tokio::test]
    async fn test_stage_contract() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();

        let inputs = PortValues::new().with("sources", PortValue::Sources(vec![path]));
        let mut outputs = converter(false).run(inputs).await.unwrap();
        let docs = outputs.take_documents("documents").unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_pdf_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();
        assert!(matches!(
            converter(false).convert(&path).await,
            Err(Error::FileParse { .. })
        ));
    }
}
