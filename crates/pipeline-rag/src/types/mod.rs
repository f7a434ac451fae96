//! Core types for the RAG system

pub mod document;

pub use document::{Document, FileType, Meta};
