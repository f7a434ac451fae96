//! Ingestion stages: conversion, cleaning, splitting and writing

mod cleaner;
mod converter;
mod splitter;
mod writer;

pub use cleaner::DocumentCleaner;
pub use converter::{FileConverter, PAGE_BREAK};
pub use splitter::{DocumentSplitter, SplitBy};
pub use writer::DocumentWriter;
