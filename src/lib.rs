//! ocrodjvu - add a hidden OCR text layer to scanned DjVu documents.
//!
//! Each selected page is rendered to a bitmap, recognized by an external OCR
//! engine, converted from hOCR to a DjVu text zone, and written into a
//! `djvused` edit script. An [`output::OutputStrategy`] then decides how that
//! script is committed back to storage.
//!
//! External collaborators sit behind traits so the pipeline can be driven by
//! the DjVuLibre command-line tools in production and by fakes in tests:
//!
//! - [`djvu::DocumentCodec`] / [`djvu::Document`]: decode, enumerate and render pages
//! - [`ocr::OcrEngine`]: recognize one bitmap, list languages
//! - [`text::TextExtractor`]: turn recognition markup into positioned text
//! - [`djvu::ScriptEditor`]: apply an edit script to a document in place

pub mod cli;
pub mod config;
pub mod djvu;
pub mod ipc;
pub mod ocr;
pub mod output;
pub mod pages;
pub mod pipeline;
pub mod text;

pub use config::{Config, ConfigError, Settings, ToolPaths};
pub use output::{OutputStrategy, SaveError, SaveRequest};
pub use pages::{PageRange, PageSelection, SelectionError};
pub use pipeline::{Collaborators, Pipeline, PipelineError, RunState, RunSummary};
