//! OCR engine adapters.
//!
//! Engines are external programs. Constructing an adapter probes for the
//! program; recognition returns a [`Recognition`] guard that streams the
//! engine's hOCR output and reaps the process however the caller leaves.
//!
//! - **OCRopus** (`ocroscript`): the default engine
//! - **Tesseract**: hOCR output via `tesseract <image> stdout hocr`
//!
//! Both engines take their recognition language from the `tesslanguage`
//! environment variable and share Tesseract's language list.

mod ocropus;
mod tesseract;

use std::fmt;
use std::io::{self, Read};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::config::ToolPaths;
use crate::ipc::{ProcessError, Subprocess};

pub use ocropus::Ocropus;
pub use tesseract::Tesseract;

/// Environment variable carrying the recognition language to the engine.
pub const LANGUAGE_ENV: &str = "tesslanguage";

/// Errors from OCR engines.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("OCR engine not found: {0}")]
    NotFound(&'static str),

    #[error("Unable to determine list of languages supported by {0}")]
    UnknownLanguageList(&'static str),

    #[error("OCR engine failed: {0}")]
    Process(#[from] ProcessError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Available engine types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// OCRopus via ocroscript
    #[default]
    Ocropus,
    /// Tesseract with hOCR output
    Tesseract,
}

impl EngineKind {
    pub const ALL: [EngineKind; 2] = [EngineKind::Ocropus, EngineKind::Tesseract];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Ocropus => "ocropus",
            EngineKind::Tesseract => "tesseract",
        }
    }

    /// Probe for the engine and build its adapter.
    pub fn probe(&self, tools: &ToolPaths) -> Result<Box<dyn OcrEngine>, EngineError> {
        match self {
            EngineKind::Ocropus => Ok(Box::new(Ocropus::probe(
                &tools.ocroscript,
                &tools.tesseract,
            )?)),
            EngineKind::Tesseract => Ok(Box::new(Tesseract::probe(&tools.tesseract)?)),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An installed OCR engine.
pub trait OcrEngine {
    fn name(&self) -> &'static str;

    /// Whether the engine's markup carries per-character boxes.
    fn has_charboxes(&self) -> bool;

    /// Start recognizing one page image.
    fn recognize(&self, image: &Path, language: Option<&str>) -> Result<Recognition, EngineError>;

    /// Languages the engine can recognize.
    fn list_languages(&self) -> Result<Languages, EngineError>;
}

/// Builds engine adapters. The pipeline probes through this so tests can
/// substitute engines that need no external programs.
pub trait EngineProbe {
    fn probe(&self, kind: EngineKind) -> Result<Box<dyn OcrEngine>, EngineError>;
}

/// Probes the real engines using configured program paths.
#[derive(Debug, Clone, Default)]
pub struct SystemEngines {
    tools: ToolPaths,
}

impl SystemEngines {
    pub fn new(tools: ToolPaths) -> Self {
        Self { tools }
    }
}

impl EngineProbe for SystemEngines {
    fn probe(&self, kind: EngineKind) -> Result<Box<dyn OcrEngine>, EngineError> {
        kind.probe(&self.tools)
    }
}

/// Recognition output for one page.
///
/// Read it to get the markup, then call [`Recognition::finish`] to check
/// how the engine exited. Dropping it unfinished still waits for the engine.
pub struct Recognition {
    // Declared before `process` so the pipe closes before the child is reaped.
    reader: Box<dyn Read>,
    process: Option<Subprocess>,
}

impl Recognition {
    pub fn from_process(mut process: Subprocess) -> Self {
        let reader: Box<dyn Read> = match process.take_stdout() {
            Some(stdout) => Box::new(stdout),
            None => Box::new(io::empty()),
        };
        Self {
            reader,
            process: Some(process),
        }
    }

    /// Recognition output that is already available, with no process behind it.
    pub fn from_reader(reader: impl Read + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            process: None,
        }
    }

    /// Wait for the engine and fail if it exited unsuccessfully.
    pub fn finish(self) -> Result<(), EngineError> {
        let Recognition { reader, process } = self;
        drop(reader);
        if let Some(process) = process {
            process.wait()?;
        }
        Ok(())
    }
}

impl Read for Recognition {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

/// Language codes reported by an engine, parsed lazily from its listing.
///
/// Iterating consumes the listing; call `list_languages` again to restart.
#[derive(Debug, Clone)]
pub struct Languages {
    listing: String,
    offset: usize,
}

impl Languages {
    pub fn from_listing(listing: impl Into<String>) -> Self {
        Self {
            listing: listing.into(),
            offset: 0,
        }
    }
}

impl Iterator for Languages {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while self.offset < self.listing.len() {
            let rest = &self.listing[self.offset..];
            let (line, advance) = match rest.find('\n') {
                Some(end) => (&rest[..end], end + 1),
                None => (rest, rest.len()),
            };
            self.offset += advance;

            let line = line.trim();
            if line.is_empty() || line.starts_with("List of available languages") {
                continue;
            }
            return Some(line.to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_languages_skip_header_and_blanks() {
        let listing = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\n\ndeu\r\nosd\n";
        let languages: Vec<String> = Languages::from_listing(listing).collect();
        assert_eq!(languages, vec!["eng", "deu", "osd"]);
    }

    #[test]
    fn test_languages_without_trailing_newline() {
        let languages: Vec<String> = Languages::from_listing("eng\npol").collect();
        assert_eq!(languages, vec!["eng", "pol"]);
    }

    #[test]
    fn test_recognition_from_reader() {
        let mut recognition = Recognition::from_reader(io::Cursor::new(b"<html/>".to_vec()));
        let mut markup = String::new();
        recognition.read_to_string(&mut markup).unwrap();
        assert_eq!(markup, "<html/>");
        recognition.finish().unwrap();
    }

    #[test]
    fn test_engine_kind_names() {
        assert_eq!(EngineKind::default(), EngineKind::Ocropus);
        assert_eq!(EngineKind::Tesseract.to_string(), "tesseract");
    }

    #[test]
    fn test_missing_engines_are_not_found() {
        let tools = ToolPaths {
            ocroscript: "ocrodjvu-no-such-ocroscript".to_string(),
            tesseract: "ocrodjvu-no-such-tesseract".to_string(),
            ..ToolPaths::default()
        };
        for kind in EngineKind::ALL {
            assert!(matches!(
                kind.probe(&tools),
                Err(EngineError::NotFound(_))
            ));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_recognition_reaps_process_on_drop() {
        let mut cmd = crate::ipc::command("sh").unwrap();
        cmd.args(["-c", "echo '<html/>'"]);
        let recognition = Recognition::from_process(Subprocess::spawn(cmd).unwrap());
        drop(recognition);
    }

    #[cfg(unix)]
    #[test]
    fn test_recognition_finish_reports_engine_failure() {
        let mut cmd = crate::ipc::command("sh").unwrap();
        cmd.args(["-c", "exit 2"]);
        let recognition = Recognition::from_process(Subprocess::spawn(cmd).unwrap());
        assert!(matches!(
            recognition.finish(),
            Err(EngineError::Process(ProcessError::Failed { .. }))
        ));
    }
}
