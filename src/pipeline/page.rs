//! Single-page OCR: render, recognize, extract.

use std::io::{self, Write};

use thiserror::Error;
use tracing::debug;

use super::workspace::Workspace;
use crate::djvu::{Bitmap, CodecError, Document, PageInfo};
use crate::ocr::{EngineError, OcrEngine};
use crate::text::{ExtractOptions, ExtractionError, TextExtractor, TextZone};

#[derive(Debug, Error)]
pub enum PageError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("Expected exactly one page of recognized text, got {0}")]
    UnexpectedPageCount(usize),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl PageError {
    /// The page has no image to OCR. The run skips it and carries on.
    pub fn is_not_available(&self) -> bool {
        matches!(self, PageError::Codec(CodecError::NotAvailable))
    }
}

/// Runs OCR on one page at a time, keeping its files in the run's workspace.
pub struct PageProcessor<'a> {
    engine: &'a dyn OcrEngine,
    extractor: &'a dyn TextExtractor,
    workspace: &'a Workspace,
    language: Option<&'a str>,
    debug: bool,
}

impl<'a> PageProcessor<'a> {
    pub fn new(
        engine: &'a dyn OcrEngine,
        extractor: &'a dyn TextExtractor,
        workspace: &'a Workspace,
        language: Option<&'a str>,
        debug: bool,
    ) -> Self {
        Self {
            engine,
            extractor,
            workspace,
            language,
            debug,
        }
    }

    /// Recognize one page and return its text zone in DjVu coordinates.
    pub fn process(&self, document: &dyn Document, page: &PageInfo) -> Result<TextZone, PageError> {
        let job = document.decode(page)?;
        let bitmap = document.render_mask(&job)?;

        let mut image = self.workspace.file(&format!("{:06}.pbm", page.index))?;
        write_pbm(&mut image, &bitmap)?;
        image.flush()?;
        debug!(
            "Rendered page {} ({}x{}) to {}",
            page.index + 1,
            bitmap.width(),
            bitmap.height(),
            image.path().display()
        );

        let options = ExtractOptions {
            rotation: job.rotation,
            charboxes: self.engine.has_charboxes(),
        };
        let mut recognition = self.engine.recognize(image.path(), self.language)?;

        let zones = if self.debug {
            let mut markup = self.workspace.file(&format!("{:06}.html", page.index))?;
            io::copy(&mut recognition, &mut markup)?;
            recognition.finish()?;
            markup.flush_and_rewind()?;
            self.extractor.extract(&mut markup, &options)?
        } else {
            let zones = self.extractor.extract(&mut recognition, &options)?;
            recognition.finish()?;
            zones
        };

        let mut zones = zones.into_iter();
        match (zones.next(), zones.len()) {
            (Some(zone), 0) => Ok(zone),
            (None, _) => Err(PageError::UnexpectedPageCount(0)),
            (Some(_), rest) => Err(PageError::UnexpectedPageCount(rest + 1)),
        }
    }
}

/// Write a raw PBM (`P4`) image.
pub fn write_pbm<W: Write + ?Sized>(out: &mut W, bitmap: &Bitmap) -> io::Result<()> {
    writeln!(out, "P4 {} {}", bitmap.width(), bitmap.height())?;
    out.write_all(bitmap.data())
}
