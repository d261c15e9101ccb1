//! DjVu document access and editing.
//!
//! The pipeline never decodes DjVu itself. It talks to a [`DocumentCodec`]
//! that can open a document, enumerate its pages, and render a page's
//! foreground mask as a 1-bit bitmap, and to a [`ScriptEditor`] that applies
//! `djvused` scripts. The production implementations shell out to DjVuLibre.

mod djvulibre;
mod sed;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ipc::ProcessError;

pub use djvulibre::{DjVuLibre, DjVuLibreDocument};
pub use sed::{validate_file_id, Djvused, EditScript, ScriptEditor, ScriptError};

/// Errors from the document codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The page has no image suitable for OCR.
    #[error("No image suitable for OCR")]
    NotAvailable,

    #[error("Unable to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("Malformed bitmap: {0}")]
    Bitmap(String),

    #[error(transparent)]
    Tool(#[from] ProcessError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Page rotation, counter-clockwise, as stored in the page's INFO chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    /// Whether the rendered page has width and height swapped.
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// One page of an open document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    /// 0-based position in the document.
    pub index: usize,
    /// Component id used by `djvused select`.
    pub file_id: String,
    pub rotation: Rotation,
}

/// A decoded page, ready to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageJob {
    pub index: usize,
    /// Rendered width (after rotation).
    pub width: u32,
    /// Rendered height (after rotation).
    pub height: u32,
    pub rotation: Rotation,
}

/// Packed 1-bit bitmap: rows top to bottom, most significant bit first,
/// each row padded to a whole byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, CodecError> {
        let expected = Self::row_bytes_for(width) * height as usize;
        if width == 0 || height == 0 {
            return Err(CodecError::NotAvailable);
        }
        if data.len() != expected {
            return Err(CodecError::Bitmap(format!(
                "{}x{} bitmap needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    fn row_bytes_for(width: u32) -> usize {
        (width as usize).div_ceil(8)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Opens documents.
pub trait DocumentCodec {
    fn open(&self, path: &Path) -> Result<Box<dyn Document>, CodecError>;
}

/// An open multi-page document.
pub trait Document {
    /// Pages in document order.
    fn pages(&self) -> &[PageInfo];

    /// Decode a page and report its rendered size.
    fn decode(&self, page: &PageInfo) -> Result<PageJob, CodecError>;

    /// Render the foreground mask of a decoded page at its native size.
    ///
    /// Returns [`CodecError::NotAvailable`] when the page has no mask to OCR.
    fn render_mask(&self, job: &PageJob) -> Result<Bitmap, CodecError>;

    /// Write a bundled copy of the document to `dest`.
    /// `keep` lists the 0-based pages to retain; `None` keeps every page.
    fn save_bundled(&self, dest: &Path, keep: Option<&[usize]>) -> Result<(), CodecError>;

    /// Write an indirect copy of the document whose index file is `index`.
    /// `scratch` is a directory for intermediate files.
    fn save_indirect(
        &self,
        index: &Path,
        keep: Option<&[usize]>,
        scratch: &Path,
    ) -> Result<(), CodecError>;
}
