//! Output strategies: how a finished edit script is committed.
//!
//! | Strategy | Effect |
//! |---|---|
//! | `Bundled` | write a new bundled document, then edit it in place |
//! | `Indirect` | write a new indirect document, then edit it in place |
//! | `Script` | copy the edit script out; no document is touched |
//! | `InPlace` | edit the original document |
//! | `DryRun` | nothing |
//!
//! New documents are written completely before any script is applied, and
//! only ever to the new document's path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::djvu::{CodecError, Document, ScriptEditor, ScriptError};

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("No document available to save")]
    DocumentRequired,

    #[error("Unable to copy edit script to {path}: {source}")]
    Copy { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// The one strategy selected for a run. Paths are absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputStrategy {
    /// Save results as a bundled multi-page document.
    Bundled(PathBuf),
    /// Save results as an indirect multi-page document.
    Indirect(PathBuf),
    /// Save a djvused script with the results.
    Script(PathBuf),
    /// Save results in place.
    InPlace,
    /// Don't change any files.
    DryRun,
}

/// Everything a strategy may need to commit a run.
#[derive(Clone, Copy)]
pub struct SaveRequest<'a> {
    /// The open source document; `None` once it has been released.
    pub document: Option<&'a dyn Document>,
    /// 0-based pages to keep in a new document; `None` keeps all.
    pub pages: Option<&'a [usize]>,
    /// Document the script applies to.
    pub target: &'a Path,
    /// Flushed edit script.
    pub script: &'a Path,
    pub editor: &'a dyn ScriptEditor,
    /// Directory for intermediate files.
    pub scratch: &'a Path,
}

impl OutputStrategy {
    /// Whether this strategy edits the source document itself.
    pub fn in_place(&self) -> bool {
        matches!(self, OutputStrategy::InPlace)
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputStrategy::Bundled(_) => "bundled",
            OutputStrategy::Indirect(_) => "indirect",
            OutputStrategy::Script(_) => "script",
            OutputStrategy::InPlace => "in-place",
            OutputStrategy::DryRun => "dry-run",
        }
    }

    pub fn save(&self, request: &SaveRequest<'_>) -> Result<(), SaveError> {
        match self {
            OutputStrategy::Bundled(dest) => {
                let document = request.document.ok_or(SaveError::DocumentRequired)?;
                document.save_bundled(dest, request.pages)?;
                info!("Wrote bundled document {}", dest.display());
                OutputStrategy::InPlace.save(&SaveRequest {
                    document: None,
                    target: dest,
                    ..*request
                })
            }
            OutputStrategy::Indirect(index) => {
                let document = request.document.ok_or(SaveError::DocumentRequired)?;
                document.save_indirect(index, request.pages, request.scratch)?;
                info!("Wrote indirect document {}", index.display());
                OutputStrategy::InPlace.save(&SaveRequest {
                    document: None,
                    target: index,
                    ..*request
                })
            }
            OutputStrategy::Script(dest) => {
                fs::copy(request.script, dest).map_err(|source| SaveError::Copy {
                    path: dest.clone(),
                    source,
                })?;
                info!("Wrote edit script {}", dest.display());
                Ok(())
            }
            OutputStrategy::InPlace => {
                request.editor.apply(request.script, request.target)?;
                info!("Updated {}", request.target.display());
                Ok(())
            }
            OutputStrategy::DryRun => Ok(()),
        }
    }
}
