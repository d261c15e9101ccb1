//! `djvused` edit scripts.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::ipc::{self, ProcessError};
use crate::text::TextZone;

/// Characters that must never appear in a component id written to a script.
static FORBIDDEN_ID_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[/\\\s]").unwrap());

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("I refuse to process this file due to security concerns")]
    SecurityConcern,

    #[error("Unable to resolve {path}: {source}")]
    Path { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Tool(#[from] ProcessError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Reject component ids that could smuggle path separators or extra
/// `djvused` commands into a script.
pub fn validate_file_id(id: &str) -> Result<&str, ScriptError> {
    if FORBIDDEN_ID_CHARS.is_match(id) {
        return Err(ScriptError::SecurityConcern);
    }
    Ok(id)
}

/// Append-only writer for a `djvused` script that replaces hidden text.
///
/// Each page becomes one block:
///
/// ```text
/// select <id>
/// set-txt
/// <text zone, possibly empty>
/// .
///
/// ```
pub struct EditScript<W: Write> {
    out: W,
    in_page: bool,
}

impl<W: Write> EditScript<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            in_page: false,
        }
    }

    /// Remove all existing hidden text from the document.
    pub fn remove_text(&mut self) -> Result<(), ScriptError> {
        self.out.write_all(b"remove-txt\n")?;
        Ok(())
    }

    /// Start the block for one page.
    pub fn begin_page(&mut self, file_id: &str) -> Result<(), ScriptError> {
        let file_id = validate_file_id(file_id)?;
        write!(self.out, "select {}\nset-txt\n", file_id)?;
        self.in_page = true;
        Ok(())
    }

    /// Write the page's text zone. Omitting this leaves the page's text empty.
    pub fn write_text(&mut self, text: &TextZone) -> Result<(), ScriptError> {
        debug_assert!(self.in_page, "write_text outside a page block");
        text.write_sexpr(&mut self.out)?;
        Ok(())
    }

    /// Close the current page block.
    pub fn end_page(&mut self) -> Result<(), ScriptError> {
        self.out.write_all(b"\n.\n\n")?;
        self.in_page = false;
        Ok(())
    }

    /// Flush everything written and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W, ScriptError> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Applies an edit script to a document file in place.
pub trait ScriptEditor {
    fn apply(&self, script: &Path, target: &Path) -> Result<(), ScriptError>;
}

/// Runs `djvused -s -f <script> <target>`.
#[derive(Debug, Clone)]
pub struct Djvused {
    program: String,
}

impl Djvused {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

fn canonical(path: &Path) -> Result<PathBuf, ScriptError> {
    path.canonicalize().map_err(|source| ScriptError::Path {
        path: path.to_path_buf(),
        source,
    })
}

impl ScriptEditor for Djvused {
    fn apply(&self, script: &Path, target: &Path) -> Result<(), ScriptError> {
        let script = canonical(script)?;
        let target = canonical(target)?;
        debug!("Applying {} to {}", script.display(), target.display());

        let mut cmd = ipc::command(&self.program)?;
        cmd.arg("-s").arg("-f").arg(&script).arg(&target);
        ipc::run_checked(cmd)?;
        Ok(())
    }
}
