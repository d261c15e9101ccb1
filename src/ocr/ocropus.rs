//! OCRopus engine adapter.
//!
//! OCRopus is driven through `ocroscript`. Releases from 0.3 on ship the
//! `recognize` script and emit character boxes; older ones only have
//! `rec_test`.

use std::io::Read;
use std::path::Path;
use std::process::Stdio;

use tracing::debug;

use super::{tesseract, EngineError, Languages, OcrEngine, Recognition, LANGUAGE_ENV};
use crate::ipc::{self, Subprocess};

const ENGINE_NAME: &str = "ocropus";

/// Scripts to try, newest first.
const SCRIPT_NAMES: [&str; 2] = ["recognize", "rec_test"];

/// What `ocroscript <script>` prints when the script exists.
const USAGE_PREFIX: &[u8] = b"Usage: ";

/// OCRopus via `ocroscript`.
#[derive(Debug, Clone)]
pub struct Ocropus {
    program: String,
    script_name: &'static str,
    has_charboxes: bool,
    /// Tesseract supplies OCRopus's language data and language list.
    tesseract: String,
}

impl Ocropus {
    /// Find an installed OCRopus and work out which version it is.
    pub fn probe(program: &str, tesseract: &str) -> Result<Self, EngineError> {
        for script_name in SCRIPT_NAMES {
            let mut cmd = ipc::command(program).map_err(|_| EngineError::NotFound(ENGINE_NAME))?;
            cmd.arg(script_name)
                .env("LC_ALL", "C")
                .env("LANG", "C")
                .stderr(Stdio::null());
            let mut child =
                Subprocess::spawn(cmd).map_err(|_| EngineError::NotFound(ENGINE_NAME))?;

            let mut prefix = Vec::with_capacity(USAGE_PREFIX.len());
            let read = (&mut child)
                .take(USAGE_PREFIX.len() as u64)
                .read_to_end(&mut prefix);
            // The usage message comes with a non-zero exit status.
            let _ = child.wait_status();

            if read.is_ok() && prefix == USAGE_PREFIX {
                debug!("Found OCRopus with script {}", script_name);
                return Ok(Self {
                    program: program.to_string(),
                    script_name,
                    has_charboxes: script_name == "recognize",
                    tesseract: tesseract.to_string(),
                });
            }
        }
        Err(EngineError::NotFound(ENGINE_NAME))
    }
}

impl OcrEngine for Ocropus {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn has_charboxes(&self) -> bool {
        self.has_charboxes
    }

    fn recognize(&self, image: &Path, language: Option<&str>) -> Result<Recognition, EngineError> {
        let mut cmd = ipc::command(&self.program)?;
        cmd.arg(self.script_name).arg(image);
        if let Some(language) = language {
            cmd.env(LANGUAGE_ENV, language);
        }
        Ok(Recognition::from_process(Subprocess::spawn(cmd)?))
    }

    fn list_languages(&self) -> Result<Languages, EngineError> {
        tesseract::list_languages(&self.tesseract, ENGINE_NAME)
    }
}
