//! Tesseract OCR engine adapter.
//!
//! Uses Tesseract via command-line with hOCR output. Tesseract's language
//! list is also what OCRopus reports, since OCRopus recognizes with
//! Tesseract's language data.

use std::path::Path;

use tracing::debug;

use super::{EngineError, Languages, OcrEngine, Recognition, LANGUAGE_ENV};
use crate::ipc::{self, Subprocess};

const ENGINE_NAME: &str = "tesseract";

/// Tesseract with hOCR output.
#[derive(Debug, Clone)]
pub struct Tesseract {
    program: String,
}

impl Tesseract {
    /// Check that `program` is a Tesseract binary.
    pub fn probe(program: &str) -> Result<Self, EngineError> {
        let mut cmd = ipc::command(program).map_err(|_| EngineError::NotFound(ENGINE_NAME))?;
        cmd.arg("--version").env("LC_ALL", "C").env("LANG", "C");
        let output = ipc::run_captured(cmd).map_err(|_| EngineError::NotFound(ENGINE_NAME))?;

        // Older releases print the version banner on stderr.
        let banner = if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        };
        if !banner.starts_with(b"tesseract ") {
            return Err(EngineError::NotFound(ENGINE_NAME));
        }
        debug!(
            "Found {}",
            String::from_utf8_lossy(&banner).lines().next().unwrap_or_default()
        );
        Ok(Self {
            program: program.to_string(),
        })
    }
}

impl OcrEngine for Tesseract {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn has_charboxes(&self) -> bool {
        false
    }

    fn recognize(&self, image: &Path, language: Option<&str>) -> Result<Recognition, EngineError> {
        let mut cmd = ipc::command(&self.program)?;
        cmd.arg(image).arg("stdout");
        if let Some(language) = language {
            cmd.args(["-l", language]).env(LANGUAGE_ENV, language);
        }
        cmd.arg("hocr");
        Ok(Recognition::from_process(Subprocess::spawn(cmd)?))
    }

    fn list_languages(&self) -> Result<Languages, EngineError> {
        list_languages(&self.program, ENGINE_NAME)
    }
}

/// Ask Tesseract for its installed languages on behalf of `engine`.
pub(super) fn list_languages(program: &str, engine: &'static str) -> Result<Languages, EngineError> {
    let unknown = || EngineError::UnknownLanguageList(engine);
    let mut cmd = ipc::command(program).map_err(|_| unknown())?;
    cmd.arg("--list-langs");
    let output = ipc::run_captured(cmd).map_err(|_| unknown())?;
    if !output.status.success() {
        return Err(unknown());
    }
    let listing = if output.stdout.is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    Ok(Languages::from_listing(String::from_utf8_lossy(&listing)))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Write an executable shell script standing in for `tesseract`.
    #[cfg(unix)]
    fn fake_tesseract(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("tesseract");
        std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_probe_missing_program() {
        assert!(matches!(
            Tesseract::probe("ocrodjvu-no-such-tesseract"),
            Err(EngineError::NotFound("tesseract"))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_rejects_other_programs() {
        assert!(matches!(
            Tesseract::probe("true"),
            Err(EngineError::NotFound("tesseract"))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_version_banner_on_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_tesseract(
            &dir,
            r#"case "$1" in
--version) echo "tesseract 5.3.4"; echo " leptonica-1.84.1" ;;
--list-langs) echo "List of available languages (3):"; echo eng; echo ""; echo deu ;;
*) exit 1 ;;
esac
"#,
        );

        let engine = Tesseract::probe(&program).unwrap();
        assert_eq!(engine.name(), "tesseract");
        assert!(!engine.has_charboxes());
        let languages: Vec<String> = engine.list_languages().unwrap().collect();
        assert_eq!(languages, vec!["eng", "deu"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_version_banner_on_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_tesseract(&dir, "echo 'tesseract 3.02.02' >&2\n");
        assert!(Tesseract::probe(&program).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_banner_must_name_tesseract() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_tesseract(&dir, "echo 'cuneiform 1.1'\n");
        assert!(matches!(
            Tesseract::probe(&program),
            Err(EngineError::NotFound("tesseract"))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_language_listing() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_tesseract(
            &dir,
            r#"if [ "$1" = --version ]; then echo "tesseract 5.3.4"; exit 0; fi
echo "List of available languages (1):"
echo eng
exit 1
"#,
        );

        let engine = Tesseract::probe(&program).unwrap();
        assert!(matches!(
            engine.list_languages(),
            Err(EngineError::UnknownLanguageList("tesseract"))
        ));
    }

    #[test]
    fn test_list_languages_missing_program() {
        assert!(matches!(
            list_languages("ocrodjvu-no-such-tesseract", "tesseract"),
            Err(EngineError::UnknownLanguageList("tesseract"))
        ));
    }
}
