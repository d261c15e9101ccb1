//! The OCR pipeline: one forward pass over a document.
//!
//! ```text
//! Idle -> WorkspaceReady -> EngineReady -> ProcessingPages
//!      -> ScriptFlushed -> Saved -> Closed
//! ```
//!
//! [`Pipeline::new`] creates the workspace, [`Pipeline::process`] runs every
//! other step up to `Saved`, and [`Pipeline::close`] releases the workspace.
//! Close the pipeline even when processing fails; dropping it instead still
//! removes a scoped workspace but cannot report errors.

mod page;
mod workspace;

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use indicatif::ProgressBar;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, ToolPaths};
use crate::djvu::{CodecError, DjVuLibre, Djvused, DocumentCodec, EditScript, ScriptEditor, ScriptError};
use crate::ocr::{EngineError, EngineProbe, SystemEngines};
use crate::output::{SaveError, SaveRequest};
use crate::pages::SelectionError;
use crate::text::{HocrExtractor, TextExtractor};

pub use page::{write_pbm, PageError, PageProcessor};
pub use workspace::{ScratchFile, Workspace};

/// Name of the edit script inside the workspace.
pub const SCRIPT_FILE_NAME: &str = "ocrodjvu.djvused";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unable to create temporary workspace: {0}")]
    Workspace(#[source] io::Error),

    #[error("Pipeline cannot {action} in state {state:?}")]
    State {
        action: &'static str,
        state: RunState,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Where a run is. Runs only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunState {
    Idle,
    WorkspaceReady,
    EngineReady,
    ProcessingPages,
    ScriptFlushed,
    Saved,
    Closed,
}

impl RunState {
    fn advance(&mut self, next: RunState) {
        debug_assert!(next > *self, "run state moved backwards: {:?} -> {:?}", self, next);
        debug!("Pipeline state {:?} -> {:?}", self, next);
        *self = next;
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Pages whose text was recognized.
    pub pages_processed: usize,
    /// Pages skipped for lack of an image to OCR.
    pub pages_skipped: usize,
}

/// The external pieces a run talks to.
pub struct Collaborators {
    pub codec: Box<dyn DocumentCodec>,
    pub engines: Box<dyn EngineProbe>,
    pub extractor: Box<dyn TextExtractor>,
    pub editor: Box<dyn ScriptEditor>,
}

impl Collaborators {
    /// DjVuLibre, the installed OCR engines, and hOCR extraction.
    pub fn djvulibre(tools: &ToolPaths) -> Self {
        Self {
            codec: Box::new(DjVuLibre::new(tools.clone())),
            engines: Box::new(SystemEngines::new(tools.clone())),
            extractor: Box::new(HocrExtractor::new()),
            editor: Box::new(Djvused::new(tools.djvused.clone())),
        }
    }
}

pub struct Pipeline {
    config: Config,
    collaborators: Collaborators,
    workspace: Workspace,
    state: RunState,
    progress: ProgressBar,
}

impl Pipeline {
    /// Set up a run, creating its workspace.
    pub fn new(config: &Config, collaborators: Collaborators) -> Result<Self, PipelineError> {
        let mut state = RunState::Idle;
        let workspace = Workspace::create(config.debug).map_err(PipelineError::Workspace)?;
        state.advance(RunState::WorkspaceReady);
        Ok(Self {
            config: config.clone(),
            collaborators,
            workspace,
            state,
            progress: ProgressBar::hidden(),
        })
    }

    /// Report page progress on `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// OCR the selected pages and commit the result with the configured strategy.
    pub fn process(&mut self) -> Result<RunSummary, PipelineError> {
        let Pipeline {
            config,
            collaborators,
            workspace,
            state,
            progress,
        } = self;
        if *state != RunState::WorkspaceReady {
            return Err(PipelineError::State {
                action: "process",
                state: *state,
            });
        }

        let engine = collaborators.engines.probe(config.engine)?;
        info!("Using OCR engine {}", engine.name());
        state.advance(RunState::EngineReady);

        let document = collaborators.codec.open(&config.document)?;
        let selected = config.pages.resolve(document.pages().len())?;
        state.advance(RunState::ProcessingPages);

        info!("Processing {}:", config.document.display());
        progress.set_length(selected.len() as u64);
        progress.set_message(format!("Processing {}", config.document.display()));

        let processor = PageProcessor::new(
            engine.as_ref(),
            collaborators.extractor.as_ref(),
            workspace,
            config.language.as_deref(),
            config.debug,
        );
        let mut summary = RunSummary::default();
        let mut script_file = workspace.file(SCRIPT_FILE_NAME)?;
        {
            let mut script = EditScript::new(BufWriter::new(&mut script_file));
            if config.clear_text {
                script.remove_text()?;
            }
            for &index in &selected {
                let page = &document.pages()[index];
                info!("- Page #{}", index + 1);
                progress.set_message(format!("Page #{}", index + 1));

                script.begin_page(&page.file_id)?;
                match processor.process(document.as_ref(), page) {
                    Ok(text) => {
                        script.write_text(&text)?;
                        summary.pages_processed += 1;
                    }
                    Err(e) if e.is_not_available() => {
                        warn!("No image suitable for OCR.");
                        summary.pages_skipped += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
                script.end_page()?;
                progress.inc(1);
            }
            script.finish()?;
        }
        script_file.flush()?;
        progress.finish_and_clear();
        state.advance(RunState::ScriptFlushed);

        // Never hold the document open while an external tool rewrites it.
        let document = if config.strategy.in_place() {
            drop(document);
            None
        } else {
            Some(document)
        };
        let keep = config.ocr_only.then_some(selected.as_slice());
        config.strategy.save(&SaveRequest {
            document: document.as_deref(),
            pages: keep,
            target: &config.document,
            script: script_file.path(),
            editor: collaborators.editor.as_ref(),
            scratch: workspace.path(),
        })?;
        state.advance(RunState::Saved);

        info!(
            "{} pages processed, {} skipped ({})",
            summary.pages_processed,
            summary.pages_skipped,
            config.strategy.name()
        );
        Ok(summary)
    }

    /// Release the workspace. Returns its path if it was kept for inspection.
    pub fn close(mut self) -> Result<Option<PathBuf>, PipelineError> {
        self.progress.finish_and_clear();
        self.state.advance(RunState::Closed);
        let retained = self.workspace.close()?;
        if let Some(dir) = &retained {
            debug!("Retained workspace {}", dir.display());
        }
        Ok(retained)
    }
}
