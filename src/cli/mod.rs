//! Command line interface.

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::config::{absolute_path, Config, ConfigError, Settings, ToolPaths, CONFIG_ENV};
use crate::ocr::{EngineError, EngineKind};
use crate::output::OutputStrategy;
use crate::pages::PageSelection;
use crate::pipeline::{Collaborators, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "ocrodjvu")]
#[command(about = "OCR DjVu documents and store the text as a hidden text layer")]
#[command(version)]
pub struct Cli {
    /// DjVu document to process
    #[arg(required_unless_present_any = ["list_engines", "list_languages"])]
    document: Option<PathBuf>,

    #[command(flatten)]
    output: OutputArgs,

    /// OCR engine to use
    #[arg(long, value_enum)]
    engine: Option<EngineKind>,

    /// Print list of available OCR engines
    #[arg(long)]
    list_engines: bool,

    /// Don't save pages without OCR
    #[arg(long)]
    ocr_only: bool,

    /// Remove existing hidden text
    #[arg(long)]
    clear_text: bool,

    /// Set recognition language
    #[arg(long, env = "OCRODJVU_LANGUAGE")]
    language: Option<String>,

    /// Print list of available languages
    #[arg(long)]
    list_languages: bool,

    /// Pages to process, e.g. 1,3-5,9
    #[arg(short, long, value_name = "PAGES")]
    pages: Option<PageSelection>,

    /// Don't delete intermediate files
    #[arg(short = 'D', long)]
    debug: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Settings file
    #[arg(short, long, env = CONFIG_ENV, value_name = "FILE")]
    config: Option<PathBuf>,
}

/// Output strategy flags. Exactly one must be given.
#[derive(Args, Debug, Default)]
struct OutputArgs {
    /// Save results as a bundled multi-page document
    #[arg(short = 'o', long, value_name = "FILE")]
    save_bundled: Option<PathBuf>,

    /// Save results as an indirect multi-page document
    #[arg(short = 'i', long, value_name = "FILE")]
    save_indirect: Option<PathBuf>,

    /// Save a djvused script with the results
    #[arg(long, value_name = "FILE")]
    save_script: Option<PathBuf>,

    /// Save results in place
    #[arg(long)]
    in_place: bool,

    /// Don't change any files
    #[arg(long)]
    dry_run: bool,
}

impl OutputArgs {
    fn strategy(self) -> Result<OutputStrategy, ConfigError> {
        let mut chosen = Vec::new();
        if let Some(path) = self.save_bundled {
            chosen.push(OutputStrategy::Bundled(absolute_path(&path)?));
        }
        if let Some(path) = self.save_indirect {
            chosen.push(OutputStrategy::Indirect(absolute_path(&path)?));
        }
        if let Some(path) = self.save_script {
            chosen.push(OutputStrategy::Script(absolute_path(&path)?));
        }
        if self.in_place {
            chosen.push(OutputStrategy::InPlace);
        }
        if self.dry_run {
            chosen.push(OutputStrategy::DryRun);
        }
        match <[OutputStrategy; 1]>::try_from(chosen) {
            Ok([strategy]) => Ok(strategy),
            Err(_) => Err(ConfigError::OutputStrategy),
        }
    }
}

/// Check for `-v`/`--verbose` before clap runs, so logging can be set up first.
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

impl Cli {
    /// Combine the command line with settings-file defaults.
    pub fn into_config(self, settings: Settings) -> Result<Config, ConfigError> {
        let strategy = self.output.strategy()?;
        let document = self.document.ok_or(ConfigError::MissingDocument)?;
        Ok(Config {
            document: absolute_path(&document)?,
            strategy,
            engine: self.engine.or(settings.engine).unwrap_or_default(),
            language: self.language.or(settings.language),
            pages: self.pages.unwrap_or_default(),
            ocr_only: self.ocr_only,
            clear_text: self.clear_text,
            debug: self.debug,
            tools: settings.tools,
        })
    }
}

pub fn run() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout and succeed; every usage error exits 1.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let settings = Settings::load(cli.config.as_deref())?;

    if cli.list_engines {
        return cmd_list_engines(&settings.tools);
    }
    if cli.list_languages {
        let kind = cli.engine.or(settings.engine).unwrap_or_default();
        return cmd_list_languages(kind, &settings.tools);
    }

    let config = match cli.into_config(settings) {
        Ok(config) => config,
        Err(e @ (ConfigError::OutputStrategy | ConfigError::MissingDocument)) => {
            let _ = usage_error(e).print();
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };
    cmd_process(&config)
}

/// Report an invalid combination of arguments the way clap reports its own.
fn usage_error(e: ConfigError) -> clap::Error {
    Cli::command().error(ErrorKind::ArgumentConflict, e)
}

fn cmd_list_engines(tools: &ToolPaths) -> anyhow::Result<()> {
    for kind in EngineKind::ALL {
        match kind.probe(tools) {
            Ok(_) => println!("{}", kind),
            Err(EngineError::NotFound(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn cmd_list_languages(kind: EngineKind, tools: &ToolPaths) -> anyhow::Result<()> {
    let engine = kind.probe(tools)?;
    for language in engine.list_languages()? {
        println!("{}", language);
    }
    Ok(())
}

fn cmd_process(config: &Config) -> anyhow::Result<()> {
    let collaborators = Collaborators::djvulibre(&config.tools);
    let mut pipeline = Pipeline::new(config, collaborators)?.with_progress(page_progress());

    let result = pipeline.process();
    let closed = pipeline.close();
    if let Ok(Some(dir)) = &closed {
        eprintln!(
            "Intermediate files were left in the {} directory.",
            dir.display()
        );
    }

    let summary = result?;
    closed?;
    info!(
        "Done: {} pages processed, {} skipped",
        summary.pages_processed, summary.pages_skipped
    );
    Ok(())
}

/// Page progress on stderr. Draws nothing when stderr is not a terminal.
fn page_progress() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
            .unwrap()
            .progress_chars("█▓░"),
    );
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("ocrodjvu").chain(args.iter().copied()))
    }

    fn config(args: &[&str]) -> Result<Config, ConfigError> {
        parse(args).unwrap().into_config(Settings::default())
    }

    #[test]
    fn test_each_strategy() {
        let strategy = |flags: &[&str]| {
            let mut args = flags.to_vec();
            args.push("book.djvu");
            config(&args).unwrap().strategy
        };
        assert!(matches!(strategy(&["-o", "out.djvu"]), OutputStrategy::Bundled(_)));
        assert!(matches!(strategy(&["-i", "index.djvu"]), OutputStrategy::Indirect(_)));
        assert!(matches!(
            strategy(&["--save-script", "x.djvused"]),
            OutputStrategy::Script(_)
        ));
        assert_eq!(strategy(&["--in-place"]), OutputStrategy::InPlace);
        assert_eq!(strategy(&["--dry-run"]), OutputStrategy::DryRun);
    }

    #[test]
    fn test_strategy_paths_are_absolute() {
        let config = config(&["--save-bundled", "out.djvu", "book.djvu"]).unwrap();
        match config.strategy {
            OutputStrategy::Bundled(path) => {
                assert!(path.is_absolute());
                assert!(path.ends_with("out.djvu"));
            }
            other => panic!("unexpected strategy {:?}", other),
        }
        assert!(config.document.is_absolute());
    }

    #[test]
    fn test_requires_exactly_one_strategy() {
        assert!(matches!(
            config(&["book.djvu"]),
            Err(ConfigError::OutputStrategy)
        ));
        assert!(matches!(
            config(&["--dry-run", "--in-place", "book.djvu"]),
            Err(ConfigError::OutputStrategy)
        ));
        assert!(matches!(
            config(&["-o", "a.djvu", "--save-script", "b", "book.djvu"]),
            Err(ConfigError::OutputStrategy)
        ));
    }

    #[test]
    fn test_strategy_error_shows_usage() {
        let err = usage_error(config(&["--dry-run", "--in-place", "book.djvu"]).unwrap_err());
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
        assert!(err.use_stderr());
        let rendered = err.to_string();
        assert!(rendered.contains("You must use exactly one of the following options"));
        assert!(rendered.contains("Usage: ocrodjvu"));
    }

    #[test]
    fn test_options() {
        let config = config(&[
            "--dry-run",
            "--engine",
            "tesseract",
            "--language",
            "deu",
            "-p",
            "2,4-6,4",
            "--ocr-only",
            "--clear-text",
            "-D",
            "book.djvu",
        ])
        .unwrap();
        assert_eq!(config.engine, EngineKind::Tesseract);
        assert_eq!(config.language.as_deref(), Some("deu"));
        assert_eq!(config.pages.resolve(6), Ok(vec![1, 3, 4, 5, 3]));
        assert!(config.ocr_only);
        assert!(config.clear_text);
        assert!(config.debug);
    }

    #[test]
    fn test_settings_supply_defaults() {
        let settings = Settings {
            engine: Some(EngineKind::Tesseract),
            language: Some("pol".to_string()),
            tools: ToolPaths {
                djvused: "/opt/bin/djvused".to_string(),
                ..ToolPaths::default()
            },
        };
        let config = parse(&["--dry-run", "book.djvu"])
            .unwrap()
            .into_config(settings.clone())
            .unwrap();
        assert_eq!(config.engine, EngineKind::Tesseract);
        assert_eq!(config.tools.djvused, "/opt/bin/djvused");

        let config = parse(&["--dry-run", "--engine", "ocropus", "book.djvu"])
            .unwrap()
            .into_config(settings)
            .unwrap();
        assert_eq!(config.engine, EngineKind::Ocropus);
    }

    #[test]
    fn test_malformed_pages_rejected() {
        assert!(parse(&["--dry-run", "-p", "3-1", "book.djvu"]).is_err());
        assert!(parse(&["--dry-run", "-p", "x", "book.djvu"]).is_err());
    }

    #[test]
    fn test_unknown_engine_rejected() {
        assert!(parse(&["--dry-run", "--engine", "cuneiform", "book.djvu"]).is_err());
    }

    #[test]
    fn test_document_required_unless_listing() {
        assert!(parse(&["--dry-run"]).is_err());
        let cli = parse(&["--list-engines"]).unwrap();
        assert!(cli.list_engines);
        let cli = parse(&["--list-languages", "--engine", "tesseract"]).unwrap();
        assert!(cli.list_languages);
        assert!(cli.document.is_none());
    }

    #[test]
    fn test_help_is_not_a_usage_error() {
        let err = parse(&["--help"]).unwrap_err();
        assert!(!err.use_stderr());
        let err = parse(&["--bogus"]).unwrap_err();
        assert!(err.use_stderr());
    }

    #[test]
    fn test_config_flag() {
        let cli = parse(&["-c", "/etc/ocrodjvu.toml", "--dry-run", "book.djvu"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("/etc/ocrodjvu.toml")));

        let command = Cli::command();
        let arg = command
            .get_arguments()
            .find(|arg| arg.get_id() == "config")
            .unwrap();
        assert_eq!(arg.get_env(), Some(std::ffi::OsStr::new(CONFIG_ENV)));
    }
}
