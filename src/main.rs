//! ocrodjvu - OCR for DjVu documents.
//!
//! Runs an OCR engine over the pages of a DjVu document and stores the
//! recognized text as the document's hidden text layer.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if ocrodjvu::cli::is_verbose() {
        "ocrodjvu=info"
    } else {
        "ocrodjvu=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    ocrodjvu::cli::run()
}
