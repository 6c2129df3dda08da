use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use mutation_interpreter::{Document, DomEdit, InterpreterConfig, Session};
use tracing_subscriber::EnvFilter;

/// Replays recorded edit batches against a blank page and prints the result.
///
/// Usage: `replay <batches.json> [config.yaml]`
fn main() -> Result<()> {
    let subscriber_result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
    if subscriber_result.is_err() {
        // tracing was already initialised; continue silently
    }

    let mut args = std::env::args().skip(1);
    let Some(batches_path) = args.next().map(PathBuf::from) else {
        bail!("usage: replay <batches.json> [config.yaml]");
    };
    let config = InterpreterConfig::load(args.next().map(PathBuf::from))
        .context("failed to load interpreter config")?;

    let contents = std::fs::read_to_string(&batches_path)
        .with_context(|| format!("failed to read {}", batches_path.display()))?;
    let batches: Vec<Vec<DomEdit>> =
        serde_json::from_str(&contents).context("batches must be a JSON array of edit arrays")?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let _guard = rt.enter();

    let (mut session, _events) = Session::new(seeded_document(), &config)?;
    let mut failed = 0;
    for (number, batch) in batches.iter().enumerate() {
        match session.apply(batch) {
            Ok(summary) => tracing::info!(
                batch = number,
                applied = summary.applied,
                created = summary.created,
                removed = summary.removed,
                "batch applied"
            ),
            Err(err) => {
                failed += 1;
                tracing::error!(batch = number, "{err}");
            }
        }
    }

    let document = session.document();
    println!("{}", document.inner_html(document.body()));
    if failed > 0 {
        bail!("{failed} of {} batches failed", batches.len());
    }
    Ok(())
}

/// Blank page whose body holds `<main id="main">`, the conventional mount point.
fn seeded_document() -> Document {
    let mut document = Document::new();
    let main = document.create_element("main", None);
    let body = document.body();
    if let Err(err) = document
        .set_attribute(main, "id", None, "main")
        .and_then(|_| document.append_child(body, main))
    {
        tracing::error!("failed to seed mount point: {err}");
    }
    document
}
