//! `ledgerdoc-sandbox` -- replay a JSON script of engine operations.
//!
//! Usage: `ledgerdoc-sandbox <script.json>`
//!
//! Each step outcome is printed to stdout as one JSON line. Engine settings
//! come from the `LEDGERDOC_*` variables documented on `EngineSettings`.
//!
//! # Environment variables
//!
//! | Variable             | Required | Default | Description                     |
//! |----------------------|----------|---------|---------------------------------|
//! | `RUST_LOG`           | no       | engine debug, sandbox info | Log filter   |
//! | `LEDGERDOC_LOG_JSON` | no       | unset   | Set to `1` for JSON log lines   |

use std::path::PathBuf;

use anyhow::Context;
use ledgerdoc_engine::EngineSettings;
use ledgerdoc_sandbox::{script, Sandbox};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ledgerdoc_engine=debug,ledgerdoc_sandbox=info".into());
    // Logs go to stderr so stdout carries only step outcomes.
    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    if std::env::var("LEDGERDOC_LOG_JSON").is_ok_and(|v| v == "1") {
        tracing_subscriber::registry().with(filter).with(fmt.json()).init();
    } else {
        tracing_subscriber::registry().with(filter).with(fmt).init();
    }

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: ledgerdoc-sandbox <script.json>")?;

    let settings = EngineSettings::from_env().context("invalid engine settings")?;
    tracing::info!(
        id_func = settings.id_func.as_str(),
        page_size = settings.page_size,
        "Starting ledgerdoc-sandbox",
    );

    let script = script::load(&path)?;
    let outcomes = Sandbox::new(settings).run(&script)?;
    for outcome in &outcomes {
        println!("{}", serde_json::to_string(outcome)?);
    }

    tracing::info!(steps = outcomes.len(), "script replayed");
    Ok(())
}
