pub mod annotate;
pub mod excel;
pub mod settings;
pub mod triggers;
pub mod utils;
pub mod worker;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};

use annotate::cache::TickerCache;
use annotate::edgar::EdgarClient;
use annotate::summarize::Summarizer;
use annotate::Annotator;
use excel::host::HostGateway;
use settings::SettingsStore;
use worker::WorkerHandle;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

fn gateway_factory() -> Result<Box<dyn HostGateway>> {
    #[cfg(windows)]
    {
        let gateway = excel::com::ComGateway::new()?;
        Ok(Box::new(gateway))
    }
    #[cfg(not(windows))]
    {
        anyhow::bail!("live Excel automation requires Windows; no host gateway on this platform")
    }
}

fn print_banner() {
    println!("=========================================");
    println!("  axenote - live filing notes for Excel");
    println!("=========================================");
    println!("  Ctrl+Shift+M   annotate selected cell (Windows)");
    println!("  Ctrl+Shift+H   check Excel connection (Windows)");
    println!();
    println!("  Console: a = annotate, p <prompt> = custom prompt,");
    println!("           h = health check, q = quit");
    println!("=========================================");
}

pub fn run() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_dir = dirs::config_dir()
        .context("could not resolve a user config directory")?
        .join("axenote");
    fs::create_dir_all(&config_dir)
        .with_context(|| format!("could not create {}", config_dir.display()))?;
    let store = SettingsStore::new(config_dir.join("settings.json"))?;
    // First run: materialize the defaults so users have a file to edit.
    if let Err(err) = store.persist_current() {
        warn!("Could not write settings file: {err:#}");
    }

    if !excel::host_process_running() {
        warn!(
            "{} is not running; requests will fail until Excel is open with a workbook",
            excel::HOST_PROCESS_NAME
        );
    }

    let edgar_settings = store.edgar();
    let summarizer_settings = store.summarizer();
    let api_key = std::env::var(&summarizer_settings.api_key_env).ok();
    if api_key.is_none() {
        info!(
            "{} not set; notes will embed raw excerpts instead of AI summaries",
            summarizer_settings.api_key_env
        );
    }

    let annotator = Annotator::new(
        EdgarClient::new(edgar_settings.user_agent, TickerCache::new()),
        Summarizer::new(
            summarizer_settings.endpoint,
            summarizer_settings.model,
            api_key,
        ),
        edgar_settings.form_type,
    );

    let worker = Arc::new(WorkerHandle::spawn(
        gateway_factory,
        Box::new(annotator),
        store.session().worker_config(),
    )?);

    triggers::spawn_hotkey_listener(Arc::clone(&worker));
    print_banner();

    triggers::run_command_loop(&worker)?;

    info!("Shutting down...");
    if worker.shutdown(SHUTDOWN_TIMEOUT) {
        info!("Worker stopped cleanly");
    } else {
        warn!("Worker did not stop within {SHUTDOWN_TIMEOUT:?}; exiting anyway");
    }
    Ok(())
}
