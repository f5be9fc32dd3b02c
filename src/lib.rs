mod cli;
mod conversion;
mod tooling;

use clap::Parser;
use log::{error, info, warn};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use conversion::*;
pub use tooling::{
    get_converter_settings, get_runtime_tools_status, resolve_settings_path,
    save_converter_settings, ConverterSettings, RuntimeToolsStatus, SourceMetadata, ToolStatus,
};

use cli::{render_tools_status, Cli, EventPrinter};

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    match run_cli(cli) {
        Ok(code) => code,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn install_interrupt_handler(scheduler: BatchScheduler) -> Result<(), String> {
    let interrupted = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler(move || {
        if interrupted.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!("Cancelling conversions, press Ctrl+C again to exit immediately.");
        scheduler.cancel_all();
    })
    .map_err(|error| format!("Failed to install Ctrl+C handler: {error}"))
}

fn run_cli(cli: Cli) -> Result<ExitCode, String> {
    let settings_path = resolve_settings_path(cli.config.as_deref())?;
    let settings = cli.apply_overrides(get_converter_settings(&settings_path)?)?;

    if cli.save_settings {
        save_converter_settings(&settings_path, settings.clone())?;
        info!("settings saved to {}", settings_path.to_string_lossy());
    }

    if cli.check_tools {
        let status = get_runtime_tools_status(&settings);
        if cli.json {
            let payload = serde_json::to_string_pretty(&status)
                .map_err(|error| format!("Failed to serialize tool status: {error}"))?;
            println!("{payload}");
        } else {
            println!("{}", render_tools_status(&status));
        }
        if !status.ready() {
            return Ok(ExitCode::FAILURE);
        }
    }

    if cli.inputs.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }

    let (specs, skipped) =
        collect_job_specs(&cli.inputs, settings.target_ratio, settings.crop_mode);
    for entry in &skipped {
        warn!("skipping {}: {}", entry.input, entry.reason);
    }
    if specs.is_empty() {
        return Err("No convertible video files were given.".to_string());
    }

    let scheduler = create_scheduler(&settings)?;
    let events = scheduler.events();
    install_interrupt_handler(scheduler.clone())?;
    scheduler.enqueue(specs).map_err(|error| error.to_string())?;
    scheduler.start().map_err(|error| error.to_string())?;

    let mut printer = EventPrinter::new(cli.json);
    for event in events.iter() {
        let finished = matches!(event, BatchEvent::Complete(_));
        if let Some(line) = printer.render(&event) {
            println!("{line}");
        }
        if finished {
            break;
        }
    }
    scheduler.wait();

    let summary = scheduler.summary();
    if summary.failed > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
