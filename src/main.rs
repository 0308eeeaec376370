use anyhow::Result;
use clap::Parser;
use log::error;

use svcman::cli::{Args, Cmd};
use svcman::config::Config;
use svcman::platform::{DaemonBackend, detect_backend};
use svcman::{lifecycle, report};

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp(None)
        .format_target(false)
        .init();

    if let Err(e) = real_main() {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;
    let backend = detect_backend(&config)?;

    match args.cmd {
        Cmd::Install => handle_install(backend.as_ref(), &config),
        Cmd::Start => handle_start(backend.as_ref(), &config),
        Cmd::Stop => handle_stop(backend.as_ref(), &config),
        Cmd::Restart => handle_restart(backend.as_ref(), &config),
        Cmd::Status => handle_status(backend.as_ref(), &config),
        Cmd::Uninstall => handle_uninstall(backend.as_ref(), &config),
        Cmd::Logs { lines } => handle_logs(backend.as_ref(), &config, lines),
    }
}

fn handle_install(backend: &dyn DaemonBackend, config: &Config) -> Result<()> {
    match lifecycle::install(backend, config)? {
        Some(pid) => println!("✓ Daemon installed and started with PID: {pid}"),
        None => println!("✓ Daemon installed and started (PID not available)"),
    }
    Ok(())
}

fn handle_start(backend: &dyn DaemonBackend, config: &Config) -> Result<()> {
    let descriptor = config.descriptor(backend)?;
    match backend.start(&descriptor)? {
        Some(pid) => println!("✓ Daemon started with PID: {pid}"),
        None => println!("✓ Daemon started (PID not available)"),
    }
    Ok(())
}

fn handle_stop(backend: &dyn DaemonBackend, config: &Config) -> Result<()> {
    let descriptor = config.descriptor(backend)?;
    match backend.stop(&descriptor)? {
        Some(pid) => println!("✓ Daemon stopped (PID: {pid})"),
        None => println!("✓ Daemon stopped"),
    }
    Ok(())
}

fn handle_restart(backend: &dyn DaemonBackend, config: &Config) -> Result<()> {
    let descriptor = config.descriptor(backend)?;
    let (stopped, started) = lifecycle::restart(backend, &descriptor)?;
    if let Some(pid) = stopped {
        println!("Stopped daemon with PID: {pid}");
    }
    match started {
        Some(pid) => println!("✓ Daemon restarted with PID: {pid}"),
        None => println!("✓ Daemon restarted (PID not available)"),
    }
    Ok(())
}

fn handle_status(backend: &dyn DaemonBackend, config: &Config) -> Result<()> {
    let descriptor = config.descriptor(backend)?;
    let status = backend.status(&descriptor)?;
    print!("{}", report::render_status(&config.service_id, &status));
    if !status.running {
        std::process::exit(1);
    }
    Ok(())
}

fn handle_uninstall(backend: &dyn DaemonBackend, config: &Config) -> Result<()> {
    let descriptor = config.descriptor(backend)?;
    lifecycle::uninstall(backend, &descriptor)?;
    println!("✓ Daemon uninstalled");
    Ok(())
}

fn handle_logs(backend: &dyn DaemonBackend, config: &Config, lines: Option<usize>) -> Result<()> {
    let descriptor = config.descriptor(backend)?;
    let status = backend.status(&descriptor)?;
    print!("{}", report::render_logs(&status, lines)?);
    Ok(())
}
