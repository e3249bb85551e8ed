use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use tvcontrold_core::channel;
use tvcontrold_core::{CommandEngine, DaemonConfig, Outcome};
use tvcontrold_net::{EventServer, ServerOptions};

/// Home theatre control daemon.
#[derive(Parser, Debug)]
#[command(name = "tvcontrold", version, about)]
struct Cli {
    /// Extra configuration file, applied after the system and user ones
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// UDP and TCP port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Skip the per-user command script
    #[arg(long)]
    no_user_scripts: bool,

    /// Log debug messages
    #[arg(short, long)]
    verbose: bool,

    /// Also write the log to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        log_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    if let Some(path) = log_file {
        let file = File::create(path)
            .with_context(|| format!("cannot create log file {}", path.display()))?;
        loggers.push(WriteLogger::new(log_level, Config::default(), file));
    }
    CombinedLogger::init(loggers).context("cannot install logger")?;

    info!("tvcontrold starting (log level: {:?})", log_level);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    let mut config = DaemonConfig::load(cli.config.as_deref());
    if let Some(port) = cli.port {
        config.set_port(port);
    }

    let home = dirs::home_dir();
    let scripts = config.script_paths(home.as_deref(), !cli.no_user_scripts);

    let (events_tx, events_rx) = channel::message_channel();
    let mut engine = CommandEngine::new(events_tx.clone(), config.device_settings());
    engine
        .initialize(&scripts)
        .context("startup scripts failed")?;

    let mut server = EventServer::bind(&ServerOptions::from_config(&config), engine, events_rx)?;

    ctrlc::set_handler(move || {
        info!("termination requested");
        if let Err(e) = events_tx.send_text("exit") {
            error!("cannot enqueue exit: {}", e);
        }
    })
    .context("cannot install signal handler")?;

    let mut outcome = Outcome::Continue;
    if server.engine().contains("startup") {
        match server.engine_mut().execute("startup") {
            Ok(o) => outcome = o,
            Err(e) => error!("startup hook failed: {}", e),
        }
    }

    let result = match outcome {
        Outcome::Continue => server.run(),
        Outcome::Exit => Ok(()),
    };
    server.shutdown();
    info!("tvcontrold finished");
    result.map_err(Into::into)
}
