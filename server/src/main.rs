mod cli;
mod connection;
mod socket;
mod supervisor;

#[cfg(feature = "gst")]
mod gst_session_factory;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rialto_common::config::RialtoConfig;

use connection::{run_accept_loop, LoggingConnectionHandler};
use socket::NamedSocket;
use supervisor::{PlaybackService, SessionFactory};

#[macro_use]
extern crate log;

fn main() -> Result<()> {
    if let Err(err) = actual_main() {
        error!("fatal: {err:?}");
        return Err(err);
    }
    Ok(())
}

fn actual_main() -> Result<()> {
    let args = cli::Args::parse();
    let log_options: rialto_common::logging::LogOptions = (&args.log_options).into();
    let _logger_handle = rialto_common::logging::setup(&log_options);

    let mut config = load_config(&args)?;
    if let Some(path) = &args.socket_path {
        config.socket.path = path.clone();
    }

    info!("Rialto server starting (max_playbacks={})", config.max_playbacks);

    let factory: Arc<dyn SessionFactory> = build_session_factory();
    let service = Arc::new(PlaybackService::new(config.clone(), factory).context("constructing playback service")?);
    service.export_wayland_env();
    service.switch_to_active();

    let socket = NamedSocket::bind(&config.socket).context("binding named socket")?;
    info!("listening on {}", socket.path().display());

    let shutdown_service = service.clone();
    ctrlc::set_handler(move || {
        info!("received interrupt, shutting down");
        shutdown_service.switch_to_inactive();
        std::process::exit(0);
    })
    .context("installing Ctrl-C handler")?;

    run_accept_loop(&socket, service, Arc::new(LoggingConnectionHandler));

    info!("bye");
    Ok(())
}

fn load_config(args: &cli::Args) -> Result<RialtoConfig> {
    match &args.config_file {
        Some(path) => RialtoConfig::from_file(path).map_err(Into::into),
        None => RialtoConfig::from_default_path().map_err(Into::into),
    }
}

#[cfg(feature = "gst")]
fn build_session_factory() -> Arc<dyn SessionFactory> {
    Arc::new(gst_session_factory::GstSessionFactory::new())
}

#[cfg(not(feature = "gst"))]
fn build_session_factory() -> Arc<dyn SessionFactory> {
    Arc::new(supervisor::NullSessionFactory)
}
