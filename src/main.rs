use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tokio::io::{stdin, BufReader};
use tokio::net::TcpStream;
use touchbridge::config::{default_config_path, ensure_default_config, load_config};
use touchbridge::driver::drive;
use touchbridge::session::ControlSession;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    // Konfiguration laden, beim ersten Start Vorlage anlegen
    let path = match std::env::args_os().nth(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let path = default_config_path();
            ensure_default_config(&path).await?;
            path
        }
    };
    let config = load_config(Some(path)).await?;

    info!("Connecting to device at {}", config.session.device_address);
    let stream = TcpStream::connect(config.session.device_address.as_str())
        .await
        .map_err(|e| eyre!("Failed to connect to {}: {}", config.session.device_address, e))?;
    stream
        .set_nodelay(true)
        .map_err(|e| eyre!("Failed to set TCP_NODELAY: {}", e))?;

    let (mut router, session) =
        ControlSession::start(Box::new(stream), &config.keymap, &config.session)
            .map_err(|e| eyre!("Failed to start control session: {}", e))?;

    // Eingaben kommen zeilenweise über stdin
    tokio::select! {
        result = drive(BufReader::new(stdin()), &mut router) => {
            if let Err(e) = result {
                warn!("Reading input failed: {}", e);
            }
        }
        _ = session.closed() => warn!("Device connection closed"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    let frames = session
        .shutdown(router)
        .await
        .map_err(|e| eyre!("Control session failed: {}", e))?;
    info!("Sent {} frames", frames);
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
