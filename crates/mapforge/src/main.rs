//! Headless dedicated host for Mapforge sessions.
//!
//! Runs the hosting engine loop with no UI attached: players join, draw,
//! and play; the host replicates state and autosaves periodically.

use std::path::PathBuf;
use std::process::ExitCode;

use mapforge::{Engine, MapforgeError, DEFAULT_PORT};

struct Args {
    port: u16,
    password: String,
    name: String,
    character: String,
    data_root: PathBuf,
}

fn usage() -> ! {
    eprintln!(
        "usage: mapforge-host [--port N] [--password SECRET] [--name NAME] \
         [--character NAME] [--data-root DIR]"
    );
    std::process::exit(2);
}

fn parse_args() -> Args {
    let mut args = Args {
        port: DEFAULT_PORT,
        password: String::new(),
        name: "Host".to_string(),
        character: "GM".to_string(),
        data_root: PathBuf::from("."),
    };
    let mut argv = std::env::args().skip(1);
    while let Some(flag) = argv.next() {
        let mut value = || argv.next().unwrap_or_else(|| usage());
        match flag.as_str() {
            "--port" => {
                args.port = value().parse().unwrap_or_else(|_| usage());
            }
            "--password" => args.password = value(),
            "--name" => args.name = value(),
            "--character" => args.character = value(),
            "--data-root" => args.data_root = PathBuf::from(value()),
            _ => usage(),
        }
    }
    args
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = parse_args();
    let mut engine = Engine::builder()
        .display_name(&args.name)
        .character_name(&args.character)
        .password(&args.password)
        .port(args.port)
        .data_root(args.data_root)
        .build();

    let result: Result<(), MapforgeError> = async {
        let addr = engine.host().await?;
        tracing::info!(%addr, "mapforge host ready");
        engine.run().await
    }
    .await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "host terminated");
            ExitCode::FAILURE
        }
    }
}
