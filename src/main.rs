use anyhow::{anyhow, Result};
use is_terminal::IsTerminal;
use signercrab::dns::TcpQuerier;
use signercrab::error::Error::NoRemoteCall;
use signercrab::notify::Notifier;
use signercrab::updater::UpdaterRegistry;
use signercrab::{Config, Context, Controller, FileStateStore, Mode, Shared, Transcript};
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DAEMON: &str = "daemon";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    let mut args = std::env::args();
    let (program_name, config_file) = (
        args.next().unwrap_or("signercrab".to_string()),
        args.next(),
    );
    let command: Vec<String> = args.collect();

    let config = config_init(&program_name, config_file)?;
    let Some(name) = command.first() else {
        return Err(anyhow!(
            "usage: {program_name} /path/to/config.json <command> [args...] (try help)"
        ));
    };

    if let Some(addr) = config.remote {
        if name == DAEMON {
            return Err(NoRemoteCall(name.clone()).into());
        }
        let mut out = Transcript::new();
        let result = signercrab::remote::execute(addr, &command, config.rpc_timeout, &mut out).await;
        print!("{out}");
        return Ok(result?);
    }

    if name == DAEMON {
        let controller = controller_init(&config, Mode::Daemon).await?;
        return daemon(config, controller).await;
    }

    let controller = controller_init(&config, Mode::Local).await?;
    let mut out = Transcript::new();
    let result = controller.execute(&command, &mut out).await;
    print!("{out}");
    Ok(result?)
}

async fn daemon(config: Shared, controller: Arc<Controller>) -> Result<()> {
    tracing::info!("RPC listening on {}", &config.rpc_bind_addr);
    let api_server = signercrab::api::new(config.clone(), controller.clone());
    let api_handle = tokio::spawn(api_server);

    let started = controller.autostart().await;
    tracing::info!(started, "automation autostarted");

    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("quitting from signal");
        },
        Ok(api_res) = api_handle => {
            if let Err(err) = api_res {
                controller.shutdown().await?;
                return Err(err.into())
            }
        }
    }
    controller.shutdown().await?;
    tracing::info!("goodbye");
    Ok(())
}

fn tracing_init() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal()),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signercrab=info".into()),
        )
        .init();
}

fn config_init(program_name: &str, config_file: Option<String>) -> Result<Shared> {
    match config_file {
        None => Err(anyhow!(
            "usage: {program_name} /path/to/config.json <command> [args...]"
        )),
        Some(config_file) => {
            tracing::debug!("loaded config from {config_file}");
            let config = Config::try_from_file(&config_file)?;
            Ok(Arc::new(config))
        }
    }
}

async fn controller_init(config: &Config, mode: Mode) -> Result<Arc<Controller>> {
    let store = FileStateStore::try_from_file(&config.state_path).await?;
    let context = Context::new(
        Box::new(store),
        Arc::new(TcpQuerier::new(config.dns_timeout)),
        UpdaterRegistry::with_defaults(config.dns_timeout),
        Notifier::new(),
    );
    Ok(Controller::new(mode, context, config.automate_interval))
}
