use std::path::PathBuf;

use clap::Parser;
use sffl_host::{error::HostResult, node::Node, Opts};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{Builder, Rotation},
};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> HostResult<()> {
    dotenv::dotenv().ok();
    let opts = parse_opts()?;
    let _guard = subscribe_log(&opts.log_path, &opts.log_level, opts.max_log)?;
    debug!("Args:\n{:#?}", opts);

    let config = opts.node_config()?;
    info!("Start config:\n{:#?}", config);
    let node = Node::init(config)?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received ctrl-c");
        }
        signal.cancel();
    });

    node.run(shutdown).await
}

fn parse_opts() -> HostResult<Opts> {
    // Read the command line arguments;
    let mut opts = Opts::parse();
    // Read the config file.
    opts.merge_from_file()?;

    Ok(opts)
}

fn subscribe_log(
    log_path: &Option<PathBuf>,
    log_level: &String,
    max_log: usize,
) -> HostResult<Option<WorkerGuard>> {
    let subscriber_builder = FmtSubscriber::builder().with_env_filter(log_level);
    match log_path {
        Some(ref log_path) => {
            let file_appender = Builder::new()
                .rotation(Rotation::DAILY)
                .filename_prefix("sffl.log")
                .max_log_files(max_log)
                .build(log_path)
                .map_err(|e| anyhow::anyhow!(e))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let subscriber = subscriber_builder.json().with_writer(non_blocking).finish();
            tracing::subscriber::set_global_default(subscriber).map_err(|e| anyhow::anyhow!(e))?;
            Ok(Some(guard))
        }
        None => {
            let subscriber = subscriber_builder.finish();
            tracing::subscriber::set_global_default(subscriber).map_err(|e| anyhow::anyhow!(e))?;
            Ok(None)
        }
    }
}
