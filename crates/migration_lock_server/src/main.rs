use std::net::SocketAddr;
use std::path::PathBuf;

use migration_lock_server::ServerConfig;
use migration_lock_trace::Output;
use structopt::StructOpt;
use tracing::*;

const MAGIC_READY_STRING: &str = "Site ready on";

#[derive(Debug, StructOpt)]
#[structopt(
    name = "migration-lock",
    about = "Serve a site that can be write-locked for a live migration."
)]
struct Opt {
    #[structopt(
        long,
        help = "Outputs structured json from logging:
    - None: No logging at all (fastest)
    - Log: Output logs to stdout with spans (human readable)
    - Compact: Same as Log but with less information
    - Json: Output logs as structured json (machine readable)
    ",
        default_value = "Log"
    )]
    structured: Output,

    #[structopt(short = "c", long, help = "Path to a YAML file containing server configuration")]
    config: PathBuf,

    /// Overrides `listen` from the config file.
    #[structopt(short, long)]
    listen: Option<SocketAddr>,

    /// Overrides `database` from the config file.
    #[structopt(short, long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();

    let mut config = ServerConfig::load_yaml(&opt.config)?;
    if let Some(t) = &config.tracing_override {
        std::env::set_var("CUSTOM_FILTER", t);
    }
    migration_lock_trace::init_fmt(opt.structured.clone())?;
    debug!("migration_lock_trace initialized");

    if let Some(listen) = opt.listen {
        config.listen = listen;
    }
    if let Some(database) = opt.database {
        config.database = database;
    }

    let (driver, addr) = migration_lock_server::serve(&config).await?;

    // Other processes can watch for this line to know the site is up.
    println!("{} {}", MAGIC_READY_STRING, addr);

    tokio::select! {
        _ = driver => warn!("server stopped"),
        r = tokio::signal::ctrl_c() => {
            if let Err(e) = r {
                error!("Could not handle termination signal: {:?}", e);
            }
            info!("Shutting down");
        }
    }
    Ok(())
}
