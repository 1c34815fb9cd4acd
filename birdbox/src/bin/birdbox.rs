//! Boot a Lattice test environment and keep it running until Ctrl-C.
//!
//! Handy for poking at the same environment the end-to-end suites use:
//!
//! ```text
//! birdbox --mode docker --db-type postgres --require-env LATTICE_DB_HOST
//! ```

use clap::Parser;

use birdbox::{
    start_birdbox_from_cli, start_birdbox_from_container, suite_env, CliConfig, ContainerConfig,
    ServerMode,
};

#[derive(Debug, Parser)]
#[clap(name = "birdbox", about = "Boot a Lattice test environment")]
struct Args {
    /// How to stand up the server
    #[clap(long, value_enum, default_value_t = ServerMode::Local)]
    mode: ServerMode,

    /// Schema configuration path handed to the server
    #[clap(long, default_value = "single/cube.js")]
    config: String,

    /// Target database type
    #[clap(long, default_value = "postgres")]
    db_type: String,

    /// Container image variant (docker mode); defaults to the db type
    #[clap(long)]
    image: Option<String>,

    /// Environment variables that must be present and are forwarded to the
    /// server
    #[clap(long = "require-env")]
    require_env: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let required: Vec<&str> = args.require_env.iter().map(String::as_str).collect();
    let env = suite_env(&required)?;

    let birdbox = match args.mode {
        ServerMode::Cli | ServerMode::Local => {
            start_birdbox_from_cli(
                CliConfig::new(&args.config, &args.db_type)
                    .with_server_binary(args.mode == ServerMode::Local)
                    .with_env(env),
            )
            .await?
        }
        ServerMode::Docker => {
            let name = args.image.as_deref().unwrap_or(&args.db_type);
            start_birdbox_from_container(ContainerConfig::new(name).with_env(env)).await?
        }
    };

    println!("{}", birdbox.api_url());
    tokio::signal::ctrl_c().await?;
    birdbox.stop().await?;

    Ok(())
}
