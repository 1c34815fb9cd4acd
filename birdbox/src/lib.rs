//! BirdBox: end-to-end test harness for the Lattice analytics server.
//!
//! The harness has two independent entry points:
//!
//! - [`start_birdbox`] stands up a full server instance (installed CLI,
//!   container image, or a locally built server binary, chosen by
//!   [`ServerMode`]) and returns a [`BirdBox`] handle exposing its API URL
//!   and a stop operation. Suites then drive the HTTP API through
//!   [`lattice_client`] and compare results against stored snapshots.
//! - [`RefreshKeyScenarios`] compiles a schema fixture through the external
//!   schema compiler, extracts the pre-aggregation invalidation statements,
//!   and executes them against a raw database connection.
//!
//! The two paths share no state.

pub mod config;
mod container;
pub mod error;
pub mod filters;
pub mod postgres;
pub mod scenario;
pub mod schema;
mod server_fixture;

pub use config::{suite_env, CliConfig, ContainerConfig, EnvMap, ServerMode};
pub use container::start_birdbox_from_container;
pub use error::{Error, Result};
pub use scenario::{
    CompileOptions, CompiledSchema, PreAggregationDescription, RefreshKeyScenarios, SchemaCompiler,
    SchemaFile, SqlDriver, SqlQuery,
};
pub use schema::CubeSchema;
pub use server_fixture::{
    start_birdbox_from_cli, BirdBox, BirdBoxConfiguration, GRACEFUL_STOP_TIMEOUT,
    SERVER_BINARY_ENV_VAR,
};

use tracing::error;

/// Start a server environment for the given mode.
///
/// This is the suite entry point: any startup failure is logged and the
/// process exits immediately. The environment is presumed unusable at that
/// point, so no partial-state cleanup is attempted. Suites that want to
/// handle startup errors themselves should call [`start_birdbox_from_cli`]
/// or [`start_birdbox_from_container`] directly.
pub async fn start_birdbox(
    mode: ServerMode,
    config_path: &str,
    db_type: &str,
    env: EnvMap,
) -> BirdBox {
    let result = match mode {
        ServerMode::Cli | ServerMode::Local => {
            start_birdbox_from_cli(
                CliConfig::new(config_path, db_type)
                    .with_server_binary(mode == ServerMode::Local)
                    .with_env(env),
            )
            .await
        }
        ServerMode::Docker => {
            start_birdbox_from_container(ContainerConfig::new(db_type).with_env(env)).await
        }
    };

    match result {
        Ok(birdbox) => birdbox,
        Err(e) => {
            error!("failed to start {mode} environment: {e}");
            std::process::exit(1);
        }
    }
}

/// Skip the enclosing test unless `TEST_INTEGRATION` is set.
///
/// End-to-end suites need an installed server (or docker); gate them so a
/// plain `cargo test` stays green on machines without one.
#[macro_export]
macro_rules! maybe_skip_integration {
    () => {{
        dotenvy::dotenv().ok();
        if std::env::var("TEST_INTEGRATION").is_err() {
            eprintln!("skipping end-to-end integration test - set TEST_INTEGRATION to run");
            return;
        }
    }};
}
