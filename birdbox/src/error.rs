use std::process::ExitStatus;
use std::time::Duration;

/// Error type for the birdbox harness
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("environment variable `{name}` is required")]
    MissingEnvVar { name: String },

    #[error("unrecognized server mode `{0}`, expected one of cli, docker or local")]
    BadServerMode(String),

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server process exited during startup: {status}")]
    EarlyExit { status: ExitStatus },

    #[error("server at {url} did not become ready within {timeout:?}")]
    ReadyTimeout { url: String, timeout: Duration },

    #[error("container image `{image}` failed: {source}")]
    Container {
        image: String,
        #[source]
        source: testcontainers::TestcontainersError,
    },

    #[error("schema compilation failed: {0}")]
    Compile(String),

    #[error("expected {expected} pre-aggregation descriptions, got {actual}")]
    PreAggregationCount { expected: usize, actual: usize },

    #[error("pre-aggregation `{name}` has no usable invalidate key query")]
    MissingInvalidateKeyQuery { name: String },

    #[error("sql driver error: {0}")]
    Driver(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap an arbitrary database error as a driver failure
    pub fn driver<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Driver(Box::new(source))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
