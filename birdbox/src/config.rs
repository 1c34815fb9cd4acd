//! Suite configuration: server mode selection and the merged environment
//! passed to the server under test.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Environment passed to the server under test, merged once per suite and
/// read-only thereafter.
pub type EnvMap = BTreeMap<String, String>;

/// Variables force-set for every suite, regardless of what the caller
/// supplies: rollup-only serving against external pre-aggregations, with the
/// refresh worker doing the building instead of the scheduled-refresh
/// default.
const FORCED_ENV: &[(&str, &str)] = &[
    ("LATTICE_SCHEDULED_REFRESH_DEFAULT", "false"),
    ("LATTICE_REFRESH_WORKER", "true"),
    ("LATTICE_EXTERNAL_DEFAULT", "true"),
    ("LATTICE_ROLLUP_ONLY", "true"),
];

/// Env var consulted by [`ServerMode::from_env`]
pub const MODE_ENV_VAR: &str = "BIRDBOX_MODE";

/// How to stand up the server under test
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ServerMode {
    /// Launch via the installed `lattice` CLI
    Cli,
    /// Start the published server container image
    Docker,
    /// Run the `latticed` server binary directly
    #[default]
    Local,
}

impl ServerMode {
    /// Resolve the mode from `BIRDBOX_MODE`, defaulting to [`Self::Local`].
    /// Call once at suite start.
    pub fn from_env() -> Result<Self> {
        match std::env::var(MODE_ENV_VAR) {
            Ok(value) => value.parse(),
            Err(_) => Ok(Self::Local),
        }
    }
}

impl FromStr for ServerMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cli" => Ok(Self::Cli),
            "docker" => Ok(Self::Docker),
            "local" => Ok(Self::Local),
            other => Err(Error::BadServerMode(other.to_string())),
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cli => "cli",
            Self::Docker => "docker",
            Self::Local => "local",
        };
        write!(f, "{name}")
    }
}

/// Build the environment map for a suite: every name in `required` must be
/// present in the process environment (missing names fail the suite before
/// any test runs), and the [`FORCED_ENV`] overrides are applied on top.
pub fn suite_env(required: &[&str]) -> Result<EnvMap> {
    dotenvy::dotenv().ok();

    let mut env = EnvMap::new();
    for name in required {
        let value = std::env::var(name).map_err(|_| Error::MissingEnvVar {
            name: (*name).to_string(),
        })?;
        env.insert((*name).to_string(), value);
    }
    for (name, value) in FORCED_ENV {
        env.insert((*name).to_string(), (*value).to_string());
    }
    Ok(env)
}

/// Configuration for starting the server as a subprocess (`cli` and `local`
/// modes)
#[derive(Debug, Clone)]
pub struct CliConfig {
    config_path: String,
    db_type: String,
    use_server_binary: bool,
    env: EnvMap,
}

impl CliConfig {
    /// `config_path` is the schema configuration handed to the server,
    /// relative to its working directory; `db_type` selects the target
    /// database.
    pub fn new<C: Into<String>, D: Into<String>>(config_path: C, db_type: D) -> Self {
        Self {
            config_path: config_path.into(),
            db_type: db_type.into(),
            use_server_binary: false,
            env: EnvMap::new(),
        }
    }

    /// Run the `latticed` server binary directly instead of going through
    /// the `lattice` CLI
    pub fn with_server_binary(mut self, use_server_binary: bool) -> Self {
        self.use_server_binary = use_server_binary;
        self
    }

    pub fn with_env(mut self, env: EnvMap) -> Self {
        self.env = env;
        self
    }

    pub fn config_path(&self) -> &str {
        &self.config_path
    }

    pub fn db_type(&self) -> &str {
        &self.db_type
    }

    pub fn use_server_binary(&self) -> bool {
        self.use_server_binary
    }

    pub fn env(&self) -> &EnvMap {
        &self.env
    }
}

/// Configuration for starting the server as a container (`docker` mode)
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    name: String,
    tag: String,
    env: EnvMap,
}

impl ContainerConfig {
    /// `name` selects the image variant, one per target database type
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            tag: "latest".to_string(),
            env: EnvMap::new(),
        }
    }

    pub fn with_tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_env(mut self, env: EnvMap) -> Self {
        self.env = env;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn env(&self) -> &EnvMap {
        &self.env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn suite_env_applies_forced_overrides() {
        let env = suite_env(&[]).unwrap();

        assert_eq!(env["LATTICE_SCHEDULED_REFRESH_DEFAULT"], "false");
        assert_eq!(env["LATTICE_REFRESH_WORKER"], "true");
        assert_eq!(env["LATTICE_EXTERNAL_DEFAULT"], "true");
        assert_eq!(env["LATTICE_ROLLUP_ONLY"], "true");
        assert_eq!(env.len(), 4);
    }

    #[test]
    fn suite_env_collects_required_variables() {
        std::env::set_var("BIRDBOX_TEST_DB_HOST", "db.internal");

        let env = suite_env(&["BIRDBOX_TEST_DB_HOST"]).unwrap();
        assert_eq!(env["BIRDBOX_TEST_DB_HOST"], "db.internal");
    }

    #[test]
    fn suite_env_names_the_missing_variable() {
        let err = suite_env(&["BIRDBOX_TEST_DOES_NOT_EXIST"]).unwrap_err();

        match err {
            Error::MissingEnvVar { name } => assert_eq!(name, "BIRDBOX_TEST_DOES_NOT_EXIST"),
            other => panic!("expected MissingEnvVar, got {other:?}"),
        }
    }

    #[test]
    fn forced_overrides_win_over_caller_values() {
        std::env::set_var("LATTICE_ROLLUP_ONLY", "false");

        let env = suite_env(&["LATTICE_ROLLUP_ONLY"]).unwrap();
        assert_eq!(env["LATTICE_ROLLUP_ONLY"], "true");
    }

    #[test]
    fn server_mode_parses_all_choices() {
        assert_eq!("cli".parse::<ServerMode>().unwrap(), ServerMode::Cli);
        assert_eq!("docker".parse::<ServerMode>().unwrap(), ServerMode::Docker);
        assert_eq!("local".parse::<ServerMode>().unwrap(), ServerMode::Local);
        assert!(matches!(
            "compose".parse::<ServerMode>(),
            Err(Error::BadServerMode(_))
        ));
    }

    #[test]
    fn server_mode_defaults_to_local() {
        assert_eq!(ServerMode::default(), ServerMode::Local);
    }
}
