//! Refresh-key invalidation scenarios.
//!
//! The schema compiler and the query planner are external collaborators of
//! the harness; they are reached through the [`SchemaCompiler`] and
//! [`CompiledSchema`] seams so suites can plug in whichever engine build
//! they run against. The database connection is likewise behind
//! [`SqlDriver`] — the invalidation statements are executed for real, not
//! mocked.

use async_trait::async_trait;
use lattice_client::{Query, TimeDimension};
use tracing::info;

use crate::error::{Error, Result};
use crate::schema::{
    CubeSchema, IMMUTABLE_REFRESH_KEY, ROLLUP_PRE_AGGREGATION,
    ROLLUP_PRE_AGGREGATION_INCREMENTAL,
};

/// One schema source file handed to the compiler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaFile {
    pub file_name: String,
    pub content: String,
}

/// Compiler options; `adapter` selects the target SQL dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub adapter: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            adapter: "postgres".to_string(),
        }
    }
}

/// A (SQL text, parameter list) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<String>,
}

impl SqlQuery {
    pub fn new<S: Into<String>, I, P>(sql: S, params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            sql: sql.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }
}

/// One pre-aggregation (partition) produced by the planner, with its
/// ordered invalidation-check statements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreAggregationDescription {
    pub name: String,
    pub invalidate_key_queries: Vec<SqlQuery>,
}

/// Seam to the external schema compiler
#[async_trait]
pub trait SchemaCompiler: Send + Sync {
    async fn compile(
        &self,
        files: Vec<SchemaFile>,
        options: CompileOptions,
    ) -> Result<Box<dyn CompiledSchema>>;
}

/// A compiled schema; `plan` builds a query over it and returns the
/// pre-aggregation descriptions that query would use
#[async_trait]
pub trait CompiledSchema: Send + Sync {
    async fn plan(&self, request: &Query) -> Result<Vec<PreAggregationDescription>>;
}

/// Seam to a raw database connection
#[async_trait]
pub trait SqlDriver: Send + Sync {
    async fn query(&self, sql: &str, params: &[String]) -> Result<Vec<serde_json::Value>>;
    async fn release(&self) -> Result<()>;
}

/// The fixed date range spans December 2016 and January 2017, so a
/// month-partitioned rollup must always yield exactly two descriptions.
const EXPECTED_PRE_AGGREGATIONS: usize = 2;

/// Reusable refresh-key scenarios, parameterized over the compiler build
/// under test
pub struct RefreshKeyScenarios<'a> {
    compiler: &'a dyn SchemaCompiler,
}

impl<'a> RefreshKeyScenarios<'a> {
    pub fn new(compiler: &'a dyn SchemaCompiler) -> Self {
        Self { compiler }
    }

    /// Immutable refresh key on the cube, plain external rollup
    pub async fn refresh_key_immutable(&self, driver: &dyn SqlDriver) -> Result<()> {
        self.run(ROLLUP_PRE_AGGREGATION, driver).await
    }

    /// Same cube, but the rollup itself declares an incremental refresh key
    pub async fn refresh_key_incremental(&self, driver: &dyn SqlDriver) -> Result<()> {
        self.run(ROLLUP_PRE_AGGREGATION_INCREMENTAL, driver).await
    }

    async fn run(&self, pre_aggregations: &str, driver: &dyn SqlDriver) -> Result<()> {
        let content = CubeSchema::new("cards")
            .with_refresh_key(IMMUTABLE_REFRESH_KEY)
            .with_pre_aggregations(pre_aggregations)
            .render();

        let compiled = self
            .compiler
            .compile(
                vec![SchemaFile {
                    file_name: "main.js".to_string(),
                    content,
                }],
                CompileOptions::default(),
            )
            .await?;

        let request = Query::default()
            .with_measure("cards.count")
            .with_time_dimension(
                TimeDimension::new("cards.createdAt")
                    .with_granularity("day")
                    .with_date_range("2016-12-30", "2017-01-05"),
            )
            .with_timezone("America/Los_Angeles");

        let descriptions = compiled.plan(&request).await?;
        if descriptions.len() != EXPECTED_PRE_AGGREGATIONS {
            return Err(Error::PreAggregationCount {
                expected: EXPECTED_PRE_AGGREGATIONS,
                actual: descriptions.len(),
            });
        }

        let first = &descriptions[0];
        let check = first
            .invalidate_key_queries
            .first()
            .filter(|q| !q.sql.trim().is_empty())
            .ok_or_else(|| Error::MissingInvalidateKeyQuery {
                name: first.name.clone(),
            })?;

        info!(sql = %check.sql, params = ?check.params, "executing invalidate key query");
        driver.query(&check.sql, &check.params).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Planner returning a canned set of descriptions, recording what it
    /// was asked to compile
    struct StaticPlanner {
        descriptions: Vec<PreAggregationDescription>,
        compiled_sources: Mutex<Vec<String>>,
    }

    impl StaticPlanner {
        fn new(descriptions: Vec<PreAggregationDescription>) -> Self {
            Self {
                descriptions,
                compiled_sources: Mutex::new(vec![]),
            }
        }

        fn two_partitions() -> Self {
            Self::new(vec![
                PreAggregationDescription {
                    name: "cards_count_created_at_201612".to_string(),
                    invalidate_key_queries: vec![SqlQuery::new(
                        "SELECT CASE WHEN CURRENT_DATE >= $1::text::date THEN 1 ELSE 0 END",
                        ["2016-12-31"],
                    )],
                },
                PreAggregationDescription {
                    name: "cards_count_created_at_201701".to_string(),
                    invalidate_key_queries: vec![SqlQuery::new(
                        "SELECT CASE WHEN CURRENT_DATE >= $1::text::date THEN 1 ELSE 0 END",
                        ["2017-01-31"],
                    )],
                },
            ])
        }
    }

    #[async_trait]
    impl SchemaCompiler for StaticPlanner {
        async fn compile(
            &self,
            files: Vec<SchemaFile>,
            _options: CompileOptions,
        ) -> Result<Box<dyn CompiledSchema>> {
            self.compiled_sources
                .lock()
                .unwrap()
                .extend(files.into_iter().map(|f| f.content));
            Ok(Box::new(StaticCompiled {
                descriptions: self.descriptions.clone(),
            }))
        }
    }

    struct StaticCompiled {
        descriptions: Vec<PreAggregationDescription>,
    }

    #[async_trait]
    impl CompiledSchema for StaticCompiled {
        async fn plan(&self, request: &Query) -> Result<Vec<PreAggregationDescription>> {
            assert_eq!(request.measures, vec!["cards.count"]);
            Ok(self.descriptions.clone())
        }
    }

    /// Driver recording every executed statement, optionally failing
    #[derive(Default)]
    struct RecordingDriver {
        executed: Mutex<Vec<SqlQuery>>,
        fail: bool,
    }

    #[async_trait]
    impl SqlDriver for RecordingDriver {
        async fn query(&self, sql: &str, params: &[String]) -> Result<Vec<serde_json::Value>> {
            if self.fail {
                return Err(Error::driver(std::io::Error::other("connection reset")));
            }
            self.executed
                .lock()
                .unwrap()
                .push(SqlQuery::new(sql, params.to_vec()));
            Ok(vec![])
        }

        async fn release(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test_log::test(tokio::test)]
    async fn immutable_scenario_executes_first_invalidate_query() {
        let planner = StaticPlanner::two_partitions();
        let driver = RecordingDriver::default();

        RefreshKeyScenarios::new(&planner)
            .refresh_key_immutable(&driver)
            .await
            .unwrap();

        let executed = driver.executed.lock().unwrap();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].params, vec!["2016-12-31"]);
        assert!(executed[0].sql.contains("CURRENT_DATE"));
    }

    #[test_log::test(tokio::test)]
    async fn incremental_scenario_compiles_the_update_window_clause() {
        let planner = StaticPlanner::two_partitions();
        let driver = RecordingDriver::default();

        RefreshKeyScenarios::new(&planner)
            .refresh_key_incremental(&driver)
            .await
            .unwrap();

        let sources = planner.compiled_sources.lock().unwrap();
        assert_eq!(sources.len(), 1);
        assert!(sources[0].contains("updateWindow: `7 day`"));
        assert!(sources[0].contains("immutable: true"));
    }

    #[test_log::test(tokio::test)]
    async fn wrong_description_count_is_an_error() {
        let planner = StaticPlanner::new(vec![PreAggregationDescription {
            name: "cards_count_created_at".to_string(),
            invalidate_key_queries: vec![SqlQuery::new("SELECT 1", Vec::<String>::new())],
        }]);
        let driver = RecordingDriver::default();

        let err = RefreshKeyScenarios::new(&planner)
            .refresh_key_immutable(&driver)
            .await
            .unwrap_err();

        match err {
            Error::PreAggregationCount { expected, actual } => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("expected PreAggregationCount, got {other:?}"),
        }
        assert!(driver.executed.lock().unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn missing_invalidate_query_is_an_error() {
        let planner = StaticPlanner::new(vec![
            PreAggregationDescription {
                name: "cards_count_created_at_201612".to_string(),
                invalidate_key_queries: vec![],
            },
            PreAggregationDescription {
                name: "cards_count_created_at_201701".to_string(),
                invalidate_key_queries: vec![],
            },
        ]);
        let driver = RecordingDriver::default();

        let err = RefreshKeyScenarios::new(&planner)
            .refresh_key_immutable(&driver)
            .await
            .unwrap_err();

        match err {
            Error::MissingInvalidateKeyQuery { name } => {
                assert_eq!(name, "cards_count_created_at_201612");
            }
            other => panic!("expected MissingInvalidateKeyQuery, got {other:?}"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn driver_failures_propagate() {
        let planner = StaticPlanner::two_partitions();
        let driver = RecordingDriver {
            fail: true,
            ..Default::default()
        };

        let err = RefreshKeyScenarios::new(&planner)
            .refresh_key_immutable(&driver)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Driver(_)));
    }
}
