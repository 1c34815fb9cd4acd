//! Cube schema fixtures for the scenario tests.
//!
//! [`CubeSchema`] renders an in-memory schema source string for the external
//! schema compiler. Clause arguments are spliced in verbatim and are not
//! validated here; a malformed clause surfaces as a compiler error
//! downstream.

/// Refresh key clause marking the cube as never stale
pub const IMMUTABLE_REFRESH_KEY: &str = "\
refreshKey: {
    immutable: true,
},";

/// An external rollup pre-aggregation over `count` by `createdAt`: daily
/// granularity, monthly partitions, scheduled refresh enabled.
pub const ROLLUP_PRE_AGGREGATION: &str = "\
countCreatedAt: {
    type: `rollup`,
    external: true,
    measureReferences: [count],
    timeDimensionReference: createdAt,
    granularity: `day`,
    partitionGranularity: `month`,
    scheduledRefresh: true,
},";

/// Same rollup, but refreshed incrementally on a rolling window: 1-day
/// cadence, 7-day update window.
pub const ROLLUP_PRE_AGGREGATION_INCREMENTAL: &str = "\
countCreatedAt: {
    type: `rollup`,
    external: true,
    measureReferences: [count],
    timeDimensionReference: createdAt,
    granularity: `day`,
    partitionGranularity: `month`,
    scheduledRefresh: true,
    refreshKey: {
        every: `1 day`,
        incremental: true,
        updateWindow: `7 day`,
    },
},";

/// Builder for a single-cube schema fixture: a `count` measure and an
/// `id`/`createdAt` dimension pair over `select * from <name>`.
#[derive(Debug, Clone, Default)]
pub struct CubeSchema {
    name: String,
    refresh_key: Option<String>,
    pre_aggregations: Option<String>,
}

impl CubeSchema {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            refresh_key: None,
            pre_aggregations: None,
        }
    }

    /// Splice a `refreshKey:` clause into the cube body
    pub fn with_refresh_key<S: Into<String>>(mut self, clause: S) -> Self {
        self.refresh_key = Some(clause.into());
        self
    }

    /// Splice the body of a `preAggregations:` block into the cube
    pub fn with_pre_aggregations<S: Into<String>>(mut self, clause: S) -> Self {
        self.pre_aggregations = Some(clause.into());
        self
    }

    /// Render the schema source string. Deterministic for equal inputs.
    pub fn render(&self) -> String {
        let name = &self.name;
        let refresh_key = self.refresh_key.as_deref().unwrap_or_default();
        let pre_aggregations = match self.pre_aggregations.as_deref() {
            Some(clause) => format!("preAggregations: {{\n{clause}\n}},"),
            None => String::new(),
        };

        format!(
            "cube(`{name}`, {{
    sql: `select * from {name}`,

    {refresh_key}

    measures: {{
        count: {{
            type: `count`,
        }},
    }},

    dimensions: {{
        id: {{
            sql: `id`,
            type: `number`,
            primaryKey: true,
        }},
        createdAt: {{
            sql: `created_at`,
            type: `time`,
        }},
    }},

    {pre_aggregations}
}});
"
        )
    }
}
