//! Query payload types for the Lattice load API.
//!
//! These mirror the JSON accepted by `POST /api/v1/load`: camelCase field
//! names on the wire, with empty collections omitted entirely so that
//! serialized payloads stay minimal and snapshot-friendly.

use serde::{Deserialize, Serialize};

/// A load query: measures and dimensions to return, optionally narrowed by
/// time dimensions and member filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub measures: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time_dimensions: Vec<TimeDimension>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl Query {
    /// Add a measure reference, e.g. `Orders.count`
    pub fn with_measure<S: Into<String>>(mut self, measure: S) -> Self {
        self.measures.push(measure.into());
        self
    }

    /// Add a dimension reference, e.g. `Orders.status`
    pub fn with_dimension<S: Into<String>>(mut self, dimension: S) -> Self {
        self.dimensions.push(dimension.into());
        self
    }

    pub fn with_time_dimension(mut self, time_dimension: TimeDimension) -> Self {
        self.time_dimensions.push(time_dimension);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Set the query timezone, e.g. `America/Los_Angeles`
    pub fn with_timezone<S: Into<String>>(mut self, timezone: S) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A time dimension with optional granularity and date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeDimension {
    pub dimension: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<[String; 2]>,
}

impl TimeDimension {
    pub fn new<S: Into<String>>(dimension: S) -> Self {
        Self {
            dimension: dimension.into(),
            granularity: None,
            date_range: None,
        }
    }

    /// Set the rollup granularity, e.g. `day`
    pub fn with_granularity<S: Into<String>>(mut self, granularity: S) -> Self {
        self.granularity = Some(granularity.into());
        self
    }

    pub fn with_date_range<S: Into<String>>(mut self, from: S, to: S) -> Self {
        self.date_range = Some([from.into(), to.into()]);
        self
    }
}

/// A member filter, e.g. `Orders.status contains ["shipped"]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub member: String,
    pub operator: FilterOperator,
    pub values: Vec<String>,
}

impl Filter {
    pub fn new<M, I, V>(member: M, operator: FilterOperator, values: I) -> Self
    where
        M: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            member: member.into(),
            operator,
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Filter operators understood by the load API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Equals,
    NotEquals,
    Set,
    NotSet,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn filter_query_wire_format() {
        let query = Query::default()
            .with_measure("Orders.count")
            .with_filter(Filter::new(
                "Orders.status",
                FilterOperator::Contains,
                ["es", "w"],
            ));

        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({
                "measures": ["Orders.count"],
                "filters": [{
                    "member": "Orders.status",
                    "operator": "contains",
                    "values": ["es", "w"],
                }],
            })
        );
    }

    #[test]
    fn time_dimension_wire_format() {
        let query = Query::default()
            .with_measure("cards.count")
            .with_time_dimension(
                TimeDimension::new("cards.createdAt")
                    .with_granularity("day")
                    .with_date_range("2016-12-30", "2017-01-05"),
            )
            .with_timezone("America/Los_Angeles");

        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({
                "measures": ["cards.count"],
                "timeDimensions": [{
                    "dimension": "cards.createdAt",
                    "granularity": "day",
                    "dateRange": ["2016-12-30", "2017-01-05"],
                }],
                "timezone": "America/Los_Angeles",
            })
        );
    }

    #[test]
    fn operators_use_camel_case_names() {
        for (operator, expected) in [
            (FilterOperator::Contains, "contains"),
            (FilterOperator::NotContains, "notContains"),
            (FilterOperator::StartsWith, "startsWith"),
            (FilterOperator::EndsWith, "endsWith"),
            (FilterOperator::NotEquals, "notEquals"),
        ] {
            assert_eq!(
                serde_json::to_value(operator).unwrap(),
                json!(expected),
                "wire name for {operator:?}"
            );
        }
    }

    #[test]
    fn query_round_trips() {
        let query = Query::default()
            .with_measure("OrdersPA.amount")
            .with_dimension("OrdersPA.status")
            .with_limit(100);

        let serialized = serde_json::to_string(&query).unwrap();
        let deserialized: Query = serde_json::from_str(&serialized).unwrap();
        assert_eq!(query, deserialized);
    }
}
