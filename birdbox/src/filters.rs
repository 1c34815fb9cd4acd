//! Static filter assertion tables for the driver suites.
//!
//! Three operator families, each with a handful of literal value-set
//! variants over `Orders.status`. Entries are independent of each other;
//! ordering only matters for snapshot identity.

use lattice_client::{Filter, FilterOperator, Query};

/// A named query payload to run through the HTTP client and
/// snapshot-compare
#[derive(Debug, Clone)]
pub struct FilterCase {
    pub name: &'static str,
    pub query: Query,
}

fn status_case(name: &'static str, operator: FilterOperator, values: &[&str]) -> FilterCase {
    FilterCase {
        name,
        query: Query::default()
            .with_measure("Orders.count")
            .with_filter(Filter::new("Orders.status", operator, values.iter().copied())),
    }
}

/// `contains` family. The single-letter cases widen the match; `["e"]` must
/// return a superset of `["es"]` on fixed data.
pub fn contains_cases() -> Vec<FilterCase> {
    use FilterOperator::Contains;
    vec![
        status_case("#1 Orders.status.contains e", Contains, &["e"]),
        status_case("#2 Orders.status.contains es", Contains, &["es"]),
        status_case("#3 Orders.status.contains es w", Contains, &["es", "w"]),
        status_case("#4 Orders.status.contains a", Contains, &["a"]),
    ]
}

/// `startsWith` family
pub fn starts_with_cases() -> Vec<FilterCase> {
    use FilterOperator::StartsWith;
    vec![
        status_case("#1 Orders.status.startsWith a", StartsWith, &["a"]),
        status_case("#2 Orders.status.startsWith n", StartsWith, &["n"]),
        status_case("#3 Orders.status.startsWith p", StartsWith, &["p"]),
        status_case("#4 Orders.status.startsWith sh", StartsWith, &["sh"]),
        status_case("#5 Orders.status.startsWith n p s", StartsWith, &["n", "p", "s"]),
    ]
}

/// `endsWith` family
pub fn ends_with_cases() -> Vec<FilterCase> {
    use FilterOperator::EndsWith;
    vec![
        status_case("#1 Orders.status.endsWith a", EndsWith, &["a"]),
        status_case("#2 Orders.status.endsWith w", EndsWith, &["w"]),
        status_case("#3 Orders.status.endsWith sed", EndsWith, &["sed"]),
        status_case("#4 Orders.status.endsWith ped", EndsWith, &["ped"]),
        status_case("#5 Orders.status.endsWith w sed ped", EndsWith, &["w", "sed", "ped"]),
    ]
}

/// The base rollup query asserted before the filter families
pub fn base_rollup_query() -> Query {
    Query::default()
        .with_measure("OrdersPA.amount2")
        .with_measure("OrdersPA.amount")
        .with_dimension("OrdersPA.id2")
        .with_dimension("OrdersPA.status2")
        .with_dimension("OrdersPA.id")
        .with_dimension("OrdersPA.status")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn families_have_the_expected_shape() {
        assert_eq!(contains_cases().len(), 4);
        assert_eq!(starts_with_cases().len(), 5);
        assert_eq!(ends_with_cases().len(), 5);

        for case in contains_cases()
            .into_iter()
            .chain(starts_with_cases())
            .chain(ends_with_cases())
        {
            assert_eq!(case.query.measures, vec!["Orders.count"], "{}", case.name);
            assert_eq!(case.query.filters.len(), 1, "{}", case.name);
            assert_eq!(case.query.filters[0].member, "Orders.status", "{}", case.name);
            assert!(!case.query.filters[0].values.is_empty(), "{}", case.name);
        }
    }

    #[test]
    fn case_names_are_unique_within_a_family() {
        for family in [contains_cases(), starts_with_cases(), ends_with_cases()] {
            let mut names: Vec<_> = family.iter().map(|c| c.name).collect();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), family.len());
        }
    }

    #[test]
    fn contains_payload_wire_format() {
        let case = &contains_cases()[2];

        assert_eq!(
            serde_json::to_value(&case.query).unwrap(),
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
    fn base_rollup_query_lists_rollup_members() {
        let query = base_rollup_query();
        assert_eq!(query.measures, vec!["OrdersPA.amount2", "OrdersPA.amount"]);
        assert_eq!(
            query.dimensions,
            vec![
                "OrdersPA.id2",
                "OrdersPA.status2",
                "OrdersPA.id",
                "OrdersPA.status"
            ]
        );
        assert!(query.filters.is_empty());
    }
}
