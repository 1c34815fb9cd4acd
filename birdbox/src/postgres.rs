//! [`SqlDriver`] implementation over `tokio-postgres`, used by the
//! refresh-key suites to execute invalidation statements against a real
//! database.

use async_trait::async_trait;
use serde_json::Value;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
use tracing::warn;

use crate::error::{Error, Result};
use crate::scenario::SqlDriver;

/// A live connection to a Postgres database
pub struct PostgresDriver {
    client: tokio_postgres::Client,
    connection: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for PostgresDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDriver").finish_non_exhaustive()
    }
}

impl PostgresDriver {
    /// Connect with a `tokio-postgres` connection string, e.g.
    /// `host=127.0.0.1 port=5432 user=postgres password=postgres`
    pub async fn connect(conn_str: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(conn_str, NoTls)
            .await
            .map_err(Error::driver)?;

        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("postgres connection error: {e}");
            }
        });

        Ok(Self { client, connection })
    }
}

#[async_trait]
impl SqlDriver for PostgresDriver {
    async fn query(&self, sql: &str, params: &[String]) -> Result<Vec<Value>> {
        let params: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows = self.client.query(sql, &params).await.map_err(Error::driver)?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn release(&self) -> Result<()> {
        self.connection.abort();
        Ok(())
    }
}

/// Best-effort conversion for assertion output; columns of unsupported
/// types come back as null.
fn row_to_json(row: &Row) -> Value {
    let mut object = serde_json::Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = match column.type_().name() {
            "bool" => row.try_get::<_, Option<bool>>(i).ok().flatten().map(Value::from),
            "int2" => row
                .try_get::<_, Option<i16>>(i)
                .ok()
                .flatten()
                .map(Value::from),
            "int4" => row
                .try_get::<_, Option<i32>>(i)
                .ok()
                .flatten()
                .map(Value::from),
            "int8" => row
                .try_get::<_, Option<i64>>(i)
                .ok()
                .flatten()
                .map(Value::from),
            "float4" => row
                .try_get::<_, Option<f32>>(i)
                .ok()
                .flatten()
                .map(|v| Value::from(f64::from(v))),
            "float8" => row
                .try_get::<_, Option<f64>>(i)
                .ok()
                .flatten()
                .map(Value::from),
            "text" | "varchar" | "bpchar" | "name" => row
                .try_get::<_, Option<String>>(i)
                .ok()
                .flatten()
                .map(Value::from),
            _ => None,
        };
        object.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    Value::Object(object)
}
