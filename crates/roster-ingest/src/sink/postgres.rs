//! Postgres sink
//!
//! One multi-row `INSERT` per batch, built with `QueryBuilder::push_values`.
//! Batches too large for a single statement's bind limit are split across
//! several statements inside one transaction, so a batch still lands
//! all-or-nothing.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use super::{RecordSink, SinkError};
use crate::record::{Employee, EMPLOYEE_FIELD_COUNT};

/// Postgres caps a statement at 65535 bind parameters
const MAX_BIND_PARAMS: usize = 65_535;

const ROWS_PER_STATEMENT: usize = MAX_BIND_PARAMS / EMPLOYEE_FIELD_COUNT;

#[derive(Debug, Clone)]
pub struct PgSink {
    pool: PgPool,
}

impl PgSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn insert_statement(records: &[Employee]) -> QueryBuilder<'_, Postgres> {
        let mut query_builder = QueryBuilder::new(
            r#"
            INSERT INTO employees (
                first_name, last_name, email, age, gender,
                department, company, salary, date_joined, is_active
            )
            "#,
        );

        query_builder.push_values(records.iter(), |mut b, record| {
            b.push_bind(&record.first_name)
                .push_bind(&record.last_name)
                .push_bind(&record.email)
                .push_bind(record.age)
                .push_bind(&record.gender)
                .push_bind(&record.department)
                .push_bind(&record.company)
                .push_bind(record.salary)
                .push_bind(&record.date_joined)
                .push_bind(record.is_active);
        });

        query_builder
    }
}

#[async_trait]
impl RecordSink for PgSink {
    async fn bulk_insert(&self, records: &[Employee]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }

        if records.len() <= ROWS_PER_STATEMENT {
            Self::insert_statement(records).build().execute(&self.pool).await?;
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in records.chunks(ROWS_PER_STATEMENT) {
            debug!(rows = chunk.len(), "Inserting employee chunk");
            Self::insert_statement(chunk).build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
