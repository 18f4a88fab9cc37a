//! PostgreSQL ACL source

use crate::config::{AclMapping, AuthzConfig, CredentialMapping, DatabaseSection};
use crate::error::{AuthzError, Result};
use crate::rule::{AclRow, CredentialRow};
use crate::source::AclSource;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info};

/// ACL and credential tables read through a pooled PostgreSQL connection
pub struct PostgresAclSource {
    pool: PgPool,
    rules_sql: String,
    credentials_sql: Option<String>,
}

impl PostgresAclSource {
    /// Build a source from the engine configuration.
    ///
    /// The pool connects lazily, so this performs no I/O: a database that is
    /// down at startup shows up as failed refresh cycles, not as a failed
    /// construction.
    ///
    /// # Example
    /// ```no_run
    /// use brokerguard_authz::{AuthzConfig, source::PostgresAclSource};
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = AuthzConfig::load("/etc/brokerguard/authz.toml")?;
    /// let source = PostgresAclSource::from_config(&config)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_config(config: &AuthzConfig) -> Result<Self> {
        let database = config.database.as_ref().ok_or_else(|| {
            AuthzError::Configuration("database.url must be configured".to_string())
        })?;

        let pool = Self::pool_options(database)
            .connect_lazy(&database.url)
            .map_err(|e| AuthzError::Configuration(format!("Invalid database url: {}", e)))?;

        Ok(Self::with_pool(
            pool,
            &config.acl_mapping()?,
            config.credential_mapping()?.as_ref(),
        ))
    }

    /// Build a source on an existing pool
    pub fn with_pool(
        pool: PgPool,
        acl: &AclMapping,
        credentials: Option<&CredentialMapping>,
    ) -> Self {
        let rules_sql = rules_query(acl);
        let credentials_sql = credentials.map(credentials_query);
        info!("ACL query: {}", rules_sql);

        Self {
            pool,
            rules_sql,
            credentials_sql,
        }
    }

    fn pool_options(database: &DatabaseSection) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(database.max_connections)
            .min_connections(database.min_connections)
            .acquire_timeout(Duration::from_secs(database.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(database.idle_timeout_secs))
    }

    /// Get database pool for advanced queries
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run one query on a connection scoped to this call.
    ///
    /// The connection goes back to the pool when it is dropped, which covers
    /// success, errors and the future being cancelled mid-query.
    async fn fetch_all(&self, sql: &str) -> Result<Vec<PgRow>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AuthzError::Database(format!("Failed to acquire connection: {}", e)))?;

        sqlx::query(sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| AuthzError::Database(format!("Query failed: {}", e)))
    }
}

#[async_trait]
impl AclSource for PostgresAclSource {
    async fn fetch_rules(&self) -> Result<Vec<AclRow>> {
        let rows = self.fetch_all(&self.rules_sql).await?;
        debug!("Fetched {} ACL rows", rows.len());

        rows.iter()
            .map(|row| {
                Ok(AclRow {
                    user_pattern: text(row, "user_pattern")?,
                    resource_type: text(row, "resource_type")?,
                    resource_pattern: text(row, "resource_pattern")?,
                    operation: text(row, "operation")?,
                })
            })
            .collect()
    }

    async fn fetch_credentials(&self) -> Result<Vec<CredentialRow>> {
        let sql = self.credentials_sql.as_deref().ok_or_else(|| {
            AuthzError::Configuration("authentication.user_table must be configured".to_string())
        })?;

        let rows = self.fetch_all(sql).await?;
        debug!("Fetched {} credential rows", rows.len());

        rows.iter()
            .map(|row| {
                Ok(CredentialRow {
                    username: text(row, "username")?,
                    password: text(row, "password")?,
                })
            })
            .collect()
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
    }
}

fn text(row: &PgRow, column: &str) -> Result<String> {
    row.try_get::<Option<String>, _>(column)
        .map_err(|e| AuthzError::RowMapping(format!("Column '{}': {}", column, e)))?
        .ok_or_else(|| AuthzError::RowMapping(format!("Column '{}' is NULL", column)))
}

fn rules_query(mapping: &AclMapping) -> String {
    format!(
        "SELECT {} AS user_pattern, {} AS resource_type, {} AS resource_pattern, {} AS operation FROM {}",
        mapping.user_pattern,
        mapping.resource_type,
        mapping.resource_pattern,
        mapping.operation,
        mapping.table
    )
}

fn credentials_query(mapping: &CredentialMapping) -> String {
    format!(
        "SELECT {} AS username, {} AS password FROM {}",
        mapping.username, mapping.password, mapping.table
    )
}
