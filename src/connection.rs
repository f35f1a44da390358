//! MySQL 데이터베이스 연결 관리
//!
//! binlog 바이트 스트림 자체는 외부에서 받습니다. 이 연결은 Table-Map에 없는
//! 컬럼 정보(이름, 부호, SET/ENUM 레이블)를 INFORMATION_SCHEMA에서 조회하는 데만 씁니다.

use crate::error::{CdcError, Result};
use crate::schema::{ColumnSchema, ColumnSchemaProvider};
use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Opts, OptsBuilder, Pool};
use std::time::Duration;
use tracing::debug;

/// MySQL 연결 설정
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
    pub timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            hostname: "localhost".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            database: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ConnectionConfig {
    pub fn new(hostname: impl Into<String>, username: impl Into<String>) -> Self {
        ConnectionConfig {
            hostname: hostname.into(),
            username: username.into(),
            ..Default::default()
        }
    }

    fn build_opts(&self) -> Opts {
        OptsBuilder::default()
            .ip_or_hostname(self.hostname.clone())
            .tcp_port(self.port)
            .user(Some(self.username.clone()))
            .pass(Some(self.password.clone()))
            .db_name(self.database.clone())
            .wait_timeout(Some(self.timeout.as_secs() as usize))
            .into()
    }
}

/// MySQL 연결 풀 래퍼
pub struct MySqlConnection {
    pool: Pool,
    config: ConnectionConfig,
}

impl MySqlConnection {
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        let pool = Pool::new(config.build_opts());

        // 연결 가능 여부를 먼저 확인
        let conn = tokio::time::timeout(config.timeout, pool.get_conn())
            .await
            .map_err(|_| {
                CdcError::ConnectionError(format!(
                    "Timed out connecting to {}:{}",
                    config.hostname, config.port
                ))
            })?
            .map_err(|e| CdcError::ConnectionError(format!("Failed to connect to MySQL: {}", e)))?;
        drop(conn);

        Ok(MySqlConnection { pool, config })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// 변수 조회
    pub async fn get_variable(&self, name: &str) -> Result<Option<String>> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| CdcError::ConnectionError(e.to_string()))?;
        let result: Vec<(String, String)> = conn
            .exec("SHOW GLOBAL VARIABLES LIKE ?", (name,))
            .await
            .map_err(|e| CdcError::QueryError(format!("Failed to query {}: {}", name, e)))?;

        Ok(result.into_iter().next().map(|(_, v)| v))
    }

    /// Binlog 형식 확인 (ROW, STATEMENT, MIXED)
    pub async fn get_binlog_format(&self) -> Result<String> {
        self.get_variable("binlog_format")
            .await?
            .ok_or_else(|| CdcError::QueryError("Binlog format not found".to_string()))
    }

    /// 테이블 스키마 조회
    pub async fn get_table_schema(&self, database: &str, table: &str) -> Result<Vec<ColumnSchema>> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| CdcError::ConnectionError(e.to_string()))?;

        let result: Vec<(String, String, String, String)> = conn
            .exec(
                "SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_KEY \
                 FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
                 ORDER BY ORDINAL_POSITION",
                (database, table),
            )
            .await
            .map_err(|e| CdcError::QueryError(format!("Failed to query table schema: {}", e)))?;

        debug!("Loaded {} column(s) for {}.{}", result.len(), database, table);

        Ok(result
            .into_iter()
            .map(|(name, column_type, is_nullable, column_key)| ColumnSchema {
                nullable: is_nullable == "YES",
                is_key: column_key == "PRI",
                ..ColumnSchema::new(name, column_type)
            })
            .collect())
    }

    pub async fn close(self) -> Result<()> {
        self.pool
            .disconnect()
            .await
            .map_err(|e| CdcError::ConnectionError(e.to_string()))
    }
}

#[async_trait]
impl ColumnSchemaProvider for MySqlConnection {
    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnSchema>> {
        self.get_table_schema(schema, table).await
    }
}
