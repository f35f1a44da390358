//! 외부 컬럼 스키마 보강
//!
//! 서버가 Table-Map 옵션 메타데이터(`binlog_row_metadata=FULL`)를 보내지 않으면
//! 컬럼 이름, 부호, SET/ENUM 레이블을 알 수 없습니다. 이 정보는
//! `ColumnSchemaProvider`로부터 받아 Table-Map 엔트리에 채웁니다.

use crate::error::Result;
use crate::table_map::{ColumnType, TableMapEntry};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

/// INFORMATION_SCHEMA.COLUMNS 한 행
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    /// 원본 COLUMN_TYPE (예: `int(10) unsigned`, `set('a','b')`)
    pub column_type: String,
    pub nullable: bool,
    pub is_key: bool,
    pub unsigned: bool,
    /// SET/ENUM 레이블
    pub labels: Vec<String>,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        let column_type = column_type.into();
        let (unsigned, labels) = parse_column_type(&column_type);
        ColumnSchema {
            name: name.into(),
            column_type,
            nullable: true,
            is_key: false,
            unsigned,
            labels,
        }
    }
}

fn unsigned_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bunsigned\b").expect("valid regex"))
}

fn set_enum_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)^\s*(?:set|enum)\s*\((.*)\)\s*$").expect("valid regex"))
}

fn label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"'((?:[^'\\]|''|\\.)*)'").expect("valid regex"))
}

/// COLUMN_TYPE 문자열에서 (unsigned 여부, SET/ENUM 레이블) 추출
pub fn parse_column_type(column_type: &str) -> (bool, Vec<String>) {
    if let Some(caps) = set_enum_re().captures(column_type) {
        let labels = label_re()
            .captures_iter(&caps[1])
            .map(|c| c[1].replace("''", "'").replace("\\'", "'"))
            .collect();
        return (false, labels);
    }
    (unsigned_re().is_match(column_type), Vec::new())
}

/// 테이블 컬럼 스키마 조회
#[async_trait]
pub trait ColumnSchemaProvider: Send + Sync {
    /// 서수 순서의 컬럼 목록 (테이블이 없으면 빈 목록)
    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnSchema>>;
}

/// 메모리 내 스키마
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaProvider {
    tables: HashMap<(String, String), Vec<ColumnSchema>>,
}

impl StaticSchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(
        mut self,
        schema: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<ColumnSchema>,
    ) -> Self {
        self.tables.insert((schema.into(), table.into()), columns);
        self
    }
}

#[async_trait]
impl ColumnSchemaProvider for StaticSchemaProvider {
    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnSchema>> {
        Ok(self
            .tables
            .get(&(schema.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// 조회한 스키마를 엔트리에 채움
///
/// 컬럼 수가 다르면(스키마가 바뀐 뒤의 binlog) 아무것도 바꾸지 않고 false.
/// Table-Map 옵션 메타데이터로 받은 값은 덮어쓰지 않습니다.
pub fn enrich_entry(entry: &mut TableMapEntry, columns: &[ColumnSchema]) -> bool {
    if columns.len() != entry.columns.len() {
        if !columns.is_empty() {
            warn!(
                "Schema of {}.{} has {} columns but the table map has {}; skipping enrichment",
                entry.schema,
                entry.table,
                columns.len(),
                entry.columns.len()
            );
        }
        return false;
    }

    let from_table_map = entry.has_optional_metadata;
    for (col, schema) in entry.columns.iter_mut().zip(columns) {
        if col.name.is_none() {
            col.name = Some(schema.name.clone());
        }
        if !from_table_map && col.column_type.is_numeric() {
            col.unsigned = schema.unsigned;
        }
        if col.labels.is_empty() && matches!(col.column_type, ColumnType::Set | ColumnType::Enum) {
            col.labels = schema.labels.clone();
        }
    }
    if entry.primary_key.is_empty() {
        entry.primary_key = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_key)
            .map(|(i, _)| i)
            .collect();
    }
    true
}
