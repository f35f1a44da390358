//! Table-Map 레지스트리
//!
//! Row 이벤트는 테이블 ID만 가지고 있으므로, 먼저 수신한 Table-Map 이벤트의
//! 컬럼 정의를 ID별로 보관합니다. 같은 ID로 새 Table-Map이 오면 통째로 교체합니다.

use crate::error::{CdcError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// binary 콜레이션 ID (BINARY/VARBINARY/BLOB)
pub const BINARY_COLLATION: u16 = 63;

/// MySQL 컬럼 타입 (Table-Map 메타데이터 정규화 후)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Decimal,
    Tiny,
    Short,
    Long,
    Float,
    Double,
    Null,
    Timestamp,
    LongLong,
    Int24,
    Date,
    Time,
    DateTime,
    Year,
    NewDate,
    Varchar,
    Bit,
    Timestamp2,
    DateTime2,
    Time2,
    Json,
    NewDecimal,
    Enum,
    Set,
    TinyBlob,
    MediumBlob,
    LongBlob,
    Blob,
    VarString,
    String,
    Geometry,
    Unknown(u8),
}

impl ColumnType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ColumnType::Decimal,
            1 => ColumnType::Tiny,
            2 => ColumnType::Short,
            3 => ColumnType::Long,
            4 => ColumnType::Float,
            5 => ColumnType::Double,
            6 => ColumnType::Null,
            7 => ColumnType::Timestamp,
            8 => ColumnType::LongLong,
            9 => ColumnType::Int24,
            10 => ColumnType::Date,
            11 => ColumnType::Time,
            12 => ColumnType::DateTime,
            13 => ColumnType::Year,
            14 => ColumnType::NewDate,
            15 => ColumnType::Varchar,
            16 => ColumnType::Bit,
            17 => ColumnType::Timestamp2,
            18 => ColumnType::DateTime2,
            19 => ColumnType::Time2,
            245 => ColumnType::Json,
            246 => ColumnType::NewDecimal,
            247 => ColumnType::Enum,
            248 => ColumnType::Set,
            249 => ColumnType::TinyBlob,
            250 => ColumnType::MediumBlob,
            251 => ColumnType::LongBlob,
            252 => ColumnType::Blob,
            253 => ColumnType::VarString,
            254 => ColumnType::String,
            255 => ColumnType::Geometry,
            other => ColumnType::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            ColumnType::Decimal => 0,
            ColumnType::Tiny => 1,
            ColumnType::Short => 2,
            ColumnType::Long => 3,
            ColumnType::Float => 4,
            ColumnType::Double => 5,
            ColumnType::Null => 6,
            ColumnType::Timestamp => 7,
            ColumnType::LongLong => 8,
            ColumnType::Int24 => 9,
            ColumnType::Date => 10,
            ColumnType::Time => 11,
            ColumnType::DateTime => 12,
            ColumnType::Year => 13,
            ColumnType::NewDate => 14,
            ColumnType::Varchar => 15,
            ColumnType::Bit => 16,
            ColumnType::Timestamp2 => 17,
            ColumnType::DateTime2 => 18,
            ColumnType::Time2 => 19,
            ColumnType::Json => 245,
            ColumnType::NewDecimal => 246,
            ColumnType::Enum => 247,
            ColumnType::Set => 248,
            ColumnType::TinyBlob => 249,
            ColumnType::MediumBlob => 250,
            ColumnType::LongBlob => 251,
            ColumnType::Blob => 252,
            ColumnType::VarString => 253,
            ColumnType::String => 254,
            ColumnType::Geometry => 255,
            ColumnType::Unknown(code) => *code,
        }
    }

    /// SIGNEDNESS 옵션 메타데이터가 비트를 할당하는 숫자 타입
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Tiny
                | ColumnType::Short
                | ColumnType::Int24
                | ColumnType::Long
                | ColumnType::LongLong
                | ColumnType::NewDecimal
                | ColumnType::Float
                | ColumnType::Double
        )
    }

    /// COLUMN_CHARSET 옵션 메타데이터가 콜레이션을 할당하는 문자 타입
    pub fn is_character(&self) -> bool {
        matches!(
            self,
            ColumnType::Varchar
                | ColumnType::VarString
                | ColumnType::String
                | ColumnType::TinyBlob
                | ColumnType::MediumBlob
                | ColumnType::LongBlob
                | ColumnType::Blob
        )
    }
}

/// 컬럼 하나의 디코딩 정보
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Table-Map에 기록된 원래 타입 코드
    pub type_code: u8,
    /// 정규화된 타입 (STRING 메타데이터의 ENUM/SET 반영)
    pub column_type: ColumnType,
    /// 타입별 메타데이터
    ///
    /// NEWDECIMAL은 `precision << 8 | scale`, STRING/ENUM/SET은 정규화된 패킹 길이,
    /// VARCHAR/BIT는 리틀 엔디언 2바이트 값, 1바이트 메타데이터는 그대로 담습니다.
    pub metadata: u16,
    pub unsigned: bool,
    pub nullable: bool,
    /// 문자 컬럼의 콜레이션 ID
    pub collation: Option<u16>,
    pub name: Option<String>,
    /// SET/ENUM 선언 순서의 레이블
    pub labels: Vec<String>,
}

impl ColumnDescriptor {
    pub fn new(type_code: u8, metadata: u16) -> Self {
        ColumnDescriptor {
            type_code,
            column_type: ColumnType::from_code(type_code),
            metadata,
            unsigned: false,
            nullable: true,
            collation: None,
            name: None,
            labels: Vec::new(),
        }
    }

    pub fn is_binary(&self) -> bool {
        self.collation == Some(BINARY_COLLATION)
    }
}

/// 테이블 ID 하나에 대한 Table-Map 정보
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMapEntry {
    pub table_id: u64,
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    /// 기본 키 컬럼 인덱스
    pub primary_key: Vec<usize>,
    /// 옵션 메타데이터로 컬럼 이름/부호 정보를 받았는지 여부
    pub has_optional_metadata: bool,
}

impl TableMapEntry {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// 컬럼 이름 (알 수 없으면 `col{N}`)
    pub fn column_name(&self, index: usize) -> String {
        self.columns
            .get(index)
            .and_then(|c| c.name.clone())
            .unwrap_or_else(|| format!("col{}", index))
    }

    /// 같은 테이블, 같은 컬럼 타입 배치인지 비교
    pub fn same_layout(&self, other: &TableMapEntry) -> bool {
        self.schema == other.schema
            && self.table == other.table
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.type_code == b.type_code && a.metadata == b.metadata)
    }

    /// 같은 테이블 ID의 이전 엔트리에서 외부 스키마 정보(이름, 부호, 레이블)를 옮겨 옵니다.
    ///
    /// 이 엔트리가 옵션 메타데이터로 받은 값은 그대로 둡니다.
    pub fn inherit_enrichment(&mut self, previous: &TableMapEntry) {
        let keep_signedness = self.has_optional_metadata;
        for (col, prev) in self.columns.iter_mut().zip(&previous.columns) {
            if col.name.is_none() {
                col.name = prev.name.clone();
            }
            if col.labels.is_empty() {
                col.labels = prev.labels.clone();
            }
            if !keep_signedness {
                col.unsigned = prev.unsigned;
            }
        }
        if self.primary_key.is_empty() {
            self.primary_key = previous.primary_key.clone();
        }
    }
}

/// 테이블 ID → Table-Map 엔트리
///
/// 하나의 스트림에서만 갱신되며, 제거는 하지 않습니다.
#[derive(Debug, Default)]
pub struct TableMapRegistry {
    entries: HashMap<u64, TableMapEntry>,
}

impl TableMapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 엔트리를 교체하고 이전 엔트리를 반환
    pub fn update(&mut self, table_id: u64, entry: TableMapEntry) -> Option<TableMapEntry> {
        self.entries.insert(table_id, entry)
    }

    pub fn describe(&self, table_id: u64) -> Result<&TableMapEntry> {
        self.entries
            .get(&table_id)
            .ok_or(CdcError::UnknownTable(table_id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(table_id: u64, table: &str, types: &[u8]) -> TableMapEntry {
        TableMapEntry {
            table_id,
            schema: "test".to_string(),
            table: table.to_string(),
            columns: types.iter().map(|&t| ColumnDescriptor::new(t, 0)).collect(),
            primary_key: Vec::new(),
            has_optional_metadata: false,
        }
    }

    #[test]
    fn test_unknown_table() {
        let registry = TableMapRegistry::new();
        match registry.describe(42) {
            Err(CdcError::UnknownTable(id)) => assert_eq!(id, 42),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_update_replaces_wholesale() {
        let mut registry = TableMapRegistry::new();
        assert!(registry.update(7, entry(7, "a", &[3, 3])).is_none());

        let previous = registry.update(7, entry(7, "b", &[8])).unwrap();
        assert_eq!(previous.table, "a");

        let current = registry.describe(7).unwrap();
        assert_eq!(current.table, "b");
        assert_eq!(current.column_count(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_same_layout_and_inherit() {
        let mut old = entry(1, "t", &[3, 254]);
        old.columns[0].name = Some("id".to_string());
        old.columns[0].unsigned = true;
        old.columns[1].labels = vec!["a".to_string()];

        let mut new = entry(2, "t", &[3, 254]);
        assert!(new.same_layout(&old));
        new.inherit_enrichment(&old);
        assert_eq!(new.column_name(0), "id");
        assert_eq!(new.column_name(1), "col1");
        assert!(new.columns[0].unsigned);
        assert_eq!(new.columns[1].labels, vec!["a".to_string()]);

        // 옵션 메타데이터로 받은 부호는 이전 값보다 우선
        let mut signed = entry(1, "t", &[3, 254]);
        signed.has_optional_metadata = true;
        signed.inherit_enrichment(&old);
        assert!(!signed.columns[0].unsigned);
        assert_eq!(signed.column_name(0), "id");

        let changed = entry(3, "t", &[3]);
        assert!(!changed.same_layout(&old));
    }

    #[test]
    fn test_column_type_codes() {
        for code in [0u8, 1, 9, 15, 19, 245, 246, 252, 254, 255] {
            assert_eq!(ColumnType::from_code(code).code(), code);
        }
        assert_eq!(ColumnType::from_code(20), ColumnType::Unknown(20));
        assert!(ColumnType::Blob.is_character());
        assert!(!ColumnType::Set.is_character());
        assert!(ColumnType::NewDecimal.is_numeric());
    }
}
