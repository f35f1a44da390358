//! MySQL Binlog 이벤트 타입 및 데이터 구조 정의

use crate::table_map::TableMapEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// MySQL Binlog 이벤트 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// 쿼리 이벤트 (DDL, BEGIN 등)
    Query,
    /// 로테이션 이벤트 (새 binlog 파일)
    Rotate,
    /// 포맷 디스크립션 이벤트 (서버 버전, 체크섬 알고리즘)
    FormatDescription,
    /// 트랜잭션 커밋
    Xid,
    /// 테이블 맵 이벤트 (스키마 정보)
    TableMap,
    WriteRowsV1,
    UpdateRowsV1,
    DeleteRowsV1,
    Heartbeat,
    /// Rows Query 이벤트 (원본 쿼리)
    RowsQuery,
    WriteRowsV2,
    UpdateRowsV2,
    DeleteRowsV2,
    /// GTID 이벤트 (Global Transaction ID)
    Gtid,
    AnonymousGtid,
    PreviousGtids,
    Other(u8),
}

impl EventType {
    pub fn from_u8(val: u8) -> Self {
        match val {
            2 => EventType::Query,
            4 => EventType::Rotate,
            15 => EventType::FormatDescription,
            16 => EventType::Xid,
            19 => EventType::TableMap,
            23 => EventType::WriteRowsV1,
            24 => EventType::UpdateRowsV1,
            25 => EventType::DeleteRowsV1,
            27 => EventType::Heartbeat,
            29 => EventType::RowsQuery,
            30 => EventType::WriteRowsV2,
            31 => EventType::UpdateRowsV2,
            32 => EventType::DeleteRowsV2,
            33 => EventType::Gtid,
            34 => EventType::AnonymousGtid,
            35 => EventType::PreviousGtids,
            other => EventType::Other(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            EventType::Query => 2,
            EventType::Rotate => 4,
            EventType::FormatDescription => 15,
            EventType::Xid => 16,
            EventType::TableMap => 19,
            EventType::WriteRowsV1 => 23,
            EventType::UpdateRowsV1 => 24,
            EventType::DeleteRowsV1 => 25,
            EventType::Heartbeat => 27,
            EventType::RowsQuery => 29,
            EventType::WriteRowsV2 => 30,
            EventType::UpdateRowsV2 => 31,
            EventType::DeleteRowsV2 => 32,
            EventType::Gtid => 33,
            EventType::AnonymousGtid => 34,
            EventType::PreviousGtids => 35,
            EventType::Other(code) => *code,
        }
    }

    pub fn is_row_event(&self) -> bool {
        matches!(self.kind(), EventKind::WriteRows | EventKind::UpdateRows | EventKind::DeleteRows)
    }

    /// v2 row 이벤트는 post-header 뒤에 extra-data 블록이 있음
    pub fn is_rows_v2(&self) -> bool {
        matches!(
            self,
            EventType::WriteRowsV2 | EventType::UpdateRowsV2 | EventType::DeleteRowsV2
        )
    }

    pub fn kind(&self) -> EventKind {
        match self {
            EventType::TableMap => EventKind::TableMap,
            EventType::WriteRowsV1 | EventType::WriteRowsV2 => EventKind::WriteRows,
            EventType::UpdateRowsV1 | EventType::UpdateRowsV2 => EventKind::UpdateRows,
            EventType::DeleteRowsV1 | EventType::DeleteRowsV2 => EventKind::DeleteRows,
            EventType::Query => EventKind::Query,
            EventType::Xid => EventKind::Xid,
            EventType::Rotate => EventKind::Rotate,
            EventType::Gtid | EventType::AnonymousGtid => EventKind::Gtid,
            _ => EventKind::Unknown,
        }
    }
}

/// 외부로 내보내는 이벤트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    TableMap,
    WriteRows,
    UpdateRows,
    DeleteRows,
    Query,
    Xid,
    Rotate,
    Gtid,
    Unknown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TableMap => "TABLE_MAP",
            EventKind::WriteRows => "WRITE_ROWS",
            EventKind::UpdateRows => "UPDATE_ROWS",
            EventKind::DeleteRows => "DELETE_ROWS",
            EventKind::Query => "QUERY",
            EventKind::Xid => "XID",
            EventKind::Rotate => "ROTATE",
            EventKind::Gtid => "GTID",
            EventKind::Unknown => "UNKNOWN",
        }
    }
}

/// Binlog 이벤트 헤더
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    /// 이벤트 타입스탬프 (초 단위)
    pub timestamp: u32,
    /// 이벤트 타입
    pub event_type: EventType,
    /// MySQL 서버 ID
    pub server_id: u32,
    /// 이벤트 길이 (헤더, 체크섬 포함)
    pub event_length: u32,
    /// 다음 이벤트 위치
    pub next_pos: u32,
    /// 이벤트 플래그
    pub flags: u16,
}

impl EventHeader {
    pub fn datetime(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.timestamp as i64, 0).unwrap_or_default()
    }
}

/// 디코딩된 컬럼 값
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DecodedValue {
    Null,
    SignedInt(i64),
    UnsignedInt(u64),
    Float(f32),
    Double(f64),
    /// 스케일만큼 소수 자리를 채운 정확한 10진 문자열
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    /// 선언 순서대로 쉼표로 연결한 SET 멤버
    Set(String),
    Bit(u64),
}

impl DecodedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DecodedValue::Null)
    }
}

/// 존재하는 컬럼 하나의 값
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowField {
    pub column_index: usize,
    pub name: String,
    pub value: DecodedValue,
}

/// 한 행 (존재 비트맵에 포함된 컬럼만)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub fields: Vec<RowField>,
}

impl Row {
    pub fn get(&self, name: &str) -> Option<&DecodedValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    pub fn get_index(&self, column_index: usize) -> Option<&DecodedValue> {
        self.fields
            .iter()
            .find(|f| f.column_index == column_index)
            .map(|f| &f.value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn to_map(&self) -> HashMap<String, DecodedValue> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.value.clone()))
            .collect()
    }
}

/// UPDATE의 변경 전/후 행
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowPair {
    pub before: Row,
    pub after: Row,
}

/// 테이블 ID가 가리키는 테이블
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub table_id: u64,
    pub schema: String,
    pub table: String,
}

impl From<&TableMapEntry> for TableDescriptor {
    fn from(entry: &TableMapEntry) -> Self {
        TableDescriptor {
            table_id: entry.table_id,
            schema: entry.schema.clone(),
            table: entry.table.clone(),
        }
    }
}

/// GTID 이벤트 데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GtidEventData {
    /// GTID 문자열 (format: uuid:sequence-number)
    pub gtid: String,
    pub sequence: u64,
    /// 커밋 플래그
    pub committed: bool,
}

/// 쿼리 이벤트 데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEventData {
    /// 스레드 ID
    pub thread_id: u32,
    /// 실행 시간 (초)
    pub exec_time: u32,
    pub error_code: u16,
    /// 데이터베이스명
    pub database: String,
    /// 쿼리 문자열
    pub query: String,
}

/// 회전 이벤트 데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotateEventData {
    /// 새 바이너리 로그 파일명
    pub next_binlog_name: String,
    /// 새 파일의 시작 위치
    pub position: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XidEventData {
    pub xid: u64,
}

/// 포맷 디스크립션 이벤트 데이터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescriptionData {
    pub binlog_version: u16,
    pub server_version: String,
    pub create_timestamp: u32,
    pub header_length: u8,
    /// 체크섬 알고리즘 (0 = 없음, 1 = CRC32), 구버전 서버는 None
    pub checksum_alg: Option<u8>,
}

/// 이벤트 종류별 데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventData {
    TableMap(TableMapEntry),
    /// WRITE_ROWS / DELETE_ROWS
    Rows(Vec<Row>),
    /// UPDATE_ROWS
    RowPairs(Vec<RowPair>),
    Query(QueryEventData),
    Xid(XidEventData),
    Rotate(RotateEventData),
    Gtid(GtidEventData),
    /// 디코딩하지 않은 이벤트의 원본 페이로드
    Unknown(Vec<u8>),
}

/// 완성된 Binlog 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinlogEvent {
    /// 이벤트 헤더
    pub header: EventHeader,
    pub kind: EventKind,
    /// Table-Map / Row 이벤트의 대상 테이블
    pub table: Option<TableDescriptor>,
    /// 이벤트 데이터
    pub data: EventData,
}

impl BinlogEvent {
    /// 행 단위 ChangeEvent 목록으로 변환
    ///
    /// Row 이벤트는 행마다 하나씩, DDL 쿼리는 하나의 이벤트가 됩니다.
    /// 나머지 이벤트는 빈 목록을 반환합니다.
    pub fn to_change_events(&self) -> Vec<ChangeEvent> {
        let timestamp = self.header.datetime();
        let (database, table) = match &self.table {
            Some(t) => (t.schema.clone(), t.table.clone()),
            None => (String::new(), String::new()),
        };

        let change = |op, before: Option<&Row>, after: Option<&Row>| ChangeEvent {
            gtid: None,
            op,
            timestamp,
            database: database.clone(),
            table: table.clone(),
            before: before.map(Row::to_map),
            after: after.map(Row::to_map),
            query: None,
        };

        match (&self.kind, &self.data) {
            (EventKind::WriteRows, EventData::Rows(rows)) => rows
                .iter()
                .map(|row| change(OperationType::Insert, None, Some(row)))
                .collect(),
            (EventKind::DeleteRows, EventData::Rows(rows)) => rows
                .iter()
                .map(|row| change(OperationType::Delete, Some(row), None))
                .collect(),
            (EventKind::UpdateRows, EventData::RowPairs(pairs)) => pairs
                .iter()
                .map(|p| change(OperationType::Update, Some(&p.before), Some(&p.after)))
                .collect(),
            (EventKind::Query, EventData::Query(q)) if is_ddl(&q.query) => vec![ChangeEvent {
                gtid: None,
                op: OperationType::Ddl,
                timestamp,
                database: q.database.clone(),
                table: String::new(),
                before: None,
                after: None,
                query: Some(q.query.clone()),
            }],
            _ => Vec::new(),
        }
    }
}

/// DDL 쿼리 감지
fn is_ddl(query: &str) -> bool {
    let upper = query.trim_start().to_uppercase();
    ["CREATE", "ALTER", "DROP", "TRUNCATE", "RENAME"]
        .iter()
        .any(|kw| upper.starts_with(kw))
}

/// CDC 변경 이벤트 (application-level view)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// GTID (있는 경우)
    pub gtid: Option<String>,
    /// 연산 타입 (INSERT, UPDATE, DELETE, DDL)
    pub op: OperationType,
    /// 타임스탬프
    pub timestamp: DateTime<Utc>,
    /// 데이터베이스명
    pub database: String,
    /// 테이블명
    pub table: String,
    /// 변경 전 데이터 (UPDATE/DELETE의 경우)
    pub before: Option<HashMap<String, DecodedValue>>,
    /// 변경 후 데이터 (INSERT/UPDATE의 경우)
    pub after: Option<HashMap<String, DecodedValue>>,
    /// 원본 쿼리 (DDL의 경우)
    pub query: Option<String>,
}

impl ChangeEvent {
    pub fn with_gtid(mut self, gtid: Option<String>) -> Self {
        self.gtid = gtid;
        self
    }
}

/// 변경 연산 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    Insert,
    Update,
    Delete,
    Ddl,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Insert => "INSERT",
            OperationType::Update => "UPDATE",
            OperationType::Delete => "DELETE",
            OperationType::Ddl => "DDL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(event_type: EventType) -> EventHeader {
        EventHeader {
            timestamp: 1_700_000_000,
            event_type,
            server_id: 1,
            event_length: 0,
            next_pos: 0,
            flags: 0,
        }
    }

    fn row(values: &[(&str, DecodedValue)]) -> Row {
        Row {
            fields: values
                .iter()
                .enumerate()
                .map(|(i, (name, value))| RowField {
                    column_index: i,
                    name: name.to_string(),
                    value: value.clone(),
                })
                .collect(),
        }
    }

    fn table() -> Option<TableDescriptor> {
        Some(TableDescriptor {
            table_id: 5,
            schema: "shop".to_string(),
            table: "orders".to_string(),
        })
    }

    #[test]
    fn test_event_type_codes() {
        for code in 0u8..=40 {
            assert_eq!(EventType::from_u8(code).code(), code);
        }
        assert_eq!(EventType::from_u8(30), EventType::WriteRowsV2);
        assert_eq!(EventType::from_u8(23).kind(), EventKind::WriteRows);
        assert!(EventType::from_u8(24).is_row_event());
        assert!(!EventType::from_u8(24).is_rows_v2());
        assert!(EventType::from_u8(32).is_rows_v2());
        assert_eq!(EventType::from_u8(15).kind(), EventKind::Unknown);
        assert_eq!(EventType::from_u8(99), EventType::Other(99));
    }

    #[test]
    fn test_write_rows_to_change_events() {
        let event = BinlogEvent {
            header: header(EventType::WriteRowsV2),
            kind: EventKind::WriteRows,
            table: table(),
            data: EventData::Rows(vec![
                row(&[("id", DecodedValue::SignedInt(1))]),
                row(&[("id", DecodedValue::SignedInt(2))]),
            ]),
        };

        let changes = event.to_change_events();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].op, OperationType::Insert);
        assert_eq!(changes[0].database, "shop");
        assert_eq!(changes[0].table, "orders");
        assert!(changes[0].before.is_none());
        assert_eq!(
            changes[1].after.as_ref().unwrap()["id"],
            DecodedValue::SignedInt(2)
        );
        assert_eq!(changes[0].timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_update_rows_to_change_events() {
        let event = BinlogEvent {
            header: header(EventType::UpdateRowsV2),
            kind: EventKind::UpdateRows,
            table: table(),
            data: EventData::RowPairs(vec![RowPair {
                before: row(&[("qty", DecodedValue::UnsignedInt(1))]),
                after: row(&[("qty", DecodedValue::UnsignedInt(3))]),
            }]),
        };

        let changes = event.to_change_events();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].op.as_str(), "UPDATE");
        assert_eq!(
            changes[0].before.as_ref().unwrap()["qty"],
            DecodedValue::UnsignedInt(1)
        );
        assert_eq!(
            changes[0].after.as_ref().unwrap()["qty"],
            DecodedValue::UnsignedInt(3)
        );
    }

    #[test]
    fn test_query_to_change_events() {
        let query = |q: &str| BinlogEvent {
            header: header(EventType::Query),
            kind: EventKind::Query,
            table: None,
            data: EventData::Query(QueryEventData {
                thread_id: 1,
                exec_time: 0,
                error_code: 0,
                database: "shop".to_string(),
                query: q.to_string(),
            }),
        };

        let ddl = query("  alter table orders add column note text").to_change_events();
        assert_eq!(ddl.len(), 1);
        assert_eq!(ddl[0].op, OperationType::Ddl);
        assert_eq!(ddl[0].database, "shop");

        assert!(query("BEGIN").to_change_events().is_empty());
        assert_eq!(query("TRUNCATE orders").to_change_events().len(), 1);
    }

    #[test]
    fn test_row_lookup() {
        let r = row(&[
            ("id", DecodedValue::SignedInt(1)),
            ("name", DecodedValue::Null),
        ]);
        assert_eq!(r.get("id"), Some(&DecodedValue::SignedInt(1)));
        assert!(r.get_index(1).unwrap().is_null());
        assert!(r.get("missing").is_none());
    }
}
