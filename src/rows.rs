//! Row 이벤트 디코더
//!
//! WRITE/UPDATE/DELETE_ROWS 페이로드 구조:
//!   - Table ID (6 bytes)
//!   - Flags (2 bytes)
//!   - Extra data (v2만, 2바이트 길이 + 데이터, 길이는 자신을 포함)
//!   - Column count (length-encoded)
//!   - Columns-present 비트맵 (UPDATE는 before/after 두 개)
//!   - Row 이미지들: NULL 비트맵 (존재 컬럼 수 기준) + 값

use crate::binlog::PayloadReader;
use crate::bitmap::{bitmap_byte_len, BitReader};
use crate::error::{CdcError, Result};
use crate::events::{DecodedValue, EventKind, EventType, Row, RowField, RowPair};
use crate::table_map::TableMapEntry;
use crate::value::decode_value;
use tracing::trace;

/// 디코딩된 Row 이벤트 본문
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedRows {
    /// WRITE_ROWS / DELETE_ROWS
    Rows(Vec<Row>),
    /// UPDATE_ROWS (before, after)
    Pairs(Vec<RowPair>),
}

impl DecodedRows {
    pub fn len(&self) -> usize {
        match self {
            DecodedRows::Rows(rows) => rows.len(),
            DecodedRows::Pairs(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct RowDecoder;

impl RowDecoder {
    /// 페이로드 앞 6바이트의 테이블 ID
    pub fn table_id(payload: &[u8]) -> Result<u64> {
        PayloadReader::new(payload, "rows").u48()
    }

    /// Row 이벤트 페이로드를 행 목록으로 디코딩
    ///
    /// 어떤 컬럼이든 디코딩에 실패하면 이벤트 전체가 실패합니다.
    pub fn decode(entry: &TableMapEntry, event_type: EventType, payload: &[u8]) -> Result<DecodedRows> {
        let kind = event_type.kind();
        if !event_type.is_row_event() {
            return Err(CdcError::BinlogParseError(format!(
                "{:?} is not a rows event",
                event_type
            )));
        }

        let mut reader = PayloadReader::new(payload, "rows");

        let table_id = reader.u48()?;
        if table_id != entry.table_id {
            return Err(CdcError::BinlogParseError(format!(
                "rows event for table {} decoded with table map {}",
                table_id, entry.table_id
            )));
        }
        let _flags = reader.u16()?;

        if event_type.is_rows_v2() {
            let extra_len = reader.u16()? as usize;
            if extra_len < 2 {
                return Err(CdcError::BinlogParseError(format!(
                    "invalid extra data length {}",
                    extra_len
                )));
            }
            reader.skip(extra_len - 2)?;
        }

        let column_count = reader.lenenc()? as usize;
        if column_count != entry.column_count() {
            return Err(CdcError::BinlogParseError(format!(
                "rows event has {} columns, table map {}.{} has {}",
                column_count,
                entry.schema,
                entry.table,
                entry.column_count()
            )));
        }

        let bitmap_len = bitmap_byte_len(column_count);
        let present = BitReader::new(reader.bytes(bitmap_len)?, column_count);

        let decoded = if kind == EventKind::UpdateRows {
            let present_after = BitReader::new(reader.bytes(bitmap_len)?, column_count);
            let mut pairs = Vec::new();
            while reader.remaining() > 0 {
                let start = reader.remaining();
                let before = decode_row(&mut reader, entry, &present)?;
                let after = decode_row(&mut reader, entry, &present_after)?;
                ensure_progress(&reader, start)?;
                pairs.push(RowPair { before, after });
            }
            DecodedRows::Pairs(pairs)
        } else {
            let mut rows = Vec::new();
            while reader.remaining() > 0 {
                let start = reader.remaining();
                rows.push(decode_row(&mut reader, entry, &present)?);
                ensure_progress(&reader, start)?;
            }
            DecodedRows::Rows(rows)
        };

        trace!(
            "Decoded {} row(s) for {}.{} (table id {})",
            decoded.len(),
            entry.schema,
            entry.table,
            table_id
        );

        Ok(decoded)
    }
}

/// 존재 컬럼이 없는 이미지는 바이트를 읽지 않으므로, 남은 바이트가 있으면 손상된 이벤트
fn ensure_progress(reader: &PayloadReader<'_>, start: usize) -> Result<()> {
    if reader.remaining() == start {
        return Err(CdcError::BinlogParseError(format!(
            "row image consumed no bytes with {} byte(s) left",
            start
        )));
    }
    Ok(())
}

/// Row 이미지 하나 디코딩
fn decode_row(reader: &mut PayloadReader<'_>, entry: &TableMapEntry, present: &BitReader<'_>) -> Result<Row> {
    let present_count = present.count_ones();
    let nulls = BitReader::new(reader.bytes(bitmap_byte_len(present_count))?, present_count);

    let mut fields = Vec::with_capacity(present_count);
    for (nth, column_index) in present.iter_ones().enumerate() {
        let value = if nulls.get(nth) {
            DecodedValue::Null
        } else {
            decode_value(reader.cursor_mut(), &entry.columns[column_index], column_index)?
        };
        fields.push(RowField {
            column_index,
            name: entry.column_name(column_index),
            value,
        });
    }

    Ok(Row { fields })
}
