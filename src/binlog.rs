//! MySQL Binlog 이벤트 페이로드 파싱
//!
//! 각 이벤트:
//!   - Timestamp (4 bytes)
//!   - Type (1 byte)
//!   - Server ID (4 bytes)
//!   - Event Length (4 bytes)
//!   - Next Position (4 bytes)
//!   - Flags (2 bytes)
//!   - Event Data (variable)
//!   - Checksum (4 bytes, 선택)
//!
//! 페이로드 길이는 프레이밍 단계에서 이미 확정되므로, 여기서 발생하는 에러는
//! 해당 이벤트에만 국한됩니다 (`BinlogParseError`).

use crate::bitmap::{bitmap_byte_len, BitReader};
use crate::error::{CdcError, Result};
use crate::events::*;
use crate::table_map::{ColumnDescriptor, ColumnType, TableMapEntry};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use uuid::Uuid;

pub const EVENT_HEADER_SIZE: usize = 19;
pub const CHECKSUM_SIZE: usize = 4;

/// FDE 헤더 플래그: binlog 파일이 아직 쓰이는 중
pub const LOG_EVENT_BINLOG_IN_USE_F: u16 = 0x0001;

const SERVER_VERSION_LEN: usize = 50;

// Table-Map 옵션 메타데이터 필드 타입
const OPT_SIGNEDNESS: u8 = 1;
const OPT_DEFAULT_CHARSET: u8 = 2;
const OPT_COLUMN_CHARSET: u8 = 3;
const OPT_COLUMN_NAME: u8 = 4;
const OPT_SET_STR_VALUE: u8 = 5;
const OPT_ENUM_STR_VALUE: u8 = 6;
const OPT_SIMPLE_PRIMARY_KEY: u8 = 8;
const OPT_PRIMARY_KEY_WITH_PREFIX: u8 = 9;

/// 길이가 확정된 페이로드 위의 리더
///
/// 범위를 벗어난 읽기는 I/O 에러가 아니라 `BinlogParseError`가 됩니다.
pub struct PayloadReader<'a> {
    cursor: Cursor<&'a [u8]>,
    what: &'static str,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8], what: &'static str) -> Self {
        PayloadReader {
            cursor: Cursor::new(data),
            what,
        }
    }

    fn short(&self) -> CdcError {
        CdcError::BinlogParseError(format!(
            "{}: payload ends at offset {}",
            self.what,
            self.cursor.position()
        ))
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.cursor.read_u8().map_err(|_| self.short())
    }

    pub fn u16(&mut self) -> Result<u16> {
        self.cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| self.short())
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| self.short())
    }

    pub fn u48(&mut self) -> Result<u64> {
        self.cursor
            .read_u48::<LittleEndian>()
            .map_err(|_| self.short())
    }

    pub fn u64(&mut self) -> Result<u64> {
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| self.short())
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let data: &'a [u8] = *self.cursor.get_ref();
        let start = self.cursor.position() as usize;
        let slice = start
            .checked_add(n)
            .and_then(|end| data.get(start..end))
            .ok_or_else(|| self.short())?;
        self.cursor.set_position((start + n) as u64);
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.bytes(n).map(|_| ())
    }

    /// Length-Coded Binary 정수
    ///
    /// `0xfb`(NULL)는 허용하지 않습니다.
    pub fn lenenc(&mut self) -> Result<u64> {
        let first = self.u8()?;
        match first {
            0..=0xfa => Ok(first as u64),
            0xfc => Ok(self.u16()? as u64),
            0xfd => self
                .cursor
                .read_u24::<LittleEndian>()
                .map(|v| v as u64)
                .map_err(|_| self.short()),
            0xfe => self.u64(),
            other => Err(CdcError::BinlogParseError(format!(
                "{}: invalid length-encoded prefix {:#04x}",
                self.what, other
            ))),
        }
    }

    /// 길이 인코딩 문자열
    pub fn lenenc_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.lenenc()?;
        self.bytes(len as usize)
    }

    pub fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.cursor.position() as usize)
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let data: &'a [u8] = *self.cursor.get_ref();
        let start = (self.cursor.position() as usize).min(data.len());
        self.cursor.set_position(data.len() as u64);
        &data[start..]
    }

    pub fn cursor_mut(&mut self) -> &mut Cursor<&'a [u8]> {
        &mut self.cursor
    }
}

/// Binlog 이벤트 파서
pub struct BinlogParser;

impl BinlogParser {
    /// 이벤트 헤더 파싱
    pub fn parse_header(data: &[u8]) -> Result<EventHeader> {
        if data.len() < EVENT_HEADER_SIZE {
            return Err(CdcError::InvalidHeader(format!(
                "header needs {} bytes, got {}",
                EVENT_HEADER_SIZE,
                data.len()
            )));
        }

        let mut cursor = Cursor::new(data);

        let timestamp = cursor.read_u32::<LittleEndian>()?;
        let event_type = cursor.read_u8()?;
        let server_id = cursor.read_u32::<LittleEndian>()?;
        let event_length = cursor.read_u32::<LittleEndian>()?;
        let next_pos = cursor.read_u32::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;

        Ok(EventHeader {
            timestamp,
            event_type: EventType::from_u8(event_type),
            server_id,
            event_length,
            next_pos,
            flags,
        })
    }

    /// FORMAT_DESCRIPTION 이벤트 파싱 (15)
    ///
    /// `body`는 헤더 뒤의 모든 바이트(체크섬 트레일러 포함)입니다.
    pub fn parse_format_description(body: &[u8]) -> Result<FormatDescriptionData> {
        let mut reader = PayloadReader::new(body, "format description");

        let binlog_version = reader.u16()?;
        let version_bytes = reader.bytes(SERVER_VERSION_LEN)?;
        let end = version_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(version_bytes.len());
        let server_version = String::from_utf8_lossy(&version_bytes[..end]).to_string();
        let create_timestamp = reader.u32()?;
        let header_length = reader.u8()?;

        // 체크섬을 지원하는 서버는 [alg (1)][checksum (4)] 로 끝남
        let checksum_alg = if version_supports_checksum(&server_version)
            && reader.remaining() >= 1 + CHECKSUM_SIZE
        {
            Some(body[body.len() - CHECKSUM_SIZE - 1])
        } else {
            None
        };

        Ok(FormatDescriptionData {
            binlog_version,
            server_version,
            create_timestamp,
            header_length,
            checksum_alg,
        })
    }

    /// 테이블 맵 이벤트 파싱 (19)
    pub fn parse_table_map_event(data: &[u8]) -> Result<TableMapEntry> {
        let mut reader = PayloadReader::new(data, "table map");

        let table_id = reader.u48()?;
        let _flags = reader.u16()?;

        // 데이터베이스명 (길이 + 이름 + NUL)
        let db_len = reader.u8()? as usize;
        let schema = String::from_utf8_lossy(reader.bytes(db_len)?).to_string();
        reader.skip(1)?;

        // 테이블명 (길이 + 이름 + NUL)
        let tbl_len = reader.u8()? as usize;
        let table = String::from_utf8_lossy(reader.bytes(tbl_len)?).to_string();
        reader.skip(1)?;

        // 컬럼 타입
        let column_count = reader.lenenc()? as usize;
        let column_types = reader.bytes(column_count)?;

        // 컬럼 메타데이터
        let metadata = reader.lenenc_bytes()?;
        let mut meta_reader = PayloadReader::new(metadata, "table map metadata");
        let mut columns = Vec::with_capacity(column_count);
        for &type_code in column_types {
            columns.push(read_column_metadata(&mut meta_reader, type_code)?);
        }

        // nullable 비트맵
        let nullable_bytes = reader.bytes(bitmap_byte_len(column_count))?;
        let nullable = BitReader::new(nullable_bytes, column_count);
        for (i, col) in columns.iter_mut().enumerate() {
            col.nullable = nullable.get(i);
        }

        let mut entry = TableMapEntry {
            table_id,
            schema,
            table,
            columns,
            primary_key: Vec::new(),
            has_optional_metadata: false,
        };

        // MySQL 8.0 옵션 메타데이터
        while reader.remaining() > 0 {
            let field_type = reader.u8()?;
            let value = reader.lenenc_bytes()?;
            apply_optional_metadata(&mut entry, field_type, value)?;
        }

        Ok(entry)
    }

    /// QUERY 이벤트 파싱 (2)
    pub fn parse_query_event(data: &[u8]) -> Result<QueryEventData> {
        let mut reader = PayloadReader::new(data, "query");

        let thread_id = reader.u32()?;
        let exec_time = reader.u32()?;
        let db_len = reader.u8()? as usize;
        let error_code = reader.u16()?;
        let status_len = reader.u16()? as usize;

        // Status variables skip
        reader.skip(status_len)?;

        // 데이터베이스명 + NUL
        let database = String::from_utf8_lossy(reader.bytes(db_len)?).to_string();
        reader.skip(1)?;

        // 쿼리
        let query = String::from_utf8_lossy(reader.rest()).to_string();

        Ok(QueryEventData {
            thread_id,
            exec_time,
            error_code,
            database,
            query,
        })
    }

    /// ROTATE 이벤트 파싱 (4)
    pub fn parse_rotate_event(data: &[u8]) -> Result<RotateEventData> {
        let mut reader = PayloadReader::new(data, "rotate");

        let position = reader.u64()?;
        let filename_bytes = reader.rest();
        let end = filename_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(filename_bytes.len());

        Ok(RotateEventData {
            next_binlog_name: String::from_utf8_lossy(&filename_bytes[..end]).to_string(),
            position,
        })
    }

    /// GTID 이벤트 파싱 (33, 34)
    pub fn parse_gtid_event(data: &[u8]) -> Result<GtidEventData> {
        let mut reader = PayloadReader::new(data, "gtid");

        let flags = reader.u8()?;
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes.copy_from_slice(reader.bytes(16)?);
        let sequence = reader.u64()?;

        let uuid = Uuid::from_bytes(uuid_bytes);

        Ok(GtidEventData {
            gtid: format!("{}:{}", uuid.hyphenated(), sequence),
            sequence,
            committed: flags & 0x01 != 0,
        })
    }

    /// XID 이벤트 파싱 (16)
    pub fn parse_xid_event(data: &[u8]) -> Result<XidEventData> {
        let mut reader = PayloadReader::new(data, "xid");
        Ok(XidEventData { xid: reader.u64()? })
    }
}

/// 서버 버전 문자열이 체크섬 알고리즘 바이트를 싣는지 여부
///
/// MySQL 5.6.1 이상, MariaDB 5.3 이상
pub fn version_supports_checksum(server_version: &str) -> bool {
    let numbers: Vec<u32> = server_version
        .split(|c: char| !c.is_ascii_digit())
        .take(3)
        .map(|part| part.parse().unwrap_or(0))
        .collect();
    let version = (
        numbers.first().copied().unwrap_or(0),
        numbers.get(1).copied().unwrap_or(0),
        numbers.get(2).copied().unwrap_or(0),
    );

    if server_version.contains("MariaDB") {
        (version.0, version.1) >= (5, 3)
    } else {
        version >= (5, 6, 1)
    }
}

/// 컬럼 하나의 메타데이터를 읽고 타입을 정규화
fn read_column_metadata(reader: &mut PayloadReader<'_>, type_code: u8) -> Result<ColumnDescriptor> {
    let mut column = ColumnDescriptor::new(type_code, 0);

    match column.column_type {
        ColumnType::Float
        | ColumnType::Double
        | ColumnType::TinyBlob
        | ColumnType::MediumBlob
        | ColumnType::LongBlob
        | ColumnType::Blob
        | ColumnType::Json
        | ColumnType::Geometry
        | ColumnType::Time2
        | ColumnType::DateTime2
        | ColumnType::Timestamp2 => {
            column.metadata = reader.u8()? as u16;
        }
        ColumnType::Varchar | ColumnType::VarString | ColumnType::Bit => {
            column.metadata = reader.u16()?;
        }
        ColumnType::NewDecimal => {
            let precision = reader.u8()? as u16;
            let scale = reader.u8()? as u16;
            column.metadata = (precision << 8) | scale;
        }
        ColumnType::String | ColumnType::Enum | ColumnType::Set => {
            let real_type = reader.u8()?;
            let length = reader.u8()?;
            normalize_string_metadata(&mut column, real_type, length);
        }
        _ => {}
    }

    Ok(column)
}

/// STRING 메타데이터: 실제 타입이 ENUM/SET 이면 타입을 바꾸고,
/// 255바이트를 넘는 CHAR 길이는 상위 니블에 숨겨진 비트로 복원합니다.
fn normalize_string_metadata(column: &mut ColumnDescriptor, real_type: u8, length: u8) {
    match ColumnType::from_code(real_type) {
        ColumnType::Enum | ColumnType::Set if column.column_type == ColumnType::String => {
            column.column_type = ColumnType::from_code(real_type);
            column.metadata = length as u16;
        }
        _ if column.column_type != ColumnType::String => {
            column.metadata = length as u16;
        }
        _ if real_type & 0x30 != 0x30 => {
            column.metadata = length as u16 | ((((real_type & 0x30) ^ 0x30) as u16) << 4);
        }
        _ => {
            column.metadata = length as u16;
        }
    }
}

fn apply_optional_metadata(entry: &mut TableMapEntry, field_type: u8, value: &[u8]) -> Result<()> {
    let mut reader = PayloadReader::new(value, "table map optional metadata");

    match field_type {
        OPT_SIGNEDNESS => {
            let numeric: Vec<usize> = column_indexes(entry, |t| t.is_numeric());
            let bits = BitReader::msb_first(value, numeric.len());
            for (bit, &idx) in numeric.iter().enumerate() {
                entry.columns[idx].unsigned = bits.get(bit);
            }
            entry.has_optional_metadata = true;
        }
        OPT_DEFAULT_CHARSET => {
            let character = column_indexes(entry, |t| t.is_character());
            let default = reader.lenenc()? as u16;
            for &idx in &character {
                entry.columns[idx].collation = Some(default);
            }
            while reader.remaining() > 0 {
                let nth = reader.lenenc()? as usize;
                let collation = reader.lenenc()? as u16;
                if let Some(&idx) = character.get(nth) {
                    entry.columns[idx].collation = Some(collation);
                }
            }
        }
        OPT_COLUMN_CHARSET => {
            for idx in column_indexes(entry, |t| t.is_character()) {
                if reader.remaining() == 0 {
                    break;
                }
                entry.columns[idx].collation = Some(reader.lenenc()? as u16);
            }
        }
        OPT_COLUMN_NAME => {
            for col in entry.columns.iter_mut() {
                if reader.remaining() == 0 {
                    break;
                }
                col.name = Some(String::from_utf8_lossy(reader.lenenc_bytes()?).to_string());
            }
            entry.has_optional_metadata = true;
        }
        OPT_SET_STR_VALUE | OPT_ENUM_STR_VALUE => {
            let wanted = if field_type == OPT_SET_STR_VALUE {
                ColumnType::Set
            } else {
                ColumnType::Enum
            };
            for idx in column_indexes(entry, |t| *t == wanted) {
                if reader.remaining() == 0 {
                    break;
                }
                let count = reader.lenenc()? as usize;
                let mut labels = Vec::with_capacity(count);
                for _ in 0..count {
                    labels.push(String::from_utf8_lossy(reader.lenenc_bytes()?).to_string());
                }
                entry.columns[idx].labels = labels;
            }
        }
        OPT_SIMPLE_PRIMARY_KEY => {
            while reader.remaining() > 0 {
                entry.primary_key.push(reader.lenenc()? as usize);
            }
        }
        OPT_PRIMARY_KEY_WITH_PREFIX => {
            while reader.remaining() > 0 {
                entry.primary_key.push(reader.lenenc()? as usize);
                let _prefix = reader.lenenc()?;
            }
        }
        _ => {}
    }

    Ok(())
}

fn column_indexes(entry: &TableMapEntry, pred: impl Fn(&ColumnType) -> bool) -> Vec<usize> {
    entry
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| pred(&c.column_type))
        .map(|(i, _)| i)
        .collect()
}
