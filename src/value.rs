//! 컬럼 값 디코더
//!
//! Row 이미지의 한 컬럼을 Table-Map 디스크립터에 따라 `DecodedValue`로 바꿉니다.
//! 입력 바이트와 디스크립터만 보는 순수 함수이며, 성공하면 커서는 정확히 그 컬럼의
//! 끝에 위치합니다.

use crate::bitmap::BitReader;
use crate::error::{CdcError, Result};
use crate::events::DecodedValue;
use crate::table_map::{ColumnDescriptor, ColumnType};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// 자릿수(0~9) → 패킹된 바이트 수
const DIG2BYTES: [usize; 10] = [0, 1, 1, 2, 2, 3, 3, 4, 4, 4];
const DIGITS_PER_WORD: usize = 9;
const WORD_BYTES: usize = 4;

/// 컬럼 하나를 디코딩
///
/// NULL 컬럼은 호출하는 쪽에서 NULL 비트맵으로 처리하므로 여기로 오지 않습니다.
pub fn decode_value(
    cursor: &mut Cursor<&[u8]>,
    column: &ColumnDescriptor,
    index: usize,
) -> Result<DecodedValue> {
    let fault = |reason: String| CdcError::FieldDecode {
        column: index,
        type_code: column.type_code,
        reason,
    };
    let truncated = |_| fault("row image ends inside the column".to_string());
    let meta = column.metadata;

    let value = match column.column_type {
        ColumnType::Tiny => {
            if column.unsigned {
                DecodedValue::UnsignedInt(cursor.read_u8().map_err(truncated)? as u64)
            } else {
                DecodedValue::SignedInt(cursor.read_i8().map_err(truncated)? as i64)
            }
        }
        ColumnType::Short => {
            if column.unsigned {
                DecodedValue::UnsignedInt(cursor.read_u16::<LittleEndian>().map_err(truncated)? as u64)
            } else {
                DecodedValue::SignedInt(cursor.read_i16::<LittleEndian>().map_err(truncated)? as i64)
            }
        }
        ColumnType::Int24 => {
            if column.unsigned {
                DecodedValue::UnsignedInt(cursor.read_u24::<LittleEndian>().map_err(truncated)? as u64)
            } else {
                DecodedValue::SignedInt(cursor.read_i24::<LittleEndian>().map_err(truncated)? as i64)
            }
        }
        ColumnType::Long => {
            if column.unsigned {
                DecodedValue::UnsignedInt(cursor.read_u32::<LittleEndian>().map_err(truncated)? as u64)
            } else {
                DecodedValue::SignedInt(cursor.read_i32::<LittleEndian>().map_err(truncated)? as i64)
            }
        }
        ColumnType::LongLong => {
            if column.unsigned {
                DecodedValue::UnsignedInt(cursor.read_u64::<LittleEndian>().map_err(truncated)?)
            } else {
                DecodedValue::SignedInt(cursor.read_i64::<LittleEndian>().map_err(truncated)?)
            }
        }
        ColumnType::Float => DecodedValue::Float(cursor.read_f32::<LittleEndian>().map_err(truncated)?),
        ColumnType::Double => DecodedValue::Double(cursor.read_f64::<LittleEndian>().map_err(truncated)?),
        ColumnType::NewDecimal => {
            let precision = (meta >> 8) as usize;
            let scale = (meta & 0xff) as usize;
            let raw = take(cursor, decimal_byte_len(precision, scale))
                .ok_or_else(|| fault("row image ends inside the column".to_string()))?;
            DecodedValue::Decimal(decode_decimal(raw, precision, scale).map_err(fault)?)
        }
        ColumnType::Set => {
            let width = (meta & 0xff) as usize;
            if !(1..=8).contains(&width) {
                return Err(fault(format!("invalid set width {}", width)));
            }
            let raw = take(cursor, width)
                .ok_or_else(|| fault("row image ends inside the column".to_string()))?;
            if column.labels.is_empty() {
                let mask = raw.iter().rev().fold(0u64, |acc, b| (acc << 8) | *b as u64);
                DecodedValue::UnsignedInt(mask)
            } else {
                let bits = BitReader::new(raw, width * 8);
                let members: Vec<&str> = column
                    .labels
                    .iter()
                    .enumerate()
                    .filter(|(bit, _)| bits.get(*bit))
                    .map(|(_, label)| label.as_str())
                    .collect();
                DecodedValue::Set(members.join(","))
            }
        }
        ColumnType::Enum => {
            let width = (meta & 0xff) as usize;
            if !(1..=2).contains(&width) {
                return Err(fault(format!("invalid enum width {}", width)));
            }
            let idx = read_uint_le(cursor, width).map_err(truncated)?;
            if column.labels.is_empty() {
                DecodedValue::UnsignedInt(idx)
            } else if idx == 0 {
                DecodedValue::Text(String::new())
            } else {
                let label = column
                    .labels
                    .get(idx as usize - 1)
                    .ok_or_else(|| fault(format!("enum index {} out of range", idx)))?;
                DecodedValue::Text(label.clone())
            }
        }
        ColumnType::TinyBlob
        | ColumnType::MediumBlob
        | ColumnType::LongBlob
        | ColumnType::Blob
        | ColumnType::Json
        | ColumnType::Geometry => {
            let prefix = blob_prefix_width(column);
            if !(1..=4).contains(&prefix) {
                return Err(fault(format!("invalid length prefix width {}", prefix)));
            }
            let len = read_uint_le(cursor, prefix).map_err(truncated)? as usize;
            let bytes = take(cursor, len)
                .ok_or_else(|| fault(format!("declared length {} exceeds row image", len)))?;
            DecodedValue::Bytes(bytes.to_vec())
        }
        ColumnType::Varchar | ColumnType::VarString | ColumnType::String => {
            let prefix = if meta < 256 { 1 } else { 2 };
            let len = read_uint_le(cursor, prefix).map_err(truncated)? as usize;
            let bytes = take(cursor, len)
                .ok_or_else(|| fault(format!("declared length {} exceeds row image", len)))?;
            character_value(column, bytes)
        }
        ColumnType::Bit => {
            let bits = (meta >> 8) as usize * 8 + (meta & 0xff) as usize;
            let width = bits.div_ceil(8);
            if width > 8 {
                return Err(fault(format!("bit width {} too large", bits)));
            }
            DecodedValue::Bit(read_uint_be(cursor, width).map_err(truncated)?)
        }
        ColumnType::Null => DecodedValue::Null,
        ColumnType::Timestamp
        | ColumnType::Date
        | ColumnType::Time
        | ColumnType::DateTime
        | ColumnType::Year
        | ColumnType::NewDate
        | ColumnType::Timestamp2
        | ColumnType::DateTime2
        | ColumnType::Time2 => {
            let width = temporal_width(column.column_type, meta);
            let bytes = take(cursor, width)
                .ok_or_else(|| fault("row image ends inside the column".to_string()))?;
            DecodedValue::Bytes(bytes.to_vec())
        }
        ColumnType::Decimal => return Err(fault("pre-5.0 DECIMAL is not supported".to_string())),
        ColumnType::Unknown(code) => return Err(fault(format!("unsupported column type {}", code))),
    };

    Ok(value)
}

/// 문자 컬럼: UTF-8이고 binary 콜레이션이 아니면 텍스트
fn character_value(column: &ColumnDescriptor, bytes: &[u8]) -> DecodedValue {
    if column.is_binary() {
        return DecodedValue::Bytes(bytes.to_vec());
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => DecodedValue::Text(s.to_string()),
        Err(_) => DecodedValue::Bytes(bytes.to_vec()),
    }
}

/// BLOB 계열 길이 접두사 폭
fn blob_prefix_width(column: &ColumnDescriptor) -> usize {
    match column.column_type {
        ColumnType::TinyBlob if column.metadata == 0 => 1,
        ColumnType::MediumBlob if column.metadata == 0 => 3,
        ColumnType::LongBlob if column.metadata == 0 => 4,
        _ => column.metadata as usize,
    }
}

/// 시간 타입의 고정 폭 (fsp 포함)
fn temporal_width(column_type: ColumnType, fsp: u16) -> usize {
    let frac = (fsp as usize).div_ceil(2);
    match column_type {
        ColumnType::Year => 1,
        ColumnType::Date | ColumnType::NewDate | ColumnType::Time => 3,
        ColumnType::Timestamp => 4,
        ColumnType::DateTime => 8,
        ColumnType::Timestamp2 => 4 + frac,
        ColumnType::DateTime2 => 5 + frac,
        ColumnType::Time2 => 3 + frac,
        _ => 0,
    }
}

/// NEWDECIMAL(precision, scale) 의 바이트 폭
pub fn decimal_byte_len(precision: usize, scale: usize) -> usize {
    let intg = precision.saturating_sub(scale);
    let intg0 = intg / DIGITS_PER_WORD;
    let frac0 = scale / DIGITS_PER_WORD;
    intg0 * WORD_BYTES
        + DIG2BYTES[intg % DIGITS_PER_WORD]
        + frac0 * WORD_BYTES
        + DIG2BYTES[scale % DIGITS_PER_WORD]
}

/// 패킹된 NEWDECIMAL을 정확한 10진 문자열로 변환
///
/// 바이너리 부동소수점을 거치지 않으며, 소수 자리는 항상 `scale`개입니다.
pub fn decode_decimal(raw: &[u8], precision: usize, scale: usize) -> std::result::Result<String, String> {
    if scale > precision {
        return Err(format!("scale {} exceeds precision {}", scale, precision));
    }
    let size = decimal_byte_len(precision, scale);
    if raw.len() < size || size == 0 {
        return Err(format!("expected {} decimal bytes, got {}", size, raw.len()));
    }

    let mut buf = raw[..size].to_vec();
    let negative = buf[0] & 0x80 == 0;
    buf[0] ^= 0x80;
    if negative {
        for b in buf.iter_mut() {
            *b = !*b;
        }
    }

    let intg = precision - scale;
    let intg0x = intg % DIGITS_PER_WORD;
    let frac0x = scale % DIGITS_PER_WORD;
    let mut pos = 0;
    let mut next = |n: usize| -> u64 {
        let v = buf[pos..pos + n]
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64);
        pos += n;
        v
    };

    let mut int_part = String::new();
    if intg0x > 0 {
        int_part.push_str(&next(DIG2BYTES[intg0x]).to_string());
    }
    for _ in 0..intg / DIGITS_PER_WORD {
        int_part.push_str(&format!("{:09}", next(WORD_BYTES)));
    }
    let int_part = int_part.trim_start_matches('0');

    let mut frac_part = String::new();
    for _ in 0..scale / DIGITS_PER_WORD {
        frac_part.push_str(&format!("{:09}", next(WORD_BYTES)));
    }
    if frac0x > 0 {
        let v = next(DIG2BYTES[frac0x]);
        frac_part.push_str(&format!("{:0width$}", v, width = frac0x));
    }

    let mut out = String::with_capacity(precision + 2);
    if negative {
        out.push('-');
    }
    out.push_str(if int_part.is_empty() { "0" } else { int_part });
    if scale > 0 {
        out.push('.');
        out.push_str(&frac_part);
    }
    Ok(out)
}

fn take<'a>(cursor: &mut Cursor<&'a [u8]>, n: usize) -> Option<&'a [u8]> {
    let data: &'a [u8] = *cursor.get_ref();
    let start = cursor.position() as usize;
    let end = start.checked_add(n)?;
    let bytes = data.get(start..end)?;
    cursor.set_position(end as u64);
    Some(bytes)
}

fn read_uint_le(cursor: &mut Cursor<&[u8]>, width: usize) -> std::io::Result<u64> {
    cursor.read_uint::<LittleEndian>(width)
}

fn read_uint_be(cursor: &mut Cursor<&[u8]>, width: usize) -> std::io::Result<u64> {
    if width == 0 {
        return Ok(0);
    }
    cursor.read_uint::<BigEndian>(width)
}
