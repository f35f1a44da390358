//! 테스트용 binlog 이벤트 인코더

use crate::framer::BINLOG_MAGIC;

const DIG2BYTES: [usize; 10] = [0, 1, 1, 2, 2, 3, 3, 4, 4, 4];

/// 10진 문자열을 NEWDECIMAL 패킹 형식으로 인코딩
pub fn encode_decimal(text: &str, precision: usize, scale: usize) -> Vec<u8> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (int_digits, frac_digits) = digits.split_once('.').unwrap_or((digits, ""));
    let int_digits = int_digits.trim_start_matches('0');

    let intg = precision - scale;
    let int_padded = format!("{:0>width$}", int_digits, width = intg);
    let frac_padded = format!("{:0<width$}", frac_digits, width = scale);

    let mut out = Vec::new();
    let lead = intg % 9;
    if lead > 0 {
        push_be(&mut out, int_padded[..lead].parse().unwrap(), DIG2BYTES[lead]);
    }
    for chunk in int_padded.as_bytes()[lead..].chunks(9) {
        push_be(&mut out, std::str::from_utf8(chunk).unwrap().parse().unwrap(), 4);
    }
    let frac_words = scale / 9;
    for chunk in frac_padded.as_bytes()[..frac_words * 9].chunks(9) {
        push_be(&mut out, std::str::from_utf8(chunk).unwrap().parse().unwrap(), 4);
    }
    let tail = scale % 9;
    if tail > 0 {
        push_be(&mut out, frac_padded[frac_words * 9..].parse().unwrap(), DIG2BYTES[tail]);
    }

    if negative {
        for b in out.iter_mut() {
            *b = !*b;
        }
    }
    out[0] ^= 0x80;
    out
}

fn push_be(out: &mut Vec<u8>, value: u64, width: usize) {
    out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
}

/// 길이 인코딩 정수
pub fn lenenc(value: u64) -> Vec<u8> {
    match value {
        0..=0xfa => vec![value as u8],
        0xfb..=0xffff => {
            let mut v = vec![0xfc];
            v.extend_from_slice(&(value as u16).to_le_bytes());
            v
        }
        0x10000..=0xff_ffff => {
            let mut v = vec![0xfd];
            v.extend_from_slice(&(value as u32).to_le_bytes()[..3]);
            v
        }
        _ => {
            let mut v = vec![0xfe];
            v.extend_from_slice(&value.to_le_bytes());
            v
        }
    }
}

/// LSB 우선 비트맵
pub fn bitmap(bits: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; bits.len().div_ceil(8)];
    for (i, &set) in bits.iter().enumerate() {
        if set {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    out
}

/// 헤더 + 페이로드 (+ CRC32) 로 완성된 이벤트
pub fn event_bytes(event_type: u8, payload: &[u8], with_checksum: bool) -> Vec<u8> {
    event_bytes_at(event_type, payload, with_checksum, 0)
}

pub fn event_bytes_at(event_type: u8, payload: &[u8], with_checksum: bool, next_pos: u32) -> Vec<u8> {
    let total = 19 + payload.len() + if with_checksum { 4 } else { 0 };
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&1_700_000_000u32.to_le_bytes());
    out.push(event_type);
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&next_pos.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(payload);
    if with_checksum {
        let crc = crc32fast::hash(&out);
        out.extend_from_slice(&crc.to_le_bytes());
    }
    out
}

/// binlog 파일 매직 + 이벤트들
pub fn binlog_file(events: &[Vec<u8>]) -> Vec<u8> {
    let mut out = BINLOG_MAGIC.to_vec();
    for e in events {
        out.extend_from_slice(e);
    }
    out
}

/// FORMAT_DESCRIPTION_EVENT 페이로드 (checksum_alg가 있으면 5.6.1+ 형식)
pub fn fde_payload(server_version: &str, checksum_alg: Option<u8>) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&4u16.to_le_bytes());
    let mut version = [0u8; 50];
    version[..server_version.len()].copy_from_slice(server_version.as_bytes());
    out.extend_from_slice(&version);
    out.extend_from_slice(&0u32.to_le_bytes());
    out.push(19);
    // post-header 길이 배열
    out.extend_from_slice(&[0u8; 40]);
    if let Some(alg) = checksum_alg {
        out.push(alg);
    }
    out
}

/// Table-Map 컬럼 정의
pub struct TestColumn {
    pub type_code: u8,
    pub metadata: Vec<u8>,
    pub nullable: bool,
}

pub fn col(type_code: u8, metadata: &[u8]) -> TestColumn {
    TestColumn {
        type_code,
        metadata: metadata.to_vec(),
        nullable: true,
    }
}

/// TABLE_MAP_EVENT 페이로드
pub fn table_map_payload(
    table_id: u64,
    schema: &str,
    table: &str,
    columns: &[TestColumn],
    optional_metadata: &[u8],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&table_id.to_le_bytes()[..6]);
    out.extend_from_slice(&1u16.to_le_bytes());
    out.push(schema.len() as u8);
    out.extend_from_slice(schema.as_bytes());
    out.push(0);
    out.push(table.len() as u8);
    out.extend_from_slice(table.as_bytes());
    out.push(0);
    out.extend(lenenc(columns.len() as u64));
    out.extend(columns.iter().map(|c| c.type_code));
    let meta: Vec<u8> = columns.iter().flat_map(|c| c.metadata.clone()).collect();
    out.extend(lenenc(meta.len() as u64));
    out.extend(meta);
    let nullable: Vec<bool> = columns.iter().map(|c| c.nullable).collect();
    out.extend(bitmap(&nullable));
    out.extend_from_slice(optional_metadata);
    out
}

/// 옵션 메타데이터 TLV 하나
pub fn tlv(field_type: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![field_type];
    out.extend(lenenc(value.len() as u64));
    out.extend_from_slice(value);
    out
}

/// Row 이미지 하나: NULL 비트맵 + 값 (None = NULL)
pub fn row_image(values: &[Option<Vec<u8>>]) -> Vec<u8> {
    let nulls: Vec<bool> = values.iter().map(|v| v.is_none()).collect();
    let mut out = bitmap(&nulls);
    for v in values.iter().flatten() {
        out.extend_from_slice(v);
    }
    out
}

/// WRITE/DELETE/UPDATE_ROWS 페이로드
///
/// `changed`가 있으면 UPDATE 형식(두 번째 존재 비트맵)으로 만듭니다.
pub fn rows_payload(
    table_id: u64,
    v2: bool,
    column_count: usize,
    present: &[bool],
    changed: Option<&[bool]>,
    images: &[Vec<u8>],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&table_id.to_le_bytes()[..6]);
    out.extend_from_slice(&1u16.to_le_bytes());
    if v2 {
        out.extend_from_slice(&2u16.to_le_bytes());
    }
    out.extend(lenenc(column_count as u64));
    out.extend(bitmap(present));
    if let Some(changed) = changed {
        out.extend(bitmap(changed));
    }
    for image in images {
        out.extend_from_slice(image);
    }
    out
}

pub fn query_payload(database: &str, query: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&7u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.push(database.len() as u8);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(database.as_bytes());
    out.push(0);
    out.extend_from_slice(query.as_bytes());
    out
}
