//! 이벤트 프레이머
//!
//! 바이트 스트림(binlog 파일 또는 이미 인증된 복제 연결)을 이벤트 단위로 자릅니다.
//! 이벤트 길이가 여러 번의 read에 걸쳐 있어도 완전한 이벤트가 모일 때까지 버퍼링하며,
//! 부분 이벤트는 절대 내보내지 않습니다.

use crate::binlog::{BinlogParser, CHECKSUM_SIZE, EVENT_HEADER_SIZE, LOG_EVENT_BINLOG_IN_USE_F};
use crate::error::{CdcError, Result};
use crate::events::{EventHeader, EventType};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

/// binlog 파일 매직 넘버 (".bin")
pub const BINLOG_MAGIC: [u8; 4] = [0xfe, 0x62, 0x69, 0x6e];

/// 이벤트 하나의 최대 크기 (MySQL max_allowed_packet 상한)
pub const DEFAULT_MAX_EVENT_SIZE: usize = 1 << 30;

const READ_CHUNK: usize = 16 * 1024;

/// 이벤트 체크섬 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumMode {
    /// 트레일러 없음
    None,
    /// 모든 이벤트에 CRC32 트레일러
    Crc32,
    /// FORMAT_DESCRIPTION 이벤트에서 알고리즘 감지
    Auto,
}

/// 프레이머 설정
#[derive(Debug, Clone)]
pub struct FramerConfig {
    pub checksum: ChecksumMode,
    /// 트레일러가 있을 때 CRC32 검증 여부
    pub verify_checksum: bool,
    /// 스트림이 binlog 파일 매직으로 시작하는지
    pub expect_magic: bool,
    pub max_event_size: usize,
    /// Auto 모드에서 첫 FDE 이전 이벤트(복제 연결의 가짜 Rotate)에 CRC32 트레일러가 붙는지.
    /// 연결 쪽에서 `@master_binlog_checksum` 협상 결과로 설정합니다.
    pub negotiated_crc32: bool,
}

impl Default for FramerConfig {
    fn default() -> Self {
        FramerConfig {
            checksum: ChecksumMode::Auto,
            verify_checksum: true,
            expect_magic: false,
            max_event_size: DEFAULT_MAX_EVENT_SIZE,
            negotiated_crc32: false,
        }
    }
}

impl FramerConfig {
    /// binlog 파일용 설정
    pub fn binlog_file() -> Self {
        FramerConfig {
            expect_magic: true,
            ..Default::default()
        }
    }
}

/// 프레이밍된 이벤트 (체크섬 트레일러 제외)
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub header: EventHeader,
    pub payload: Bytes,
    pub checksum: Option<u32>,
    /// 스트림 시작 기준 이벤트 오프셋
    pub position: u64,
}

/// 비동기 바이트 스트림 → 이벤트
pub struct EventFramer<R> {
    reader: R,
    buf: BytesMut,
    config: FramerConfig,
    /// 마지막 FDE 기준으로 일반 이벤트에 트레일러가 붙는지
    checksum_active: bool,
    magic_checked: bool,
    position: u64,
}

impl<R: AsyncRead + Unpin> EventFramer<R> {
    pub fn new(reader: R, config: FramerConfig) -> Self {
        let checksum_active = match config.checksum {
            ChecksumMode::None => false,
            ChecksumMode::Crc32 => true,
            ChecksumMode::Auto => config.negotiated_crc32,
        };
        let magic_checked = !config.expect_magic;
        EventFramer {
            reader,
            buf: BytesMut::with_capacity(READ_CHUNK),
            config,
            checksum_active,
            magic_checked,
            position: 0,
        }
    }

    /// 스트림 오프셋 (다음 이벤트의 시작 위치)
    pub fn position(&self) -> u64 {
        self.position
    }

    /// 다음 이벤트
    ///
    /// 이벤트 경계에서 스트림이 끝나면 `Ok(None)`, 이벤트 도중에 끝나면
    /// `TruncatedStream`을 반환합니다.
    pub async fn next_event(&mut self) -> Result<Option<RawEvent>> {
        if !self.magic_checked {
            if !self.fill(BINLOG_MAGIC.len()).await? {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(CdcError::InvalidHeader(
                    "stream ends before the binlog magic number".to_string(),
                ));
            }
            if self.buf[..BINLOG_MAGIC.len()] != BINLOG_MAGIC {
                return Err(CdcError::InvalidHeader(format!(
                    "invalid binlog magic number {:02x?}",
                    &self.buf[..BINLOG_MAGIC.len()]
                )));
            }
            let _ = self.buf.split_to(BINLOG_MAGIC.len());
            self.position += BINLOG_MAGIC.len() as u64;
            self.magic_checked = true;
        }

        if !self.fill(EVENT_HEADER_SIZE).await? {
            if self.buf.is_empty() {
                return Ok(None);
            }
            return Err(CdcError::TruncatedStream(format!(
                "{} byte(s) of an event header at offset {}",
                self.buf.len(),
                self.position
            )));
        }

        let header = BinlogParser::parse_header(&self.buf[..EVENT_HEADER_SIZE])?;
        let length = header.event_length as usize;
        let is_fde = header.event_type == EventType::FormatDescription;

        let min_length = if self.checksum_active && !is_fde {
            EVENT_HEADER_SIZE + CHECKSUM_SIZE
        } else {
            EVENT_HEADER_SIZE
        };
        if length < min_length || length > self.config.max_event_size {
            return Err(CdcError::InvalidHeader(format!(
                "implausible event length {} for {:?} at offset {}",
                length, header.event_type, self.position
            )));
        }

        if !self.fill(length).await? {
            return Err(CdcError::TruncatedStream(format!(
                "{:?} event at offset {} declares {} bytes, stream ended after {}",
                header.event_type,
                self.position,
                length,
                self.buf.len()
            )));
        }

        let frame = self.buf.split_to(length).freeze();
        let position = self.position;
        self.position += length as u64;

        let (has_trailer, verify) = if is_fde {
            self.on_format_description(&frame[EVENT_HEADER_SIZE..])?
        } else {
            (self.checksum_active, self.checksum_active)
        };

        if !has_trailer {
            trace!("Framed {:?} ({} bytes) at {}", header.event_type, length, position);
            return Ok(Some(RawEvent {
                payload: frame.slice(EVENT_HEADER_SIZE..),
                header,
                checksum: None,
                position,
            }));
        }

        if length < EVENT_HEADER_SIZE + CHECKSUM_SIZE {
            return Err(CdcError::InvalidHeader(format!(
                "event length {} leaves no room for a checksum at offset {}",
                length, position
            )));
        }

        let body_end = length - CHECKSUM_SIZE;
        let mut trailer = [0u8; CHECKSUM_SIZE];
        trailer.copy_from_slice(&frame[body_end..]);
        let expected = u32::from_le_bytes(trailer);

        if verify && self.config.verify_checksum {
            let actual = event_crc32(&frame[..body_end], &header, is_fde);
            if actual != expected {
                return Err(CdcError::ChecksumMismatch { expected, actual });
            }
        }

        trace!("Framed {:?} ({} bytes) at {}", header.event_type, length, position);
        Ok(Some(RawEvent {
            payload: frame.slice(EVENT_HEADER_SIZE..body_end),
            header,
            checksum: Some(expected),
            position,
        }))
    }

    /// FDE 처리: (이 FDE에 트레일러가 있는지, CRC32로 검증할지)
    fn on_format_description(&mut self, body: &[u8]) -> Result<(bool, bool)> {
        match self.config.checksum {
            ChecksumMode::None => Ok((false, false)),
            ChecksumMode::Crc32 => Ok((true, true)),
            ChecksumMode::Auto => {
                let fde = BinlogParser::parse_format_description(body).map_err(|e| {
                    CdcError::InvalidHeader(format!("unreadable format description: {}", e))
                })?;
                self.checksum_active = fde.checksum_alg == Some(1);
                debug!(
                    "Format description: server {} binlog v{}, checksum {:?}",
                    fde.server_version, fde.binlog_version, fde.checksum_alg
                );
                Ok((fde.checksum_alg.is_some(), self.checksum_active))
            }
        }
    }

    /// 버퍼에 `n`바이트 이상 모일 때까지 읽기. EOF로 못 모으면 false
    async fn fill(&mut self, n: usize) -> Result<bool> {
        while self.buf.len() < n {
            self.buf.reserve((n - self.buf.len()).min(READ_CHUNK).max(1));
            let read = self.reader.read_buf(&mut self.buf).await?;
            if read == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// 헤더 + 페이로드의 CRC32 (FDE는 in-use 플래그를 지우고 계산)
fn event_crc32(frame: &[u8], header: &EventHeader, is_fde: bool) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    if is_fde && header.flags & LOG_EVENT_BINLOG_IN_USE_F != 0 {
        hasher.update(&frame[..EVENT_HEADER_SIZE - 2]);
        hasher.update(&(header.flags & !LOG_EVENT_BINLOG_IN_USE_F).to_le_bytes());
        hasher.update(&frame[EVENT_HEADER_SIZE..]);
    } else {
        hasher.update(frame);
    }
    hasher.finalize()
}
