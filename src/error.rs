//! CDC 관련 에러 타입
//!
//! 에러는 세 단계로 나뉩니다:
//! - 스트림 레벨 (치명적): 헤더 손상, 스트림 절단, 체크섬 불일치, I/O 에러
//! - 프로토콜 순서 위반: Table-Map 없이 참조된 테이블 ID
//! - 필드/이벤트 레벨: 한 이벤트 안의 컬럼 인코딩 문제 (다음 이벤트는 계속 처리)

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CdcError {
    #[error("MySQL 연결 에러: {0}")]
    ConnectionError(String),

    #[error("잘못된 이벤트 헤더: {0}")]
    InvalidHeader(String),

    #[error("이벤트 도중 스트림이 끊겼습니다: {0}")]
    TruncatedStream(String),

    #[error("체크섬 불일치: expected {expected:#010x}, actual {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Table-Map 이벤트 없이 참조된 테이블 ID: {0}")]
    UnknownTable(u64),

    #[error("컬럼 {column} 디코딩 에러 (type {type_code}): {reason}")]
    FieldDecode {
        column: usize,
        type_code: u8,
        reason: String,
    },

    #[error("Binlog 파싱 에러: {0}")]
    BinlogParseError(String),

    #[error("쿼리 실행 에러: {0}")]
    QueryError(String),

    #[error("I/O 에러: {0}")]
    IoError(String),

    #[error("직렬화 에러: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("채널이 닫혔습니다")]
    ChannelClosed,

    #[error("소비자 에러: {0}")]
    ConsumerError(String),
}

impl CdcError {
    /// 스트림을 더 이상 신뢰할 수 없는 에러인지 여부
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CdcError::InvalidHeader(_)
                | CdcError::TruncatedStream(_)
                | CdcError::ChecksumMismatch { .. }
                | CdcError::IoError(_)
        )
    }

    /// Table-Map 순서 위반 여부
    pub fn is_protocol_ordering(&self) -> bool {
        matches!(self, CdcError::UnknownTable(_))
    }

    /// 소비자 쪽에서 발생해 스트림을 멈춰야 하는 에러
    pub fn is_consumer(&self) -> bool {
        matches!(self, CdcError::ChannelClosed | CdcError::ConsumerError(_))
    }
}

impl From<io::Error> for CdcError {
    fn from(err: io::Error) -> Self {
        CdcError::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CdcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(CdcError::InvalidHeader("len".to_string()).is_fatal());
        assert!(CdcError::TruncatedStream("eof".to_string()).is_fatal());
        assert!(CdcError::ChecksumMismatch {
            expected: 1,
            actual: 2
        }
        .is_fatal());
        assert!(CdcError::from(io::Error::new(io::ErrorKind::BrokenPipe, "x")).is_fatal());

        assert!(!CdcError::UnknownTable(7).is_fatal());
        assert!(CdcError::UnknownTable(7).is_protocol_ordering());
        assert!(!CdcError::FieldDecode {
            column: 0,
            type_code: 200,
            reason: "unsupported".to_string()
        }
        .is_fatal());
        assert!(CdcError::ChannelClosed.is_consumer());
    }
}
