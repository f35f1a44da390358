//! MySQL Binlog 이벤트 디코더
//!
//! 이 라이브러리는 MySQL 바이너리 로그 바이트 스트림을 읽어 행 단위 변경 사항으로 바꿉니다.
//! 주요 기능:
//! - Binlog v4 이벤트 프레이밍 및 CRC32 검증
//! - Table-Map 추적 (옵션 메타데이터 포함)
//! - Row 이벤트 컬럼 값 디코딩
//! - bounded 채널 기반 스트리밍

pub mod binlog;
pub mod bitmap;
pub mod cdc_engine;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod framer;
pub mod rows;
pub mod schema;
pub mod sink;
pub mod table_map;
pub mod value;

#[cfg(test)]
mod test_support;

pub use cdc_engine::{CdcConfig, CdcEngine, StreamSummary};
pub use connection::MySqlConnection;
pub use dispatcher::{DispatchConfig, EventDispatcher};
pub use error::{CdcError, Result};
pub use events::{BinlogEvent, ChangeEvent, DecodedValue, EventKind, EventType};
pub use framer::{ChecksumMode, EventFramer, FramerConfig};
pub use sink::{EventSink, StreamMessage};
pub use table_map::{TableMapEntry, TableMapRegistry};
