//! 이벤트 싱크
//!
//! 각 스트림은 자기만의 이벤트/에러 싱크를 가집니다.

use crate::error::{CdcError, Result};
use crate::events::BinlogEvent;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// 디코딩된 이벤트와 이벤트 단위 에러를 받는 쪽
///
/// `Err`를 반환하면 스트림이 멈춥니다.
#[async_trait]
pub trait EventSink: Send {
    async fn on_event(&mut self, event: BinlogEvent) -> Result<()>;

    /// 스트림은 계속되는 에러 (UnknownTable, 필드 디코딩 실패 등)
    async fn on_error(&mut self, error: CdcError) -> Result<()>;
}

/// 채널로 전달되는 메시지
#[derive(Debug)]
pub enum StreamMessage {
    Event(BinlogEvent),
    Fault(CdcError),
}

/// bounded mpsc 채널 싱크
///
/// 채널이 가득 차면 `send`가 대기하므로, 그동안 프레이머도 읽기를 멈춥니다.
pub struct ChannelSink {
    tx: mpsc::Sender<StreamMessage>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<StreamMessage>) -> Self {
        ChannelSink { tx }
    }

    async fn send(&self, message: StreamMessage) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| CdcError::ChannelClosed)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn on_event(&mut self, event: BinlogEvent) -> Result<()> {
        self.send(StreamMessage::Event(event)).await
    }

    async fn on_error(&mut self, error: CdcError) -> Result<()> {
        self.send(StreamMessage::Fault(error)).await
    }
}

/// 받은 이벤트/에러를 모두 보관하는 싱크 (관찰용)
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<BinlogEvent>>>,
    errors: Arc<Mutex<Vec<CdcError>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BinlogEvent> {
        self.events.lock().clone()
    }

    /// 에러 메시지 목록 (`CdcError`는 Clone이 아님)
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.lock().iter().map(|e| e.to_string()).collect()
    }

    pub fn take_errors(&self) -> Vec<CdcError> {
        std::mem::take(&mut *self.errors.lock())
    }

    pub fn clear(&self) {
        self.events.lock().clear();
        self.errors.lock().clear();
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn on_event(&mut self, event: BinlogEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }

    async fn on_error(&mut self, error: CdcError) -> Result<()> {
        self.errors.lock().push(error);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::*;

    fn xid_event(xid: u64) -> BinlogEvent {
        BinlogEvent {
            header: EventHeader {
                timestamp: 0,
                event_type: EventType::Xid,
                server_id: 1,
                event_length: 31,
                next_pos: 0,
                flags: 0,
            },
            kind: EventKind::Xid,
            table: None,
            data: EventData::Xid(XidEventData { xid }),
        }
    }

    #[tokio::test]
    async fn test_recording_sink() {
        let sink = RecordingSink::new();
        let mut writer = sink.clone();
        writer.on_event(xid_event(1)).await.unwrap();
        writer.on_error(CdcError::UnknownTable(3)).await.unwrap();

        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.error_messages().len(), 1);
        assert!(matches!(sink.take_errors()[0], CdcError::UnknownTable(3)));
        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_channel_sink_closed() {
        let (tx, rx) = mpsc::channel(1);
        let mut sink = ChannelSink::new(tx);
        sink.on_event(xid_event(1)).await.unwrap();
        drop(rx);
        assert!(matches!(
            sink.on_event(xid_event(2)).await,
            Err(CdcError::ChannelClosed)
        ));
    }
}
