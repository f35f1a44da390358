//! MySQL CDC 엔진 - binlog 바이트 스트림 디코딩
//!
//! 엔진은 하나의 스트림을 다음 순서로 처리합니다:
//! 1. 프레이머가 바이트 스트림을 이벤트 단위로 자름 (체크섬 검증)
//! 2. 디스패처가 Table-Map을 추적하고 Row 이벤트를 디코딩
//! 3. 결과를 싱크(또는 bounded 채널)로 전달
//!
//! 이벤트 단위 에러는 `on_error`로 보내고 다음 이벤트를 계속 처리합니다.
//! 스트림 손상 에러는 즉시 반환합니다.

use crate::dispatcher::{DispatchConfig, EventDispatcher};
use crate::error::Result;
use crate::framer::{EventFramer, FramerConfig};
use crate::schema::ColumnSchemaProvider;
use crate::sink::{ChannelSink, EventSink, StreamMessage};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// CDC 엔진 설정
#[derive(Debug, Clone)]
pub struct CdcConfig {
    pub framer: FramerConfig,
    pub dispatch: DispatchConfig,
    /// `stream()` 채널 용량 (가득 차면 읽기를 멈춤)
    pub channel_capacity: usize,
}

impl Default for CdcConfig {
    fn default() -> Self {
        CdcConfig {
            framer: FramerConfig::default(),
            dispatch: DispatchConfig::default(),
            channel_capacity: 64,
        }
    }
}

/// 스트림 처리 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// 싱크로 전달된 이벤트 수
    pub events: u64,
    /// 이벤트 단위 에러 수
    pub faults: u64,
    /// 설정에 의해 건너뛴 이벤트 수
    pub skipped: u64,
    /// 읽은 바이트 수
    pub bytes: u64,
}

/// MySQL CDC 엔진
pub struct CdcEngine {
    config: CdcConfig,
    schema_provider: Option<Arc<dyn ColumnSchemaProvider>>,
}

impl CdcEngine {
    /// 새 CDC 엔진 생성
    pub fn new(config: CdcConfig) -> Self {
        CdcEngine {
            config,
            schema_provider: None,
        }
    }

    /// Table-Map에 없는 컬럼 정보를 채울 스키마 제공자
    pub fn with_schema_provider(mut self, provider: Arc<dyn ColumnSchemaProvider>) -> Self {
        self.schema_provider = Some(provider);
        self
    }

    pub fn config(&self) -> &CdcConfig {
        &self.config
    }

    fn dispatcher(&self) -> EventDispatcher {
        let dispatcher = EventDispatcher::new(self.config.dispatch.clone());
        match &self.schema_provider {
            Some(provider) => dispatcher.with_schema_provider(provider.clone()),
            None => dispatcher,
        }
    }

    /// 스트림 끝까지 디코딩하여 싱크로 전달
    ///
    /// 이벤트 경계에서 스트림이 끝나면 `Ok(summary)`. 싱크가 반환한 에러는 그대로 전파됩니다.
    pub async fn run<R, S>(&self, reader: R, sink: &mut S) -> Result<StreamSummary>
    where
        R: AsyncRead + Unpin,
        S: EventSink + ?Sized,
    {
        let mut framer = EventFramer::new(reader, self.config.framer.clone());
        let mut dispatcher = self.dispatcher();
        let mut summary = StreamSummary::default();

        info!("Starting binlog decoding");

        loop {
            let raw = match framer.next_event().await {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(e) => {
                    warn!("Binlog stream stopped at offset {}: {}", framer.position(), e);
                    return Err(e);
                }
            };
            summary.bytes = framer.position();

            let position = raw.position;
            match dispatcher.dispatch(raw).await {
                Ok(Some(event)) => {
                    summary.events += 1;
                    sink.on_event(event).await?;
                }
                Ok(None) => summary.skipped += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    summary.faults += 1;
                    debug!("Event at offset {} dropped: {}", position, e);
                    sink.on_error(e).await?;
                }
            }
        }

        info!(
            "Binlog decoding finished: {} event(s), {} fault(s), {} byte(s)",
            summary.events, summary.faults, summary.bytes
        );
        Ok(summary)
    }

    /// 별도 태스크에서 디코딩하고 bounded 채널로 전달
    ///
    /// 수신자를 drop 하면 태스크는 `ChannelClosed`로 끝납니다.
    pub fn stream<R>(
        &self,
        reader: R,
    ) -> (mpsc::Receiver<StreamMessage>, JoinHandle<Result<StreamSummary>>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let engine = CdcEngine {
            config: self.config.clone(),
            schema_provider: self.schema_provider.clone(),
        };

        let handle = tokio::spawn(async move {
            let mut sink = ChannelSink::new(tx);
            let result = engine.run(reader, &mut sink).await;
            if matches!(&result, Err(e) if e.is_consumer()) {
                info!("Binlog stream stopped by consumer");
            }
            result
        });

        (rx, handle)
    }
}
