/// MySQL binlog 파일 디코더
///
/// binlog 파일을 읽어 행 단위 변경 이벤트를 JSON 한 줄씩 출력합니다.
/// `DB_HOST`가 설정되어 있으면 서버에서 컬럼 이름/부호 정보를 조회해 채웁니다.
use async_trait::async_trait;
use mysql_binlog_cdc::cdc_engine::{CdcConfig, CdcEngine};
use mysql_binlog_cdc::connection::{ConnectionConfig, MySqlConnection};
use mysql_binlog_cdc::error::{CdcError, Result};
use mysql_binlog_cdc::events::{BinlogEvent, EventData};
use mysql_binlog_cdc::framer::FramerConfig;
use mysql_binlog_cdc::sink::EventSink;
use std::env;
use std::sync::Arc;
use tracing::{info, warn};

/// 변경 이벤트를 JSON 한 줄씩 출력
#[derive(Default)]
struct JsonLinesSink {
    last_gtid: Option<String>,
}

#[async_trait]
impl EventSink for JsonLinesSink {
    async fn on_event(&mut self, event: BinlogEvent) -> Result<()> {
        if let EventData::Gtid(gtid) = &event.data {
            self.last_gtid = Some(gtid.gtid.clone());
            return Ok(());
        }

        for change in event.to_change_events() {
            let line = serde_json::to_string(&change.with_gtid(self.last_gtid.clone()))?;
            println!("{}", line);
        }
        Ok(())
    }

    async fn on_error(&mut self, error: CdcError) -> Result<()> {
        warn!("Skipping event: {}", error);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // 로깅 초기화
    tracing_subscriber::fmt::init();

    let path = env::var("BINLOG_FILE")
        .ok()
        .or_else(|| env::args().nth(1))
        .ok_or("usage: mysql_binlog_cdc <binlog file> (or set BINLOG_FILE)")?;

    let mut engine = CdcEngine::new(CdcConfig {
        framer: FramerConfig::binlog_file(),
        ..Default::default()
    });

    // 스키마 조회용 연결 (선택)
    if let Ok(hostname) = env::var("DB_HOST") {
        let config = ConnectionConfig {
            hostname,
            port: env::var("DB_PORT")
                .unwrap_or_else(|_| "3306".to_string())
                .parse()
                .unwrap_or(3306),
            username: env::var("DB_USER").unwrap_or_else(|_| "root".to_string()),
            password: env::var("DB_PASSWORD").unwrap_or_default(),
            database: env::var("DB_NAME").ok(),
            ..Default::default()
        };

        info!("Connecting to {}:{}", config.hostname, config.port);
        let conn = MySqlConnection::connect(config).await?;

        match conn.get_binlog_format().await {
            Ok(format) if !format.eq_ignore_ascii_case("ROW") => {
                warn!("binlog_format is {}; only row events are decoded", format);
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to check binlog format: {}", e),
        }

        engine = engine.with_schema_provider(Arc::new(conn));
    }

    info!("Decoding {}", path);
    let file = tokio::fs::File::open(&path).await?;

    let mut sink = JsonLinesSink::default();
    let summary = engine.run(file, &mut sink).await?;

    info!(
        "Done: {} event(s), {} skipped, {} fault(s)",
        summary.events, summary.skipped, summary.faults
    );
    Ok(())
}
