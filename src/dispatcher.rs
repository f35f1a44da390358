//! 이벤트 디스패처
//!
//! 프레이밍된 이벤트를 외부에 보이는 `BinlogEvent`로 바꿉니다. Table-Map 이벤트는
//! 항상 레지스트리를 갱신하고, Row 이벤트는 레지스트리의 엔트리로 디코딩해
//! 테이블 이름이 채워진 상태로 내보냅니다.

use crate::binlog::BinlogParser;
use crate::error::Result;
use crate::events::*;
use crate::framer::RawEvent;
use crate::rows::{DecodedRows, RowDecoder};
use crate::schema::{enrich_entry, ColumnSchemaProvider};
use crate::table_map::{TableMapEntry, TableMapRegistry};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// 디코딩할 이벤트 종류 설정
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// 완전히 디코딩할 종류
    pub decode: HashSet<EventKind>,
    /// 디코딩하지 않는 이벤트를 `Unknown`으로 내보낼지 여부
    pub emit_unknown: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            decode: [
                EventKind::TableMap,
                EventKind::WriteRows,
                EventKind::UpdateRows,
                EventKind::DeleteRows,
                EventKind::Query,
                EventKind::Xid,
                EventKind::Rotate,
                EventKind::Gtid,
            ]
            .into_iter()
            .collect(),
            emit_unknown: false,
        }
    }
}

impl DispatchConfig {
    /// Row 이벤트만
    pub fn rows_only() -> Self {
        DispatchConfig {
            decode: [EventKind::WriteRows, EventKind::UpdateRows, EventKind::DeleteRows]
                .into_iter()
                .collect(),
            emit_unknown: false,
        }
    }

    pub fn decodes(&self, kind: EventKind) -> bool {
        kind != EventKind::Unknown && self.decode.contains(&kind)
    }
}

/// 한 스트림의 디스패처 (레지스트리 소유)
pub struct EventDispatcher {
    registry: TableMapRegistry,
    config: DispatchConfig,
    schema_provider: Option<Arc<dyn ColumnSchemaProvider>>,
}

impl EventDispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        EventDispatcher {
            registry: TableMapRegistry::new(),
            config,
            schema_provider: None,
        }
    }

    pub fn with_schema_provider(mut self, provider: Arc<dyn ColumnSchemaProvider>) -> Self {
        self.schema_provider = Some(provider);
        self
    }

    pub fn registry(&self) -> &TableMapRegistry {
        &self.registry
    }

    /// 이벤트 하나 처리
    ///
    /// 설정상 내보내지 않는 이벤트는 `Ok(None)`. 에러는 이 이벤트에만 해당하며
    /// (`UnknownTable`, `FieldDecode`, `BinlogParseError`) 다음 이벤트는 계속 처리할 수 있습니다.
    pub async fn dispatch(&mut self, raw: RawEvent) -> Result<Option<BinlogEvent>> {
        let event_type = raw.header.event_type;
        let kind = event_type.kind();

        if kind == EventKind::TableMap {
            let entry = self.handle_table_map(&raw.payload).await?;
            if self.config.decodes(kind) {
                return Ok(Some(BinlogEvent {
                    header: raw.header,
                    kind,
                    table: Some(TableDescriptor::from(&entry)),
                    data: EventData::TableMap(entry),
                }));
            }
            return Ok(self.passthrough(raw));
        }

        if !self.config.decodes(kind) {
            return Ok(self.passthrough(raw));
        }

        let (table, data) = match kind {
            EventKind::WriteRows | EventKind::UpdateRows | EventKind::DeleteRows => {
                let table_id = RowDecoder::table_id(&raw.payload)?;
                let entry = self.registry.describe(table_id)?;
                let data = match RowDecoder::decode(entry, event_type, &raw.payload)? {
                    DecodedRows::Rows(rows) => EventData::Rows(rows),
                    DecodedRows::Pairs(pairs) => EventData::RowPairs(pairs),
                };
                (Some(TableDescriptor::from(entry)), data)
            }
            EventKind::Query => (None, EventData::Query(BinlogParser::parse_query_event(&raw.payload)?)),
            EventKind::Xid => (None, EventData::Xid(BinlogParser::parse_xid_event(&raw.payload)?)),
            EventKind::Rotate => (None, EventData::Rotate(BinlogParser::parse_rotate_event(&raw.payload)?)),
            EventKind::Gtid => (None, EventData::Gtid(BinlogParser::parse_gtid_event(&raw.payload)?)),
            EventKind::TableMap | EventKind::Unknown => return Ok(self.passthrough(raw)),
        };

        Ok(Some(BinlogEvent {
            header: raw.header,
            kind,
            table,
            data,
        }))
    }

    fn passthrough(&self, raw: RawEvent) -> Option<BinlogEvent> {
        if !self.config.emit_unknown {
            return None;
        }
        Some(BinlogEvent {
            header: raw.header,
            kind: EventKind::Unknown,
            table: None,
            data: EventData::Unknown(raw.payload.to_vec()),
        })
    }

    /// Table-Map 파싱, 스키마 보강, 레지스트리 교체
    async fn handle_table_map(&mut self, payload: &[u8]) -> Result<TableMapEntry> {
        let mut entry = BinlogParser::parse_table_map_event(payload)?;

        let previous = self
            .registry
            .describe(entry.table_id)
            .ok()
            .filter(|prev| entry.same_layout(prev))
            .cloned();

        match previous {
            Some(prev) => entry.inherit_enrichment(&prev),
            None => self.enrich(&mut entry).await,
        }

        debug!(
            "Table map {} -> {}.{} ({} columns)",
            entry.table_id,
            entry.schema,
            entry.table,
            entry.column_count()
        );
        self.registry.update(entry.table_id, entry.clone());
        Ok(entry)
    }

    async fn enrich(&self, entry: &mut TableMapEntry) {
        let Some(provider) = self.schema_provider.as_ref() else {
            return;
        };
        if entry.has_optional_metadata && entry.columns.iter().all(|c| c.name.is_some()) {
            return;
        }

        match provider.columns(&entry.schema, &entry.table).await {
            Ok(columns) => {
                enrich_entry(entry, &columns);
            }
            Err(e) => {
                warn!(
                    "Failed to load column schema for {}.{}: {}",
                    entry.schema, entry.table, e
                );
            }
        }
    }
}
