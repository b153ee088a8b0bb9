//! ==============================================================================
//! decoder.rs - b36 line protocol decoder
//! ==============================================================================
//!
//! purpose:
//!     turns raw serial chunks into gauge and snapshot updates.
//!
//! protocol:
//!     ascii, one record per line, exactly 8 comma separated fields.
//!
//!         0,12,3,400,25,60,10,999\n
//!         │  │ │  │  │  │  │  └─ reserved, never read
//!         │  │ │  │  │  │  └──── voc
//!         │  │ │  │  │  └─────── humidity
//!         │  │ │  │  └────────── temperature
//!         │  │ │  └───────────── co2
//!         │  │ └──────────────── formaldehyde
//!         │  └────────────────── pm 2.5
//!         └───────────────────── unknown
//!
//!     a line with the wrong field count is dropped whole. a field that is not
//!     a base-10 integer only skips its own gauge.
//!
//! framing:
//!     PerChunk decodes every read on its own, so a record split across two
//!     reads turns into two bad fragments and is lost. Buffered keeps the
//!     unterminated tail and prepends it to the next read.
//!
//! relationships:
//!     - used by: pump.rs (one decode call per read)
//!     - writes: registry.rs (gauges + counters), sensor.rs (snapshot)
//!
//! ==============================================================================

use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{DECODED_FIELD_COUNT, RECORD_FIELD_COUNT};
use crate::registry::GaugeRegistry;
use crate::sensor::SensorState;

/// leftover bytes kept between reads before we give up on finding a newline
pub const MAX_PENDING_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// every read is decoded alone; records split across reads are dropped
    #[default]
    PerChunk,
    /// unterminated tails are carried into the next read
    Buffered,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
}

/// one value written to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedUpdate {
    pub position: usize,
    pub value: i64,
}

/// the decoded positions of a record; `None` where the field did not parse
pub type ParsedRecord = [Option<i64>; DECODED_FIELD_COUNT];

/// Split one line into fields and parse the decoded positions.
pub fn parse_record(line: &str) -> Result<ParsedRecord, DecodeError> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != RECORD_FIELD_COUNT {
        return Err(DecodeError::FieldCount {
            expected: RECORD_FIELD_COUNT,
            found: fields.len(),
        });
    }

    let mut parsed = [None; DECODED_FIELD_COUNT];
    for (slot, field) in parsed.iter_mut().zip(&fields) {
        *slot = field.parse::<i64>().ok();
    }
    Ok(parsed)
}

pub struct RecordDecoder {
    registry: Arc<GaugeRegistry>,
    sensor: Arc<SensorState>,
    framing: Framing,
    verbose: bool,
    pending: Vec<u8>,
}

impl RecordDecoder {
    pub fn new(registry: Arc<GaugeRegistry>, sensor: Arc<SensorState>, framing: Framing) -> Self {
        Self {
            registry,
            sensor,
            framing,
            verbose: false,
            pending: Vec::new(),
        }
    }

    /// log every decoded record and every skipped line
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Decode a raw chunk and apply it. Returns the updates in the order they
    /// were written.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<AppliedUpdate> {
        match self.framing {
            Framing::PerChunk => self.decode_text(&String::from_utf8_lossy(chunk)),
            Framing::Buffered => self.decode_buffered(chunk),
        }
    }

    fn decode_buffered(&mut self, chunk: &[u8]) -> Vec<AppliedUpdate> {
        self.pending.extend_from_slice(chunk);

        let mut updates = Vec::new();
        if let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') {
            let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
            updates = self.decode_text(&String::from_utf8_lossy(&complete));
        }

        if self.pending.len() > MAX_PENDING_BYTES {
            tracing::warn!(
                "[DECODER] Dropping {} bytes without a newline",
                self.pending.len()
            );
            self.registry.counters().records_rejected.inc();
            self.pending.clear();
        }
        updates
    }

    fn decode_text(&self, text: &str) -> Vec<AppliedUpdate> {
        let mut updates = Vec::new();
        for line in text.split('\n').filter(|line| !line.is_empty()) {
            self.apply_line(line, &mut updates);
        }
        updates
    }

    fn apply_line(&self, line: &str, updates: &mut Vec<AppliedUpdate>) {
        let counters = self.registry.counters();
        let record = match parse_record(line) {
            Ok(record) => record,
            Err(e) => {
                counters.records_rejected.inc();
                if self.verbose {
                    tracing::info!("Skipped invalid input ({}): {}", e, line);
                }
                return;
            }
        };
        counters.records_decoded.inc();

        let start = updates.len();
        for (position, value) in record.iter().enumerate() {
            let Some(value) = *value else {
                counters.fields_skipped.inc();
                continue;
            };
            if !self.registry.set(position, value) {
                continue;
            }
            self.sensor.apply(position, value);
            updates.push(AppliedUpdate { position, value });
        }

        if self.verbose && updates.len() > start {
            let schema = self.registry.schema();
            let debug_info: Vec<String> = updates[start..]
                .iter()
                .map(|u| {
                    let label = schema.get(u.position).map(|e| e.label).unwrap_or("?");
                    format!("{}: {}", label, u.value)
                })
                .collect();
            tracing::info!("{}", debug_info.join(","));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SensorSnapshot, REFERENCE_SCHEMA};

    fn decoder(framing: Framing) -> (RecordDecoder, Arc<GaugeRegistry>, Arc<SensorState>) {
        let registry = Arc::new(GaugeRegistry::initialize("b36", &REFERENCE_SCHEMA).unwrap());
        let sensor = Arc::new(SensorState::default());
        let decoder = RecordDecoder::new(registry.clone(), sensor.clone(), framing).verbose(true);
        (decoder, registry, sensor)
    }

    #[test]
    fn parse_record_rejects_wrong_field_count() {
        assert_eq!(
            parse_record("1,2,3,4,5,6,7"),
            Err(DecodeError::FieldCount { expected: 8, found: 7 })
        );
        assert_eq!(
            parse_record("1,2,3,4,5,6,7,8,9"),
            Err(DecodeError::FieldCount { expected: 8, found: 9 })
        );
    }

    #[test]
    fn parse_record_keeps_unparsable_fields_as_none() {
        let record = parse_record("0,12,x,400,-5,+60, 10,999\n").unwrap();
        assert_eq!(
            record,
            [Some(0), Some(12), None, Some(400), Some(-5), Some(60), None]
        );
    }

    #[test]
    fn reference_line_updates_gauges_and_snapshot() {
        let (mut decoder, registry, sensor) = decoder(Framing::PerChunk);
        let updates = decoder.decode(b"0,12,3,400,25,60,10,999\n");

        assert_eq!(updates.len(), 7);
        assert_eq!(registry.values(), vec![0, 12, 3, 400, 25, 60, 10]);
        assert_eq!(
            sensor.get(),
            SensorSnapshot { pm25: 12, formaldehyde: 3, co2: 400, temperature: 25, humidity: 60 }
        );
        assert_eq!(registry.counters().records_decoded.get(), 1);
    }

    #[test]
    fn all_garbage_fields_change_nothing() {
        let (mut decoder, registry, sensor) = decoder(Framing::PerChunk);
        decoder.decode(b"0,12,3,400,25,60,10,999\n");
        let updates = decoder.decode(b"a,b,c,d,e,f,g,h\n");

        assert!(updates.is_empty());
        assert_eq!(registry.values(), vec![0, 12, 3, 400, 25, 60, 10]);
        assert_eq!(sensor.get().co2, 400);
        assert_eq!(registry.counters().records_decoded.get(), 2);
        assert_eq!(registry.counters().fields_skipped.get(), 7);
    }

    #[test]
    fn wrong_field_count_touches_nothing() {
        let (mut decoder, registry, sensor) = decoder(Framing::PerChunk);
        assert!(decoder.decode(b"1,2,3,4,5,6,7\n").is_empty());
        assert!(decoder.decode(b"1,2,3,4,5,6,7,8,9\n").is_empty());
        assert!(decoder.decode(b"garbage\n").is_empty());

        assert_eq!(registry.values(), vec![0; 7]);
        assert_eq!(sensor.get(), SensorSnapshot::default());
        assert_eq!(registry.counters().records_rejected.get(), 3);
    }

    #[test]
    fn one_bad_field_skips_only_that_gauge() {
        let (mut decoder, registry, sensor) = decoder(Framing::PerChunk);
        decoder.decode(b"0,12,3,400,25,60,10,999\n");
        decoder.decode(b"1,13,4,co2,26,61,11,999\n");

        assert_eq!(registry.values(), vec![1, 13, 4, 400, 26, 61, 11]);
        assert_eq!(
            sensor.get(),
            SensorSnapshot { pm25: 13, formaldehyde: 4, co2: 400, temperature: 26, humidity: 61 }
        );
    }

    #[test]
    fn reserved_field_is_never_applied() {
        let (mut decoder, registry, _) = decoder(Framing::PerChunk);
        let updates = decoder.decode(b"0,0,0,0,0,0,0,12345\n");
        assert!(updates.iter().all(|u| u.position < DECODED_FIELD_COUNT));
        assert!(updates.iter().all(|u| u.value != 12345));
        assert!(!registry.encode().unwrap().contains("12345"));
    }

    #[test]
    fn replaying_a_record_is_idempotent() {
        let (mut decoder, registry, sensor) = decoder(Framing::PerChunk);
        decoder.decode(b"0,12,3,400,25,60,10,999\n");
        let once = (registry.values(), sensor.get());
        decoder.decode(b"0,12,3,400,25,60,10,999\n");
        assert_eq!((registry.values(), sensor.get()), once);
    }

    #[test]
    fn records_in_one_chunk_apply_in_order() {
        let (mut decoder, registry, sensor) = decoder(Framing::PerChunk);
        let updates = decoder.decode(b"0,12,3,400,25,60,10,999\n0,20,x,410,26,61,11,999\n");

        assert_eq!(updates.len(), 13);
        assert_eq!(updates[7], AppliedUpdate { position: 0, value: 0 });
        assert_eq!(registry.values(), vec![0, 20, 3, 410, 26, 61, 11]);
        assert_eq!(sensor.get().pm25, 20);
        assert_eq!(sensor.get().formaldehyde, 3);
    }

    #[test]
    fn empty_chunk_and_blank_lines_are_ignored() {
        let (mut decoder, registry, _) = decoder(Framing::PerChunk);
        assert!(decoder.decode(b"").is_empty());
        assert!(decoder.decode(b"\n\n\n").is_empty());
        assert_eq!(registry.counters().records_rejected.get(), 0);
    }

    #[test]
    fn per_chunk_framing_drops_split_records() {
        let (mut decoder, registry, _) = decoder(Framing::PerChunk);
        assert!(decoder.decode(b"0,12,3,40").is_empty());
        assert!(decoder.decode(b"0,25,60,10,999\n").is_empty());
        assert_eq!(registry.values(), vec![0; 7]);
        assert_eq!(registry.counters().records_rejected.get(), 2);
    }

    #[test]
    fn buffered_framing_reassembles_split_records() {
        let (mut decoder, registry, sensor) = decoder(Framing::Buffered);
        assert!(decoder.decode(b"0,12,3,40").is_empty());
        let updates = decoder.decode(b"0,25,60,10,999\n0,1");

        assert_eq!(updates.len(), 7);
        assert_eq!(registry.values(), vec![0, 12, 3, 400, 25, 60, 10]);
        assert_eq!(sensor.get().co2, 400);

        decoder.decode(b"3,3,401,25,60,10,999\n");
        assert_eq!(registry.value(1), Some(13));
        assert_eq!(registry.value(3), Some(401));
        assert_eq!(registry.counters().records_rejected.get(), 0);
    }

    #[test]
    fn buffered_framing_drops_runaway_tail() {
        let (mut decoder, registry, _) = decoder(Framing::Buffered);
        let noise = vec![b'7'; MAX_PENDING_BYTES + 1];
        assert!(decoder.decode(&noise).is_empty());
        assert_eq!(registry.counters().records_rejected.get(), 1);

        decoder.decode(b"0,12,3,400,25,60,10,999\n");
        assert_eq!(registry.value(1), Some(12));
    }

    #[test]
    fn non_utf8_bytes_do_not_poison_the_chunk() {
        let (mut decoder, registry, _) = decoder(Framing::PerChunk);
        decoder.decode(b"\xff\xfe\n0,12,3,400,25,60,10,999\n");
        assert_eq!(registry.value(3), Some(400));
        assert_eq!(registry.counters().records_rejected.get(), 1);
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn decode_with_log(verbose: bool, chunk: &[u8]) -> String {
        let (decoder, _, _) = decoder(Framing::PerChunk);
        let mut decoder = decoder.verbose(verbose);
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            decoder.decode(chunk);
        });
        let bytes = log.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn verbose_logs_labelled_values_and_skipped_lines() {
        let output = decode_with_log(true, b"0,12,3,400,25,60,10,999\n1,2,3\n");
        assert!(output.contains(
            "unknown: 0,PM 2.5: 12,Formaldehyde: 3,CO2: 400,Temperature: 25,Humidity: 60,VOC: 10"
        ));
        assert!(output.contains("Skipped invalid input"));
        assert!(output.contains("1,2,3"));
    }

    #[test]
    fn verbose_skips_the_line_when_nothing_parsed() {
        let output = decode_with_log(true, b"a,b,c,d,e,f,g,h\n");
        assert!(output.is_empty(), "unexpected output: {}", output);
    }

    #[test]
    fn quiet_decoder_logs_nothing() {
        let output = decode_with_log(false, b"0,12,3,400,25,60,10,999\n1,2,3\n");
        assert!(output.is_empty(), "unexpected output: {}", output);
    }
}
