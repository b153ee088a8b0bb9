use serde::{Deserialize, Serialize};

/// fields per serial record; anything else is rejected wholesale
pub const RECORD_FIELD_COUNT: usize = 8;

/// leading fields routed to gauges; the last field is reserved and never read
pub const DECODED_FIELD_COUNT: usize = 7;

/// one gauge in the schema
/// position in the schema list is the field position it is fed from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchemaEntry {
    /// stable identifier used in the metric name (e.g. "co2")
    pub key: &'static str,
    /// human readable description used in help text and diagnostics
    pub label: &'static str,
}

impl SchemaEntry {
    pub const fn new(key: &'static str, label: &'static str) -> Self {
        Self { key, label }
    }
}

/// schema for the b36 air quality monitor
pub const REFERENCE_SCHEMA: [SchemaEntry; DECODED_FIELD_COUNT] = [
    SchemaEntry::new("unknown", "unknown"),
    SchemaEntry::new("pm2dot5", "PM 2.5"),
    SchemaEntry::new("formaldehyde", "Formaldehyde"),
    SchemaEntry::new("co2", "CO2"),
    SchemaEntry::new("temperature", "Temperature"),
    SchemaEntry::new("humidity", "Humidity"),
    SchemaEntry::new("voc", "VOC"),
];

/// latest human relevant readings served by the json endpoint
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// particulate matter 2.5 concentration
    pub pm25: i64,
    pub formaldehyde: i64,
    pub co2: i64,
    pub temperature: i64,
    pub humidity: i64,
}
