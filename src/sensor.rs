//! latest curated readings, served as json.
//!
//! each field is its own atomic so a reader never sees a torn value; there is
//! no guarantee that two fields come from the same record.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::domain::SensorSnapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotField {
    Pm25,
    Formaldehyde,
    Co2,
    Temperature,
    Humidity,
}

/// which record position feeds which snapshot field
#[derive(Clone, Debug)]
pub struct SnapshotMapping {
    entries: Vec<(usize, SnapshotField)>,
}

impl SnapshotMapping {
    pub fn new(entries: Vec<(usize, SnapshotField)>) -> Self {
        Self { entries }
    }

    pub fn field_for(&self, position: usize) -> Option<SnapshotField> {
        self.entries
            .iter()
            .find(|(p, _)| *p == position)
            .map(|(_, field)| *field)
    }
}

impl Default for SnapshotMapping {
    /// positions 1-5 of the reference schema
    fn default() -> Self {
        Self::new(vec![
            (1, SnapshotField::Pm25),
            (2, SnapshotField::Formaldehyde),
            (3, SnapshotField::Co2),
            (4, SnapshotField::Temperature),
            (5, SnapshotField::Humidity),
        ])
    }
}

#[derive(Default)]
pub struct SensorState {
    mapping: SnapshotMapping,
    pm25: AtomicI64,
    formaldehyde: AtomicI64,
    co2: AtomicI64,
    temperature: AtomicI64,
    humidity: AtomicI64,
}

impl SensorState {
    pub fn new(mapping: SnapshotMapping) -> Self {
        Self {
            mapping,
            ..Self::default()
        }
    }

    /// Overwrite the field mapped to `position`. Returns false when the
    /// position is not part of the curated subset.
    pub fn apply(&self, position: usize, value: i64) -> bool {
        match self.mapping.field_for(position) {
            Some(field) => {
                self.slot(field).store(value, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn get(&self) -> SensorSnapshot {
        SensorSnapshot {
            pm25: self.pm25.load(Ordering::Relaxed),
            formaldehyde: self.formaldehyde.load(Ordering::Relaxed),
            co2: self.co2.load(Ordering::Relaxed),
            temperature: self.temperature.load(Ordering::Relaxed),
            humidity: self.humidity.load(Ordering::Relaxed),
        }
    }

    fn slot(&self, field: SnapshotField) -> &AtomicI64 {
        match field {
            SnapshotField::Pm25 => &self.pm25,
            SnapshotField::Formaldehyde => &self.formaldehyde,
            SnapshotField::Co2 => &self.co2,
            SnapshotField::Temperature => &self.temperature,
            SnapshotField::Humidity => &self.humidity,
        }
    }
}
