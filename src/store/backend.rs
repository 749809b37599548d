// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The storage-backend seam.
//!
//! `TableStore` is the contract the flagging core needs from whatever is
//! persisting the data: named tables of flag rows plus string-keyed
//! attributes. HDF5 and FITS adapters implement this outside the crate;
//! `MemTableStore` is the in-memory implementation used by tests and by
//! embedding applications that defer persistence.

use indexmap::IndexMap;
use ndarray::prelude::*;
use thiserror::Error;

use crate::dataset::Polarization;
use crate::flagging::FlagArea;

/// One persisted flag entry: a rectangle tagged with the metadata of the
/// flag operation that produced it. A flag set with several areas stores
/// several rows sharing one `nop`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagRow {
    /// Operation id, monotonically increasing within one table.
    pub nop: u32,

    /// Name of the algorithm that produced the flag ("Manual" for operator
    /// selections).
    pub algorithm: String,

    /// Free-form rendering of the algorithm parameters.
    pub params: String,

    /// Which of the algorithm's outputs this flag came from.
    pub flagresult: String,

    /// The flagged rectangle.
    pub area: FlagArea,

    pub feed: u32,
    pub section: u32,
    pub pola: Polarization,
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Table '{0}' does not exist")]
    NoSuchTable(String),

    #[error("Attribute '{attr}' is not set on table '{table}'")]
    NoSuchAttr { table: String, attr: String },

    #[error("Storage backend error: {0}")]
    Io(String),
}

/// Operations the flagging core needs from a storage backend. All calls
/// are synchronous and fallible; the core never retries.
pub trait TableStore {
    /// All rows of a table, in storage order.
    fn read_rows(&self, table: &str) -> Result<Vec<FlagRow>, BackendError>;

    /// Replace a table's contents, creating the table if absent.
    fn write_rows(&mut self, table: &str, rows: Vec<FlagRow>) -> Result<(), BackendError>;

    /// Append rows to a table, creating the table if absent.
    ///
    /// Implementations must apply all rows or none: the flag store relies
    /// on this to make operation-id allocation retry-safe.
    fn append_rows(&mut self, table: &str, rows: Vec<FlagRow>) -> Result<(), BackendError>;

    fn delete_table(&mut self, table: &str) -> Result<(), BackendError>;

    fn get_attr(&self, table: &str, attr: &str) -> Result<String, BackendError>;

    fn set_attr(&mut self, table: &str, attr: &str, value: &str) -> Result<(), BackendError>;
}

/// An in-memory `TableStore`.
#[derive(Debug, Default)]
pub struct MemTableStore {
    tables: IndexMap<String, Vec<FlagRow>>,
    attrs: IndexMap<(String, String), String>,
    /// Bandpass correction curves, one per (section, polarization). See
    /// `bandpass::CorrectionStore`.
    pub(crate) corrections: IndexMap<(u32, Polarization), Array1<f64>>,
}

impl MemTableStore {
    pub fn new() -> MemTableStore {
        MemTableStore::default()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|s| s.as_str())
    }
}

impl TableStore for MemTableStore {
    fn read_rows(&self, table: &str) -> Result<Vec<FlagRow>, BackendError> {
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| BackendError::NoSuchTable(table.to_string()))
    }

    fn write_rows(&mut self, table: &str, rows: Vec<FlagRow>) -> Result<(), BackendError> {
        self.tables.insert(table.to_string(), rows);
        Ok(())
    }

    fn append_rows(&mut self, table: &str, mut rows: Vec<FlagRow>) -> Result<(), BackendError> {
        self.tables
            .entry(table.to_string())
            .or_default()
            .append(&mut rows);
        Ok(())
    }

    fn delete_table(&mut self, table: &str) -> Result<(), BackendError> {
        self.tables
            .shift_remove(table)
            .map(|_| ())
            .ok_or_else(|| BackendError::NoSuchTable(table.to_string()))
    }

    fn get_attr(&self, table: &str, attr: &str) -> Result<String, BackendError> {
        self.attrs
            .get(&(table.to_string(), attr.to_string()))
            .cloned()
            .ok_or_else(|| BackendError::NoSuchAttr {
                table: table.to_string(),
                attr: attr.to_string(),
            })
    }

    fn set_attr(&mut self, table: &str, attr: &str, value: &str) -> Result<(), BackendError> {
        self.attrs
            .insert((table.to_string(), attr.to_string()), value.to_string());
        Ok(())
    }
}
