// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Create, update, merge, delete and propagate the flag sets of a dataset
//! collection, backed by an abstract table store.
//!
//! A flag operation is identified by its `nop` (number-of-operation) id.
//! Ids are a monotonic historical log: deleting or merging a flag set
//! never renumbers or reuses the ids of the survivors, so gaps in the
//! sequence are normal and downstream references stay valid.

mod backend;
mod error;

pub use backend::{BackendError, FlagRow, MemTableStore, TableStore};
pub use error::StoreError;

use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, trace};
use ndarray::prelude::*;
use vec1::Vec1;

use crate::dataset::{Dataset, Polarization};
use crate::detect::FlagProduct;
use crate::flagging::{self, FlagArea};

/// Name of the flag table within a backend.
pub const FLAG_TABLE: &str = "FLAG";

/// A queryable reference to one flag operation.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagSetHandle {
    /// Display name, `Flag_F<feed>S<section>:<nop>`.
    pub name: String,
    pub nop: u32,
    pub feed: u32,
    pub section: u32,
    pub pola: Polarization,
    pub algorithm: String,
}

/// Metadata of a flag operation, as stored on its rows.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagSetMeta {
    pub algorithm: String,
    pub params: String,
    pub flagresult: String,
}

fn handle_name(feed: u32, section: u32, nop: u32) -> String {
    format!("Flag_F{feed}S{section}:{nop}")
}

/// Flag-set CRUD over one backend (i.e. one data file).
pub struct FlagStore<B: TableStore> {
    backend: B,
}

impl<B: TableStore> FlagStore<B> {
    pub fn new(backend: B) -> FlagStore<B> {
        FlagStore { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// The flag table's rows; an absent table reads as empty.
    fn read_table(&self) -> Result<Vec<FlagRow>, StoreError> {
        match self.backend.read_rows(FLAG_TABLE) {
            Ok(rows) => Ok(rows),
            Err(BackendError::NoSuchTable(_)) => Ok(vec![]),
            Err(e) => Err(e.into()),
        }
    }

    /// The next free operation id. Ids of deleted operations are never
    /// reused.
    fn next_nop(rows: &[FlagRow]) -> u32 {
        rows.iter().map(|r| r.nop).max().map_or(1, |m| m + 1)
    }

    fn rows_of(rows: &[FlagRow], nop: u32) -> Vec<FlagRow> {
        rows.iter().filter(|r| r.nop == nop).cloned().collect()
    }

    /// Create a new flag set from rectangular areas. One row per area is
    /// appended under a freshly allocated `nop`; the append is atomic, so
    /// a failed call leaves no rows behind and can simply be retried.
    pub fn new_flag_set(
        &mut self,
        dataset: &Dataset,
        areas: &[FlagArea],
        pola: Polarization,
        algorithm: &str,
        params: Option<&str>,
        flagresult: Option<&str>,
    ) -> Result<FlagSetHandle, StoreError> {
        let rows = self.read_table()?;
        let nop = Self::next_nop(&rows);
        let new_rows: Vec<FlagRow> = areas
            .iter()
            .map(|&area| FlagRow {
                nop,
                algorithm: algorithm.to_string(),
                params: params.unwrap_or("").to_string(),
                flagresult: flagresult.unwrap_or("").to_string(),
                area,
                feed: dataset.feed,
                section: dataset.section,
                pola,
            })
            .collect();
        debug!(
            "New flag set nop={} ({} area(s), feed {}, section {}, pola {})",
            nop,
            new_rows.len(),
            dataset.feed,
            dataset.section,
            pola
        );
        self.backend.append_rows(FLAG_TABLE, new_rows)?;
        Ok(FlagSetHandle {
            name: handle_name(dataset.feed, dataset.section, nop),
            nop,
            feed: dataset.feed,
            section: dataset.section,
            pola,
            algorithm: algorithm.to_string(),
        })
    }

    /// Create a new flag set from a dense mask, decomposed into maximal
    /// rectangles first.
    pub fn new_flag_set_from_mask(
        &mut self,
        dataset: &Dataset,
        mask: ArrayView2<bool>,
        pola: Polarization,
        algorithm: &str,
        params: Option<&str>,
        flagresult: Option<&str>,
    ) -> Result<FlagSetHandle, StoreError> {
        let areas = flagging::mask_to_areas(mask);
        trace!("Mask decomposed into {} area(s)", areas.len());
        self.new_flag_set(dataset, &areas, pola, algorithm, params, flagresult)
    }

    /// Persist the outputs of a detection run as one flag set each.
    pub fn save_products(
        &mut self,
        dataset: &Dataset,
        products: impl IntoIterator<Item = FlagProduct>,
        default_pola: Polarization,
    ) -> Result<Vec<FlagSetHandle>, StoreError> {
        let mut handles = vec![];
        for product in products {
            handles.push(self.new_flag_set_from_mask(
                dataset,
                product.mask.view(),
                product.pola.unwrap_or(default_pola),
                &product.algorithm,
                Some(&product.params),
                Some(&product.flagresult),
            )?);
        }
        Ok(handles)
    }

    /// All flag sets of a dataset, keyed by display name in id order.
    pub fn flag_sets(
        &self,
        dataset: &Dataset,
    ) -> Result<IndexMap<String, FlagSetHandle>, StoreError> {
        let rows = self.read_table()?;
        let mut by_nop: IndexMap<u32, &FlagRow> = IndexMap::new();
        for row in rows
            .iter()
            .filter(|r| r.feed == dataset.feed && r.section == dataset.section)
        {
            by_nop.entry(row.nop).or_insert(row);
        }
        by_nop.sort_keys();
        Ok(by_nop
            .into_iter()
            .map(|(nop, row)| {
                let name = handle_name(row.feed, row.section, nop);
                let handle = FlagSetHandle {
                    name: name.clone(),
                    nop,
                    feed: row.feed,
                    section: row.section,
                    pola: row.pola,
                    algorithm: row.algorithm.clone(),
                };
                (name, handle)
            })
            .collect())
    }

    /// The stored metadata of one flag operation.
    pub fn flag_set_meta(&self, handle: &FlagSetHandle) -> Result<FlagSetMeta, StoreError> {
        let rows = self.read_table()?;
        let row = rows
            .iter()
            .find(|r| r.nop == handle.nop)
            .ok_or(StoreError::NoSuchOperation(handle.nop))?;
        Ok(FlagSetMeta {
            algorithm: row.algorithm.clone(),
            params: row.params.clone(),
            flagresult: row.flagresult.clone(),
        })
    }

    /// The dense mask of one flag operation at the dataset's shape.
    pub fn flag_set_mask(
        &self,
        dataset: &Dataset,
        handle: &FlagSetHandle,
    ) -> Result<Array2<bool>, StoreError> {
        let rows = self.read_table()?;
        let of_nop = Self::rows_of(&rows, handle.nop);
        if of_nop.is_empty() {
            return Err(StoreError::NoSuchOperation(handle.nop));
        }
        let areas: Vec<FlagArea> = of_nop.iter().map(|r| r.area).collect();
        Ok(flagging::areas_to_mask(&areas, dataset.shape()))
    }

    /// Apply areas at `value` (true flags, false deflags) to an existing
    /// flag set, in place: the operation keeps its `nop` and metadata, its
    /// rows are rewritten from the updated mask.
    pub fn update_flag_set(
        &mut self,
        dataset: &Dataset,
        handle: &FlagSetHandle,
        areas: &[FlagArea],
        value: bool,
    ) -> Result<(), StoreError> {
        let rows = self.read_table()?;
        let of_nop = Self::rows_of(&rows, handle.nop);
        let template = of_nop
            .first()
            .ok_or(StoreError::NoSuchOperation(handle.nop))?
            .clone();
        let old_areas: Vec<FlagArea> = of_nop.iter().map(|r| r.area).collect();
        let mut mask = flagging::areas_to_mask(&old_areas, dataset.shape());
        flagging::apply_areas(&mut mask, areas, value);
        let new_rows = flagging::mask_to_areas(mask.view()).into_iter().map(|area| FlagRow {
            area,
            ..template.clone()
        });
        let updated: Vec<FlagRow> = rows
            .iter()
            .filter(|r| r.nop != handle.nop)
            .cloned()
            .chain(new_rows)
            .collect();
        debug!(
            "Updated flag set nop={} (value: {value}, {} area(s) applied)",
            handle.nop,
            areas.len()
        );
        self.backend.write_rows(FLAG_TABLE, updated)?;
        Ok(())
    }

    /// Clear areas out of an existing flag set.
    pub fn deflag_flag_set(
        &mut self,
        dataset: &Dataset,
        handle: &FlagSetHandle,
        areas: &[FlagArea],
    ) -> Result<(), StoreError> {
        self.update_flag_set(dataset, handle, areas, false)
    }

    /// Merge flag sets into a single new one (logical OR of their masks)
    /// and delete the originals. The merged set is written before any
    /// original is deleted, so a failure part way leaves every original
    /// retrievable.
    pub fn merge_flag_sets(
        &mut self,
        dataset: &Dataset,
        handles: &Vec1<FlagSetHandle>,
    ) -> Result<FlagSetHandle, StoreError> {
        let mut merged = Array2::from_elem(dataset.shape(), false);
        for handle in handles {
            merged.zip_mut_with(&self.flag_set_mask(dataset, handle)?, |m, &o| *m |= o);
        }
        let provenance = format!(
            "(merge of nops={})",
            handles.iter().map(|h| h.nop).join(",")
        );
        let new_handle = self.new_flag_set_from_mask(
            dataset,
            merged.view(),
            handles.first().pola,
            "Merged",
            Some(&provenance),
            None,
        )?;
        for handle in handles {
            self.delete_flag_set(handle)?;
        }
        debug!("Merged {} flag set(s) into nop={}", handles.len(), new_handle.nop);
        Ok(new_handle)
    }

    /// Delete one flag operation. Remaining operation ids are left alone.
    pub fn delete_flag_set(&mut self, handle: &FlagSetHandle) -> Result<(), StoreError> {
        let rows = self.read_table()?;
        let remaining: Vec<FlagRow> = rows.iter().filter(|r| r.nop != handle.nop).cloned().collect();
        if remaining.len() == rows.len() {
            return Err(StoreError::NoSuchOperation(handle.nop));
        }
        debug!("Deleted flag set nop={}", handle.nop);
        self.backend.write_rows(FLAG_TABLE, remaining)?;
        Ok(())
    }

    /// Delete every flag row of a dataset whose area intersects the given
    /// region and whose polarization matches; everything else is kept
    /// verbatim.
    pub fn delete_intersecting(
        &mut self,
        dataset: &Dataset,
        region: FlagArea,
        pola: Polarization,
    ) -> Result<(), StoreError> {
        let rows = self.read_table()?;
        let kept: Vec<FlagRow> = rows
            .into_iter()
            .filter(|r| {
                !(r.area.intersects(&region)
                    && r.feed == dataset.feed
                    && r.section == dataset.section
                    && r.pola == pola)
            })
            .collect();
        self.backend.write_rows(FLAG_TABLE, kept)?;
        Ok(())
    }

    /// Copy the whole flag table into each target backend, best effort:
    /// the names of targets that failed are collected and returned rather
    /// than aborting the batch. A missing source table is an error.
    pub fn propagate_to<'a, I>(&self, targets: I) -> Result<Vec<String>, StoreError>
    where
        I: IntoIterator<Item = (String, &'a mut dyn TableStore)>,
    {
        let rows = self.backend.read_rows(FLAG_TABLE)?;
        let mut failed = vec![];
        for (name, target) in targets {
            if let Err(e) = target.append_rows(FLAG_TABLE, rows.clone()) {
                debug!("Flag table propagation to '{name}' failed: {e}");
                failed.push(name);
            }
        }
        Ok(failed)
    }

    /// Duplicate one flag operation under other feed ids, tagging the
    /// copies' parameters with their provenance.
    pub fn propagate_to_feed(
        &mut self,
        handle: &FlagSetHandle,
        feeds: &[u32],
    ) -> Result<(), StoreError> {
        for &feed in feeds {
            let rows = self.read_table()?;
            let of_nop = Self::rows_of(&rows, handle.nop);
            if of_nop.is_empty() {
                return Err(StoreError::NoSuchOperation(handle.nop));
            }
            let nop = Self::next_nop(&rows);
            let copies: Vec<FlagRow> = of_nop
                .into_iter()
                .map(|row| FlagRow {
                    nop,
                    feed,
                    params: format!(
                        "{}(copy of nop={}, feed={})",
                        row.params, handle.nop, row.feed
                    ),
                    ..row
                })
                .collect();
            debug!("Propagated nop={} to feed {feed} as nop={nop}", handle.nop);
            self.backend.append_rows(FLAG_TABLE, copies)?;
        }
        Ok(())
    }

    /// The fraction of flagged (sample, channel) cells per channel across
    /// every flag operation of a dataset, between 0 (clean) and 1 (fully
    /// flagged).
    pub fn channel_occupancy(&self, dataset: &Dataset) -> Result<Array1<f64>, StoreError> {
        let rows = self.read_table()?;
        let areas: Vec<FlagArea> = rows
            .iter()
            .filter(|r| r.feed == dataset.feed && r.section == dataset.section)
            .map(|r| r.area)
            .collect();
        let mask = flagging::areas_to_mask(&areas, dataset.shape());
        let n_samples = dataset.n_samples as f64;
        Ok(mask
            .map_axis(Axis(0), |col| {
                col.iter().filter(|&&b| b).count() as f64 / n_samples
            }))
    }
}
