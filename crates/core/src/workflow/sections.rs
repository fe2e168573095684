//! Section and status reorganization.
//!
//! Deactivating a section strands every ticket whose current status lives in
//! it; those tickets migrate to a deterministic fallback inside the same
//! transaction. Reorders rewrite sequences wholesale rather than patching
//! individual rows.

use super::store as wf;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::ticket::track;

/// Ordered id lists partitioning the statuses into the three sequence bands.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ReorderStatusBandsRequest {
    pub delete_order: Vec<i64>,
    pub approval_order: Vec<i64>,
    pub actual_order: Vec<i64>,
}

pub struct SectionService {
    db: Database,
}

impl SectionService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create_section(&self, name: &str, sequence: i64) -> Result<super::types::Section> {
        wf::insert_section(&self.db.conn(), name, sequence)
    }

    pub fn rename_section(&self, id: i64, name: &str) -> Result<()> {
        let conn = self.db.conn();
        if wf::section_name_taken(&conn, name, id)? {
            return Err(Error::conflict("section name already exists"));
        }
        wf::rename_section(&conn, id, name)
    }

    /// Activate or deactivate a section, cascading to its statuses. On
    /// deactivation every ticket currently sitting in the section migrates to
    /// the dynamic fallback status, atomically with the flag change.
    pub fn set_section_active(&self, id: i64, is_active: bool) -> Result<()> {
        let mut conn = self.db.conn();

        let section = wf::find_section(&conn, id)?
            .ok_or_else(|| Error::not_found("section not found"))?;

        if !is_active {
            let active_count = wf::count_active_sections(&conn)?;
            if active_count <= 2 {
                return Err(Error::conflict(
                    "cannot deactivate, must have at least two active sections",
                ));
            }
            if section.sequence == 1 {
                return Err(Error::conflict("cannot deactivate the first section"));
            }
        }

        let tx = conn.transaction()?;

        wf::set_section_active(&tx, id, is_active)?;
        wf::set_statuses_active_by_section(&tx, id, is_active)?;

        if !is_active {
            let fallback = wf::dynamic_fallback_status_id(&tx, section.sequence)?
                .ok_or_else(|| {
                    Error::conflict("could not find a valid active fallback status")
                })?;
            track::migrate_open_rows_to_fallback(&tx, id, fallback)?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn delete_section(&self, id: i64) -> Result<()> {
        let conn = self.db.conn();

        let count = wf::count_sections(&conn)?;
        if count <= 2 {
            return Err(Error::conflict("cannot delete, must have at least two sections"));
        }

        let section = wf::find_section(&conn, id)?
            .ok_or_else(|| Error::not_found("section not found"))?;
        if section.sequence == 1 {
            return Err(Error::conflict("cannot delete the first section"));
        }

        wf::delete_section(&conn, id)
    }

    /// Rewrite section sequences to 1..N in the given order, renumbering all
    /// statuses with a running global counter that preserves intra-section
    /// order.
    pub fn reorder_sections(&self, ordered_section_ids: &[i64]) -> Result<()> {
        let mut conn = self.db.conn();

        let all_statuses = wf::statuses_ordered_by_section(&conn)?;

        let tx = conn.transaction()?;
        let mut global_status_sequence: i64 = 0;

        for (index, section_id) in ordered_section_ids.iter().enumerate() {
            wf::update_section_sequence(&tx, *section_id, index as i64 + 1)?;

            for status in all_statuses.iter().filter(|s| s.section_id == *section_id) {
                wf::update_status_sequence(&tx, status.id, global_status_sequence)?;
                global_status_sequence += 1;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Rewrite status sequences into the three signed bands:
    /// delete ids get −100, −101, …; approval ids −1, −2, …; actual ids
    /// 0, 1, …. The step magnitudes are load-bearing for band inference.
    pub fn reorder_status_bands(&self, req: &ReorderStatusBandsRequest) -> Result<()> {
        let mut conn = self.db.conn();
        let tx = conn.transaction()?;

        for (i, id) in req.delete_order.iter().enumerate() {
            wf::update_status_sequence(&tx, *id, -100 - i as i64)?;
        }
        for (i, id) in req.approval_order.iter().enumerate() {
            wf::update_status_sequence(&tx, *id, -1 - i as i64)?;
        }
        for (i, id) in req.actual_order.iter().enumerate() {
            wf::update_status_sequence(&tx, *id, i as i64)?;
        }

        tx.commit()?;
        Ok(())
    }
}
