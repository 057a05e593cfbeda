//! State-delta extraction from the chain database's undo stack.
//!
//! Runs once per accepted block, while that block's undo frame sits on
//! top of every table's stack. Emits at most one [`TableDelta`] per table,
//! in the declared table order (the order is part of the wire contract).
//!
//! Clients reconstruct state by replaying deltas, so upserts carry the
//! *current* live row (post-image) and removals carry the captured
//! pre-image.

use scribe_chain::{RowId, StateSource, TableRow, TableView};
use scribe_types::{DeltaRow, TableDelta, TableTag};
use std::collections::HashMap;
use thiserror::Error;

/// Errors from delta extraction. All of them indicate chain database
/// corruption and are fatal to ingestion.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("table id {table_id} referenced by a {table} row is neither live nor removed")]
    InconsistentUndo { table: &'static str, table_id: RowId },

    #[error("{table} row {row_id} carries no table scope")]
    MissingScope { table: &'static str, row_id: RowId },

    #[error("{table} row {row_id} is recorded as {kind} but is not live")]
    MissingRow {
        table: &'static str,
        row_id: RowId,
        kind: &'static str,
    },
}

/// Compute the ordered table deltas for the block on top of the undo
/// stack.
///
/// `fresh` marks the first entry of an empty chain-state log: instead of
/// reading undo frames, every live row of every non-empty table is
/// emitted as a full snapshot.
pub fn extract_deltas(
    state: &dyn StateSource,
    fresh: bool,
) -> Result<Vec<TableDelta>, ExtractError> {
    // Table rows removed in this same frame, kept for resolving scope
    // references of contract rows whose table vanished with them.
    let removed_tables: HashMap<RowId, TableRow> = state
        .table(TableTag::ContractTable)
        .undo_frame()
        .map(|undo| undo.removed_values.into_iter().collect())
        .unwrap_or_default();

    let mut deltas = Vec::new();
    for tag in TableTag::ALL {
        let table = state.table(tag);
        let delta = if fresh {
            snapshot_table(state, &removed_tables, table.as_ref())?
        } else {
            diff_table(state, &removed_tables, table.as_ref())?
        };
        if let Some(delta) = delta {
            deltas.push(delta);
        }
    }
    Ok(deltas)
}

fn snapshot_table(
    state: &dyn StateSource,
    removed_tables: &HashMap<RowId, TableRow>,
    table: &dyn TableView,
) -> Result<Option<TableDelta>, ExtractError> {
    if table.is_empty() {
        return Ok(None);
    }
    let tag = table.tag();
    let mut rows = Vec::new();
    for row in table.live_rows() {
        rows.push(DeltaRow {
            present: true,
            data: pack_row(state, removed_tables, tag, &row)?,
        });
    }
    Ok(Some(TableDelta { tag, rows }))
}

fn diff_table(
    state: &dyn StateSource,
    removed_tables: &HashMap<RowId, TableRow>,
    table: &dyn TableView,
) -> Result<Option<TableDelta>, ExtractError> {
    let Some(undo) = table.undo_frame() else {
        return Ok(None);
    };
    if undo.is_empty() {
        return Ok(None);
    }
    let tag = table.tag();
    let mut rows = Vec::new();

    // Modified rows first, then inserts, then removals; upserts read the
    // current live row, removals use the captured pre-image.
    for (id, _old) in &undo.old_values {
        let row = table.get_row(*id).ok_or(ExtractError::MissingRow {
            table: tag.as_str(),
            row_id: *id,
            kind: "modified",
        })?;
        rows.push(DeltaRow {
            present: true,
            data: pack_row(state, removed_tables, tag, &row)?,
        });
    }
    for id in &undo.new_ids {
        let row = table.get_row(*id).ok_or(ExtractError::MissingRow {
            table: tag.as_str(),
            row_id: *id,
            kind: "inserted",
        })?;
        rows.push(DeltaRow {
            present: true,
            data: pack_row(state, removed_tables, tag, &row)?,
        });
    }
    for (_, pre_image) in &undo.removed_values {
        rows.push(DeltaRow {
            present: false,
            data: pack_row(state, removed_tables, tag, pre_image)?,
        });
    }
    Ok(Some(TableDelta { tag, rows }))
}

/// Pack one row. Plain tables emit the row payload alone; contract-scoped
/// tables resolve the row's table id and prepend the owning table row's
/// payload.
fn pack_row(
    state: &dyn StateSource,
    removed_tables: &HashMap<RowId, TableRow>,
    tag: TableTag,
    row: &TableRow,
) -> Result<Vec<u8>, ExtractError> {
    if !tag.is_contract_scoped() {
        return Ok(row.payload.clone());
    }
    let table_id = row.scope.ok_or(ExtractError::MissingScope {
        table: tag.as_str(),
        row_id: row.id,
    })?;
    let scope_row = state
        .table(TableTag::ContractTable)
        .get_row(table_id)
        .or_else(|| removed_tables.get(&table_id).cloned())
        .ok_or(ExtractError::InconsistentUndo {
            table: tag.as_str(),
            table_id,
        })?;

    let mut out = scope_row.payload;
    out.extend_from_slice(&row.payload);
    Ok(out)
}
