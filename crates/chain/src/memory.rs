//! In-memory chain implementation for tests and simulation.
//!
//! Models the slice of the chain engine the state-history subsystem
//! touches: a block store, head state, sixteen state tables with one-deep
//! undo frames, and the two lifecycle signals. Undo bookkeeping follows
//! the engine's rules: the first modification of a row captures its
//! pre-image, rows inserted and removed within the same frame cancel out,
//! and removals capture the pre-image that was live when the frame opened.

use crate::signal::Signal;
use crate::traits::{
    AcceptedBlock, ChainPlugin, ChainView, RowId, StateSource, TableRow, TableView, UndoFrame,
};
use scribe_types::{BlockId, TableTag, TransactionTrace};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

#[derive(Default)]
struct MemoryTable {
    rows: BTreeMap<RowId, TableRow>,
    undo: Option<UndoFrame>,
}

struct Inner {
    last_irreversible_num: u32,
    last_irreversible_id: BlockId,
    blocks: HashMap<u32, Vec<u8>>,
    tables: HashMap<TableTag, MemoryTable>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            last_irreversible_num: 0,
            last_irreversible_id: BlockId::ZERO,
            blocks: HashMap::new(),
            tables: HashMap::new(),
        }
    }
}

impl Inner {
    fn table_mut(&mut self, tag: TableTag) -> &mut MemoryTable {
        self.tables.entry(tag).or_default()
    }
}

/// In-memory [`ChainPlugin`] implementation.
pub struct MemoryChain {
    inner: Mutex<Inner>,
    applied_transaction: Signal<TransactionTrace>,
    accepted_block: Signal<AcceptedBlock>,
}

impl Default for MemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            applied_transaction: Signal::new(),
            accepted_block: Signal::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory chain lock poisoned")
    }

    /// Set the irreversible head reported by [`ChainView`].
    pub fn set_last_irreversible(&self, block_num: u32, block_id: BlockId) {
        let mut inner = self.lock();
        inner.last_irreversible_num = block_num;
        inner.last_irreversible_id = block_id;
    }

    /// Store a raw serialized block in the block store.
    pub fn put_block(&self, block_num: u32, raw: Vec<u8>) {
        self.lock().blocks.insert(block_num, raw);
    }

    /// Seed a live row without undo bookkeeping (pre-genesis state).
    pub fn seed_row(&self, tag: TableTag, row: TableRow) {
        self.lock().table_mut(tag).rows.insert(row.id, row);
    }

    /// Open a fresh undo frame on every table, as the engine does when it
    /// starts applying a block.
    pub fn start_block(&self) {
        let mut inner = self.lock();
        for tag in TableTag::ALL {
            inner.table_mut(tag).undo = Some(UndoFrame::default());
        }
    }

    /// Insert a row, recording it in the active undo frame.
    pub fn insert_row(&self, tag: TableTag, row: TableRow) {
        let mut inner = self.lock();
        let table = inner.table_mut(tag);
        if let Some(undo) = table.undo.as_mut() {
            undo.new_ids.push(row.id);
        }
        table.rows.insert(row.id, row);
    }

    /// Replace a row's payload, capturing the pre-image on first touch.
    ///
    /// # Panics
    ///
    /// Panics if the row does not exist; modifying a missing row is an
    /// engine bug the tests should surface loudly.
    pub fn modify_row(&self, tag: TableTag, id: RowId, payload: Vec<u8>) {
        let mut inner = self.lock();
        let table = inner.table_mut(tag);
        let row = table.rows.get_mut(&id).expect("modify of missing row");
        if let Some(undo) = table.undo.as_mut() {
            let inserted_here = undo.new_ids.contains(&id);
            let already_captured = undo.old_values.iter().any(|(old_id, _)| *old_id == id);
            if !inserted_here && !already_captured {
                undo.old_values.push((id, row.clone()));
            }
        }
        row.payload = payload;
    }

    /// Remove a row, capturing its pre-image in the active undo frame.
    pub fn remove_row(&self, tag: TableTag, id: RowId) {
        let mut inner = self.lock();
        let table = inner.table_mut(tag);
        let Some(row) = table.rows.remove(&id) else {
            return;
        };
        let Some(undo) = table.undo.as_mut() else {
            return;
        };
        if let Some(pos) = undo.new_ids.iter().position(|new_id| *new_id == id) {
            // Inserted and removed within the same frame: cancels out.
            undo.new_ids.remove(pos);
            return;
        }
        if let Some(pos) = undo.old_values.iter().position(|(old_id, _)| *old_id == id) {
            let (_, pre_image) = undo.old_values.remove(pos);
            undo.removed_values.push((id, pre_image));
            return;
        }
        undo.removed_values.push((id, row));
    }

    /// Emit an applied-transaction signal.
    pub fn emit_applied_transaction(&self, trace: TransactionTrace) {
        self.applied_transaction.emit(&trace);
    }

    /// Emit an accepted-block signal.
    pub fn emit_accepted_block(&self, block: AcceptedBlock) {
        self.accepted_block.emit(&block);
    }
}

struct MemoryTableView<'a> {
    chain: &'a MemoryChain,
    tag: TableTag,
}

impl TableView for MemoryTableView<'_> {
    fn tag(&self) -> TableTag {
        self.tag
    }

    fn is_empty(&self) -> bool {
        self.chain
            .lock()
            .tables
            .get(&self.tag)
            .map_or(true, |t| t.rows.is_empty())
    }

    fn live_rows(&self) -> Vec<TableRow> {
        self.chain
            .lock()
            .tables
            .get(&self.tag)
            .map_or_else(Vec::new, |t| t.rows.values().cloned().collect())
    }

    fn get_row(&self, id: RowId) -> Option<TableRow> {
        self.chain
            .lock()
            .tables
            .get(&self.tag)
            .and_then(|t| t.rows.get(&id).cloned())
    }

    fn undo_frame(&self) -> Option<UndoFrame> {
        self.chain
            .lock()
            .tables
            .get(&self.tag)
            .and_then(|t| t.undo.clone())
    }
}

impl StateSource for MemoryChain {
    fn table(&self, tag: TableTag) -> Box<dyn TableView + '_> {
        Box::new(MemoryTableView { chain: self, tag })
    }
}

impl ChainView for MemoryChain {
    fn last_irreversible_block_num(&self) -> u32 {
        self.lock().last_irreversible_num
    }

    fn last_irreversible_block_id(&self) -> BlockId {
        self.lock().last_irreversible_id
    }

    fn fetch_block_by_number(&self, block_num: u32) -> Option<Vec<u8>> {
        self.lock().blocks.get(&block_num).cloned()
    }
}

impl ChainPlugin for MemoryChain {
    fn view(&self) -> &dyn ChainView {
        self
    }

    fn state(&self) -> &dyn StateSource {
        self
    }

    fn applied_transaction(&self) -> &Signal<TransactionTrace> {
        &self.applied_transaction
    }

    fn accepted_block(&self) -> &Signal<AcceptedBlock> {
        &self.accepted_block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: RowId, payload: &[u8]) -> TableRow {
        TableRow { id, scope: None, payload: payload.to_vec() }
    }

    #[test]
    fn test_seeded_rows_have_no_undo() {
        let chain = MemoryChain::new();
        chain.seed_row(TableTag::Account, row(1, b"alice"));

        let table = chain.table(TableTag::Account);
        assert!(!table.is_empty());
        assert!(table.undo_frame().is_none());
        assert_eq!(table.live_rows().len(), 1);
    }

    #[test]
    fn test_modify_captures_pre_image_once() {
        let chain = MemoryChain::new();
        chain.seed_row(TableTag::Account, row(1, b"v0"));
        chain.start_block();
        chain.modify_row(TableTag::Account, 1, b"v1".to_vec());
        chain.modify_row(TableTag::Account, 1, b"v2".to_vec());

        let undo = chain.table(TableTag::Account).undo_frame().unwrap();
        assert_eq!(undo.old_values.len(), 1);
        assert_eq!(undo.old_values[0].1.payload, b"v0");
        assert_eq!(
            chain.table(TableTag::Account).get_row(1).unwrap().payload,
            b"v2"
        );
    }

    #[test]
    fn test_insert_then_remove_cancels() {
        let chain = MemoryChain::new();
        chain.start_block();
        chain.insert_row(TableTag::Account, row(5, b"temp"));
        chain.remove_row(TableTag::Account, 5);

        let undo = chain.table(TableTag::Account).undo_frame().unwrap();
        assert!(undo.is_empty());
        assert!(chain.table(TableTag::Account).is_empty());
    }

    #[test]
    fn test_remove_after_modify_keeps_original_pre_image() {
        let chain = MemoryChain::new();
        chain.seed_row(TableTag::Account, row(1, b"v0"));
        chain.start_block();
        chain.modify_row(TableTag::Account, 1, b"v1".to_vec());
        chain.remove_row(TableTag::Account, 1);

        let undo = chain.table(TableTag::Account).undo_frame().unwrap();
        assert!(undo.old_values.is_empty());
        assert_eq!(undo.removed_values.len(), 1);
        assert_eq!(undo.removed_values[0].1.payload, b"v0");
    }

    #[test]
    fn test_block_store() {
        let chain = MemoryChain::new();
        chain.put_block(7, b"raw block".to_vec());
        assert_eq!(chain.fetch_block_by_number(7).unwrap(), b"raw block");
        assert!(chain.fetch_block_by_number(8).is_none());
    }
}
