//! Per-table state delta shapes and their packed encoding.
//!
//! A delta describes one table's changes within one block: post-images for
//! inserts and modifications, pre-images for removals. The table tag set and
//! its order are part of the wire contract; clients rely on tag stability.

use crate::codec::{put_bytes, put_str, put_varint, ByteReader, CodecError};

/// Closed set of state tables, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableTag {
    Account,
    ContractTable,
    ContractRow,
    ContractIndex64,
    ContractIndex128,
    ContractIndex256,
    ContractIndexDouble,
    ContractIndexLongDouble,
    GlobalProperty,
    GeneratedTransaction,
    Permission,
    PermissionLink,
    ResourceLimits,
    ResourceUsage,
    ResourceLimitsState,
    ResourceLimitsConfig,
}

impl TableTag {
    /// Every table in the order deltas are emitted. The order is part of
    /// the wire contract.
    pub const ALL: [TableTag; 16] = [
        TableTag::Account,
        TableTag::ContractTable,
        TableTag::ContractRow,
        TableTag::ContractIndex64,
        TableTag::ContractIndex128,
        TableTag::ContractIndex256,
        TableTag::ContractIndexDouble,
        TableTag::ContractIndexLongDouble,
        TableTag::GlobalProperty,
        TableTag::GeneratedTransaction,
        TableTag::Permission,
        TableTag::PermissionLink,
        TableTag::ResourceLimits,
        TableTag::ResourceUsage,
        TableTag::ResourceLimitsState,
        TableTag::ResourceLimitsConfig,
    ];

    /// UTF-8 tag written to the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            TableTag::Account => "account",
            TableTag::ContractTable => "contract_table",
            TableTag::ContractRow => "contract_row",
            TableTag::ContractIndex64 => "contract_index64",
            TableTag::ContractIndex128 => "contract_index128",
            TableTag::ContractIndex256 => "contract_index256",
            TableTag::ContractIndexDouble => "contract_index_double",
            TableTag::ContractIndexLongDouble => "contract_index_long_double",
            TableTag::GlobalProperty => "global_property",
            TableTag::GeneratedTransaction => "generated_transaction",
            TableTag::Permission => "permission",
            TableTag::PermissionLink => "permission_link",
            TableTag::ResourceLimits => "resource_limits",
            TableTag::ResourceUsage => "resource_usage",
            TableTag::ResourceLimitsState => "resource_limits_state",
            TableTag::ResourceLimitsConfig => "resource_limits_config",
        }
    }

    /// Parse a wire tag.
    pub fn from_str(s: &str) -> Option<TableTag> {
        TableTag::ALL.iter().copied().find(|t| t.as_str() == s)
    }

    /// Rows of contract-scoped tables carry a `t_id` reference that is
    /// resolved against the `contract_table` table when packing.
    pub fn is_contract_scoped(&self) -> bool {
        matches!(
            self,
            TableTag::ContractRow
                | TableTag::ContractIndex64
                | TableTag::ContractIndex128
                | TableTag::ContractIndex256
                | TableTag::ContractIndexDouble
                | TableTag::ContractIndexLongDouble
        )
    }
}

/// One row inside a delta.
///
/// `present` is `true` for inserts, modifications, and fresh-snapshot rows
/// (where `data` is the post-image), `false` for removals (where `data` is
/// the captured pre-image).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaRow {
    pub present: bool,
    pub data: Vec<u8>,
}

/// All changes to one table within one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDelta {
    pub tag: TableTag,
    pub rows: Vec<DeltaRow>,
}

impl TableDelta {
    /// Pack a delta vector: varint count, then per delta the tag string and
    /// a varint-counted row vector (`present` byte ∥ length-prefixed data).
    pub fn pack_vec(deltas: &[TableDelta]) -> Vec<u8> {
        let mut out = Vec::new();
        put_varint(&mut out, deltas.len() as u64);
        for delta in deltas {
            put_str(&mut out, delta.tag.as_str());
            put_varint(&mut out, delta.rows.len() as u64);
            for row in &delta.rows {
                out.push(u8::from(row.present));
                put_bytes(&mut out, &row.data);
            }
        }
        out
    }

    /// Unpack a delta vector. Inverse of [`pack_vec`](Self::pack_vec).
    pub fn unpack_vec(buf: &[u8]) -> Result<Vec<TableDelta>, CodecError> {
        let mut r = ByteReader::new(buf);
        let count = r.varint()?;
        let mut deltas = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let name = r.str()?;
            let tag = TableTag::from_str(name)
                .ok_or_else(|| CodecError::UnknownTable(name.to_string()))?;
            let row_count = r.varint()?;
            let mut rows = Vec::with_capacity(row_count.min(4096) as usize);
            for _ in 0..row_count {
                let present = r.u8()? != 0;
                rows.push(DeltaRow {
                    present,
                    data: r.bytes()?.to_vec(),
                });
            }
            deltas.push(TableDelta { tag, rows });
        }
        Ok(deltas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_order_is_stable() {
        let names: Vec<&str> = TableTag::ALL.iter().map(|t| t.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "account",
                "contract_table",
                "contract_row",
                "contract_index64",
                "contract_index128",
                "contract_index256",
                "contract_index_double",
                "contract_index_long_double",
                "global_property",
                "generated_transaction",
                "permission",
                "permission_link",
                "resource_limits",
                "resource_usage",
                "resource_limits_state",
                "resource_limits_config",
            ]
        );
    }

    #[test]
    fn test_contract_scoped_tables() {
        assert!(TableTag::ContractRow.is_contract_scoped());
        assert!(TableTag::ContractIndexLongDouble.is_contract_scoped());
        assert!(!TableTag::Account.is_contract_scoped());
        assert!(!TableTag::ContractTable.is_contract_scoped());
    }

    #[test]
    fn test_pack_roundtrip() {
        let deltas = vec![
            TableDelta {
                tag: TableTag::Account,
                rows: vec![
                    DeltaRow { present: true, data: b"alice".to_vec() },
                    DeltaRow { present: false, data: b"bob".to_vec() },
                ],
            },
            TableDelta {
                tag: TableTag::Permission,
                rows: vec![DeltaRow { present: true, data: vec![] }],
            },
        ];
        let packed = TableDelta::pack_vec(&deltas);
        assert_eq!(TableDelta::unpack_vec(&packed).unwrap(), deltas);
    }

    #[test]
    fn test_unpack_rejects_unknown_tag() {
        let deltas = vec![TableDelta { tag: TableTag::Account, rows: vec![] }];
        let mut packed = TableDelta::pack_vec(&deltas);
        // Corrupt one byte of the "account" tag string.
        packed[6] = b'X';
        assert!(matches!(
            TableDelta::unpack_vec(&packed),
            Err(CodecError::UnknownTable(_))
        ));
    }
}
