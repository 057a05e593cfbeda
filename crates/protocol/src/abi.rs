//! The self-describing protocol schema served once per connection.

/// ABI document pushed as the first (text) frame of every session.
///
/// Clients parse this to decode the binary frames that follow. The
/// variant tag order here is the wire contract; it never changes within
/// a protocol version.
pub const STATE_HISTORY_ABI: &str = r#"{
    "version": "scribe-state-history/1",
    "structs": [
        {
            "name": "get_status_request_v0",
            "fields": []
        },
        {
            "name": "get_block_request_v0",
            "fields": [
                { "name": "block_num", "type": "uint32" }
            ]
        },
        {
            "name": "get_status_result_v0",
            "fields": [
                { "name": "last_irreversible_block_num", "type": "uint32" },
                { "name": "last_irreversible_block_id", "type": "checksum256" },
                { "name": "state_begin_block", "type": "uint32" },
                { "name": "state_end_block", "type": "uint32" }
            ]
        },
        {
            "name": "get_block_result_v0",
            "fields": [
                { "name": "block_num", "type": "uint32" },
                { "name": "block", "type": "bytes?" },
                { "name": "block_state", "type": "bytes?" },
                { "name": "traces", "type": "bytes?" },
                { "name": "deltas", "type": "bytes?" }
            ]
        },
        {
            "name": "row",
            "fields": [
                { "name": "present", "type": "bool" },
                { "name": "data", "type": "bytes" }
            ]
        },
        {
            "name": "table_delta",
            "fields": [
                { "name": "name", "type": "string" },
                { "name": "rows", "type": "row[]" }
            ]
        }
    ],
    "variants": [
        { "name": "state_request", "types": ["get_status_request_v0", "get_block_request_v0"] },
        { "name": "state_result", "types": ["get_status_result_v0", "get_block_result_v0"] }
    ],
    "tables": [
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
        "resource_limits_config"
    ]
}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_types::TableTag;

    #[test]
    fn test_abi_names_every_table_tag() {
        for tag in TableTag::ALL {
            assert!(
                STATE_HISTORY_ABI.contains(&format!("\"{}\"", tag.as_str())),
                "ABI is missing table tag {}",
                tag.as_str()
            );
        }
    }

    #[test]
    fn test_abi_names_request_and_result_variants() {
        for name in [
            "get_status_request_v0",
            "get_block_request_v0",
            "get_status_result_v0",
            "get_block_result_v0",
        ] {
            assert!(STATE_HISTORY_ABI.contains(name));
        }
    }
}
