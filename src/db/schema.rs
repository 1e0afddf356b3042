// The tables are created and filled by the indexer, we only ever read them.
pub const LEDGER_TABLES: &[&str] = &[
    "blocks",
    "transactions",
    "transactions_outputs",
    "transactions_inputs",
    "tx_id_address_mapping",
];

// Ids are compared bytewise, as we do in memory, whatever the database collation.

pub const ADDRESS_SPENDS: &str = "\
SELECT o.transaction_id, o.index::INT4, t.block_time::INT8, s.spent, s.spenders
FROM transactions_outputs o
INNER JOIN transactions t ON t.transaction_id = o.transaction_id
LEFT JOIN LATERAL (
    SELECT MIN(i.transaction_id COLLATE \"C\") AS spent, COUNT(*)::INT4 AS spenders
    FROM transactions_inputs i
    WHERE i.previous_outpoint_hash = o.transaction_id
        AND i.previous_outpoint_index::INT4 = o.index
) s ON TRUE
WHERE o.script_public_key_address = $1
ORDER BY t.block_time DESC, o.transaction_id COLLATE \"C\" ASC, o.index ASC
LIMIT $2";

pub const ADDRESS_TRANSACTIONS_PAGE: &str = "\
SELECT transaction_id
FROM tx_id_address_mapping
WHERE address = $1
ORDER BY block_time DESC, transaction_id COLLATE \"C\" ASC
LIMIT $2 OFFSET $3";

// The chain metadata lives on the accepting block, which may not be there yet.
pub const TRANSACTIONS_BY_ID: &str = "\
SELECT t.transaction_id, t.block_time::INT8, b.daa_score, b.blue_score, b.difficulty
FROM transactions t
LEFT JOIN blocks b ON b.hash = t.accepting_block_hash
WHERE t.transaction_id = ANY($1)";

pub const INPUTS_BY_TRANSACTION: &str = "\
SELECT transaction_id, index::INT4, previous_outpoint_hash, previous_outpoint_index::INT4
FROM transactions_inputs
WHERE transaction_id = ANY($1)
ORDER BY index ASC";

pub const OUTPUTS_BY_TRANSACTION: &str = "\
SELECT transaction_id, index::INT4, script_public_key_address, amount
FROM transactions_outputs
WHERE transaction_id = ANY($1)
ORDER BY index ASC";

pub const EXISTING_TABLES: &str = "\
SELECT table_name::TEXT
FROM information_schema.tables
WHERE table_schema = current_schema() AND table_name::TEXT = ANY($1)";
