use crate::{
    address::Address,
    ledger::{SpendRecord, TransactionId},
    store::SpendRow,
};

use std::cmp::Ordering;

/// History order: most recent block first, then by transaction id, then by output index.
pub fn history_order(
    a: (i64, &TransactionId, u32),
    b: (i64, &TransactionId, u32),
) -> Ordering {
    b.0.cmp(&a.0)
        .then_with(|| a.1.cmp(b.1))
        .then_with(|| a.2.cmp(&b.2))
}

/// Turn the joined rows into records. An output spent by more than one input can only be
/// a non-canonical double spend or an indexer bug: we keep the smallest spender (the store
/// already picked it) and make some noise about it.
pub fn spend_records(address: &Address, rows: Vec<SpendRow>) -> Vec<SpendRecord> {
    rows.into_iter()
        .map(|row| {
            if row.spenders > 1 {
                log::warn!(
                    "Output '{}:{}' of '{}' is spent by {} inputs, reporting '{}' as spender",
                    row.received,
                    row.index,
                    address,
                    row.spenders,
                    row.spent
                        .as_ref()
                        .map(|s| s.0.as_str())
                        .unwrap_or("<none>"),
                );
            }

            SpendRecord {
                received: row.received,
                index: row.index,
                block_time: row.block_time,
                spent: row.spent,
            }
        })
        .collect()
}
