use super::{AddressResolver, History, HistoryQuery};
use crate::{
    address::Address,
    error::{ResolveError, Stage, ValidationError},
    ledger::SpendRecord,
    page::MAX_LIMIT,
    spend::spend_records,
    store::LedgerStore,
};

use std::sync::Arc;

use async_trait::async_trait;

/// Resolves the received and spent outputs of an address with a join on the ledger tables.
/// Always up to date with what the indexer wrote, but only ever gives the latest entries.
pub struct JoinResolver<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> JoinResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The outputs received by `address`, most recent first, along with the transaction
    /// that spent each of them if any. At most `MAX_LIMIT` entries are returned.
    pub async fn resolve_address_history(
        &self,
        address: &Address,
        limit: u32,
    ) -> Result<Vec<SpendRecord>, ResolveError> {
        if limit == 0 {
            return Err(ValidationError::Limit(limit).into());
        }
        let limit = limit.min(MAX_LIMIT);

        let rows = self
            .store
            .address_spends(address, limit)
            .await
            .map_err(ResolveError::infra(Stage::SpendJoin))?;
        log::trace!("Got {} spend rows for '{}'", rows.len(), address);

        Ok(spend_records(address, rows))
    }
}

#[async_trait]
impl<S: LedgerStore> AddressResolver for JoinResolver<S> {
    async fn resolve(&self, query: &HistoryQuery) -> Result<History, ResolveError> {
        if query.page.offset() != 0 {
            return Err(ValidationError::Offset(query.page.offset()).into());
        }

        self.resolve_address_history(&query.address, query.page.limit())
            .await
            .map(History::Spends)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::StoreError,
        ledger::TransactionId,
        memory::MemoryLedger,
        page::{FieldMask, PageRequest},
        resolver::tests::*,
        store::SpendRow,
    };

    #[tokio::test]
    async fn spent_and_unspent_outputs() {
        let resolver = JoinResolver::new(Arc::new(sample_ledger()));
        let records = resolver
            .resolve_address_history(&addr(ADDR), 10)
            .await
            .unwrap();

        let summary: Vec<(&str, u32, Option<&str>)> = records
            .iter()
            .map(|r| {
                (
                    r.received.0.as_str(),
                    r.index,
                    r.spent.as_ref().map(|s| s.0.as_str()),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                ("tx3", 0, None),
                ("tx1", 0, Some("tx2")),
                ("tx1", 1, None),
            ]
        );

        // Nothing was ever received by the other address in tx1/tx3
        let records = resolver
            .resolve_address_history(&addr(OTHER), 10)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].received, TransactionId::from("tx2"));
        assert_eq!(records[0].spent, None);
    }

    #[tokio::test]
    async fn ordered_by_block_time_then_id() {
        let mut ledger = MemoryLedger::new();
        // Inserted out of order on purpose
        for (id, time) in &[("tx_c", 5), ("tx_b", 7), ("tx_a", 5), ("tx_d", 9), ("tx_e", 7)] {
            ledger.insert_transaction(tx(id, *time), vec![], vec![output(id, 0, ADDR)]);
        }
        let resolver = JoinResolver::new(Arc::new(ledger));
        let records = resolver
            .resolve_address_history(&addr(ADDR), 500)
            .await
            .unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.received.0.as_str()).collect();
        assert_eq!(ids, vec!["tx_d", "tx_b", "tx_e", "tx_a", "tx_c"]);
        for pair in records.windows(2) {
            assert!(pair[0].block_time >= pair[1].block_time);
            if pair[0].block_time == pair[1].block_time {
                assert!(pair[0].received <= pair[1].received);
            }
        }
    }

    #[tokio::test]
    async fn double_spend_picks_smallest_spender() {
        let mut ledger = sample_ledger();
        // Two more spends of (tx1, 1), the smallest id must win no matter the insertion order
        ledger.insert_transaction(tx("tx5", 300), vec![input("tx5", 0, "tx1", 1)], vec![]);
        ledger.insert_transaction(tx("tx4", 300), vec![input("tx4", 0, "tx1", 1)], vec![]);
        let resolver = JoinResolver::new(Arc::new(ledger));

        for _ in 0..3 {
            let records = resolver
                .resolve_address_history(&addr(ADDR), 10)
                .await
                .unwrap();
            let record = records
                .iter()
                .find(|r| r.received.0 == "tx1" && r.index == 1)
                .unwrap();
            assert_eq!(record.spent, Some(TransactionId::from("tx4")));
        }
    }

    #[tokio::test]
    async fn capped_and_validated() {
        let mut ledger = MemoryLedger::new();
        let outputs = (0..600).map(|i| output("big", i, ADDR)).collect();
        ledger.insert_transaction(tx("big", 1), vec![], outputs);
        let resolver = JoinResolver::new(Arc::new(ledger));

        let records = resolver
            .resolve_address_history(&addr(ADDR), 10_000)
            .await
            .unwrap();
        assert_eq!(records.len(), 500);
        assert!(records.iter().all(|r| r.index < 500));

        assert!(matches!(
            resolver.resolve_address_history(&addr(ADDR), 0).await,
            Err(ResolveError::Validation(ValidationError::Limit(0)))
        ));

        let query = HistoryQuery {
            address: addr(ADDR),
            page: PageRequest::new(10, 10).unwrap(),
            fields: FieldMask::all(),
        };
        assert!(matches!(
            resolver.resolve(&query).await,
            Err(ResolveError::Validation(ValidationError::Offset(10)))
        ));
    }

    struct Unavailable;

    #[async_trait]
    impl LedgerStore for Unavailable {
        async fn address_spends(
            &self,
            _: &Address,
            _: u32,
        ) -> Result<Vec<SpendRow>, StoreError> {
            Err(StoreError::PoolClosed)
        }
    }

    #[tokio::test]
    async fn store_failure_is_retryable() {
        let resolver = JoinResolver::new(Arc::new(Unavailable));
        let err = resolver
            .resolve_address_history(&addr(ADDR), 10)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            ResolveError::Infrastructure {
                stage: Stage::SpendJoin,
                ..
            }
        ));
    }
}
