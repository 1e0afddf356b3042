//! The seams between the resolvers and whatever holds the ledger.

use crate::{
    address::Address,
    error::StoreError,
    ledger::{TransactionId, TransactionView},
    page::{FieldMask, PageRequest},
};

use async_trait::async_trait;

/// An output of an address left-joined with the inputs spending it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendRow {
    pub received: TransactionId,
    pub index: u32,
    pub block_time: i64,
    /// The smallest id among the spending transactions, if any
    pub spent: Option<TransactionId>,
    /// How many inputs reference this output. More than one is a double spend.
    pub spenders: u32,
}

/// The canonical Transaction / Output / Input records.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// All outputs of `address` with their spending transaction, in a single query,
    /// ordered by `block_time` descending then `received` and `index` ascending, and
    /// truncated to `limit` rows.
    async fn address_spends(
        &self,
        address: &Address,
        limit: u32,
    ) -> Result<Vec<SpendRow>, StoreError>;
}

/// The address mapping table. It's derived from the ledger records by the indexer and
/// may lag behind them.
#[async_trait]
pub trait AddressIndex: Send + Sync {
    /// Ids of the transactions touching `address` in the given window, ordered by
    /// `block_time` descending then id ascending.
    async fn transaction_page(
        &self,
        address: &Address,
        page: PageRequest,
    ) -> Result<Vec<TransactionId>, StoreError>;
}

/// Materializes full transactions out of their ids.
#[async_trait]
pub trait TransactionAssembler: Send + Sync {
    /// Must return the transactions in the order of `ids`, and be fine with up to
    /// `page::MAX_LIMIT` of them.
    async fn assemble(
        &self,
        ids: &[TransactionId],
        fields: &FieldMask,
    ) -> Result<Vec<TransactionView>, StoreError>;
}
