use super::{AddressResolver, History, HistoryQuery};
use crate::{
    address::Address,
    error::{ResolveError, Stage},
    ledger::{TransactionId, TransactionView},
    page::{FieldMask, PageRequest},
    store::{AddressIndex, TransactionAssembler},
};

use std::sync::Arc;

use async_trait::async_trait;

/// Pages through the address index and hands each page of ids to the assembler.
///
/// Pages are offset based: if the indexer adds an entry for this address between two
/// page fetches, an entry at the boundary may show up twice or not at all. Walking the
/// pages of a static ledger yields the whole history exactly once.
pub struct IndexResolver<I, A> {
    index: Arc<I>,
    assembler: Arc<A>,
}

impl<I: AddressIndex, A: TransactionAssembler> IndexResolver<I, A> {
    pub fn new(index: Arc<I>, assembler: Arc<A>) -> Self {
        Self { index, assembler }
    }

    /// The ids of the transactions touching `address` in this window, most recent first.
    pub async fn lookup_transaction_page(
        &self,
        address: &Address,
        page: PageRequest,
    ) -> Result<Vec<TransactionId>, ResolveError> {
        self.index
            .transaction_page(address, page)
            .await
            .map_err(ResolveError::infra(Stage::IndexLookup))
    }

    /// The assembled transactions of a page, in the order of the index.
    pub async fn transactions_page(
        &self,
        address: &Address,
        page: PageRequest,
        fields: &FieldMask,
    ) -> Result<Vec<TransactionView>, ResolveError> {
        let ids = self.lookup_transaction_page(address, page).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let transactions = self
            .assembler
            .assemble(&ids, fields)
            .await
            .map_err(ResolveError::infra(Stage::Assembly))?;
        if transactions.len() != ids.len() {
            // The index got ahead of the transactions table
            log::debug!(
                "Only {} of {} indexed transactions of '{}' could be assembled",
                transactions.len(),
                ids.len(),
                address
            );
        }

        Ok(transactions)
    }
}

#[async_trait]
impl<I, A> AddressResolver for IndexResolver<I, A>
where
    I: AddressIndex,
    A: TransactionAssembler,
{
    async fn resolve(&self, query: &HistoryQuery) -> Result<History, ResolveError> {
        self.transactions_page(&query.address, query.page, &query.fields)
            .await
            .map(History::Transactions)
    }
}
