//! A ledger held in memory. It mirrors what the Postgres queries compute, and is what we
//! test the resolvers against.

use crate::{
    address::Address,
    error::StoreError,
    ledger::{AddressMapping, Input, Outpoint, Output, Transaction, TransactionId, TransactionView},
    page::{FieldMask, PageRequest},
    spend::history_order,
    store::{AddressIndex, LedgerStore, SpendRow, TransactionAssembler},
};

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct MemoryLedger {
    transactions: HashMap<TransactionId, Transaction>,
    outputs: BTreeMap<Outpoint, Output>,
    inputs: BTreeMap<(TransactionId, u32), Input>,
    // Back-references from an outpoint to the transactions spending it
    spenders: BTreeMap<Outpoint, BTreeSet<TransactionId>>,
    mappings: Vec<AddressMapping>,
}

impl MemoryLedger {
    pub fn new() -> MemoryLedger {
        MemoryLedger::default()
    }

    /// Record a transaction along with its inputs and outputs, without touching the
    /// address index.
    pub fn insert_transaction(
        &mut self,
        transaction: Transaction,
        inputs: Vec<Input>,
        outputs: Vec<Output>,
    ) {
        for input in inputs {
            self.spenders
                .entry(input.previous_outpoint())
                .or_insert_with(BTreeSet::new)
                .insert(input.transaction_id.clone());
            self.inputs
                .insert((input.transaction_id.clone(), input.index), input);
        }
        for output in outputs {
            self.outputs.insert(output.outpoint(), output);
        }
        self.transactions
            .insert(transaction.transaction_id.clone(), transaction);
    }

    /// Add the address index entries for an already inserted transaction: one per address
    /// owning one of its outputs or one of the outputs it spends.
    pub fn index_transaction(&mut self, txid: &TransactionId) {
        let block_time = match self.transactions.get(txid) {
            Some(tx) => tx.block_time,
            None => return,
        };

        let mut addresses: BTreeSet<String> = self
            .outputs_of(txid)
            .filter_map(|o| o.script_public_key_address.clone())
            .collect();
        addresses.extend(
            self.inputs_of(txid)
                .filter_map(|i| self.outputs.get(&i.previous_outpoint()))
                .filter_map(|o| o.script_public_key_address.clone()),
        );

        for address in addresses {
            let mapping = AddressMapping {
                address,
                transaction_id: txid.clone(),
                block_time,
            };
            if !self.mappings.contains(&mapping) {
                self.mappings.push(mapping);
            }
        }
    }

    fn outputs_of<'a>(&'a self, txid: &TransactionId) -> impl Iterator<Item = &'a Output> {
        let start = Outpoint {
            transaction_id: txid.clone(),
            index: 0,
        };
        let end = Outpoint {
            transaction_id: txid.clone(),
            index: u32::MAX,
        };
        self.outputs.range(start..=end).map(|(_, o)| o)
    }

    fn inputs_of<'a>(&'a self, txid: &TransactionId) -> impl Iterator<Item = &'a Input> {
        self.inputs
            .range((txid.clone(), 0)..=(txid.clone(), u32::MAX))
            .map(|(_, i)| i)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn address_spends(
        &self,
        address: &Address,
        limit: u32,
    ) -> Result<Vec<SpendRow>, StoreError> {
        let mut rows: Vec<SpendRow> = self
            .outputs
            .iter()
            .filter(|(_, o)| o.script_public_key_address.as_deref() == Some(address.as_str()))
            .filter_map(|(outpoint, output)| {
                let tx = self.transactions.get(&output.transaction_id)?;
                let spenders = self.spenders.get(outpoint);
                Some(SpendRow {
                    received: output.transaction_id.clone(),
                    index: output.index,
                    block_time: tx.block_time,
                    spent: spenders.and_then(|s| s.iter().next().cloned()),
                    spenders: spenders.map(|s| s.len() as u32).unwrap_or(0),
                })
            })
            .collect();

        rows.sort_by(|a, b| {
            history_order(
                (a.block_time, &a.received, a.index),
                (b.block_time, &b.received, b.index),
            )
        });
        rows.truncate(limit as usize);

        Ok(rows)
    }
}

#[async_trait]
impl AddressIndex for MemoryLedger {
    async fn transaction_page(
        &self,
        address: &Address,
        page: PageRequest,
    ) -> Result<Vec<TransactionId>, StoreError> {
        let mut entries: Vec<&AddressMapping> = self
            .mappings
            .iter()
            .filter(|m| m.address == address.as_str())
            .collect();
        entries.sort_by(|a, b| {
            history_order(
                (a.block_time, &a.transaction_id, 0),
                (b.block_time, &b.transaction_id, 0),
            )
        });

        Ok(entries
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .map(|m| m.transaction_id.clone())
            .collect())
    }
}

#[async_trait]
impl TransactionAssembler for MemoryLedger {
    async fn assemble(
        &self,
        ids: &[TransactionId],
        fields: &FieldMask,
    ) -> Result<Vec<TransactionView>, StoreError> {
        // Ids the index knows about but whose transaction isn't there (yet) are skipped
        Ok(ids
            .iter()
            .filter_map(|id| self.transactions.get(id))
            .map(|tx| TransactionView {
                transaction: tx.clone(),
                inputs: if fields.includes("inputs") {
                    Some(self.inputs_of(&tx.transaction_id).cloned().collect())
                } else {
                    None
                },
                outputs: if fields.includes("outputs") {
                    Some(self.outputs_of(&tx.transaction_id).cloned().collect())
                } else {
                    None
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::tests::*;

    #[tokio::test]
    async fn smallest_spender_wins() {
        let mut ledger = MemoryLedger::new();
        ledger.insert_transaction(tx("tx1", 1), vec![], vec![output("tx1", 0, ADDR)]);
        ledger.insert_transaction(tx("tx5", 2), vec![input("tx5", 0, "tx1", 0)], vec![]);
        ledger.insert_transaction(tx("tx3", 3), vec![input("tx3", 0, "tx1", 0)], vec![]);

        let rows = ledger.address_spends(&addr(ADDR), 10).await.unwrap();
        assert_eq!(
            rows,
            vec![SpendRow {
                received: "tx1".into(),
                index: 0,
                block_time: 1,
                spent: Some("tx3".into()),
                spenders: 2,
            }]
        );
    }

    #[tokio::test]
    async fn index_entries_for_both_sides() {
        let ledger = sample_ledger();

        // tx2 only spends from ADDR and pays OTHER, it shows up for both
        let page = PageRequest::default();
        let for_addr = ledger.transaction_page(&addr(ADDR), page).await.unwrap();
        let for_other = ledger.transaction_page(&addr(OTHER), page).await.unwrap();
        assert!(for_addr.contains(&"tx2".into()));
        assert_eq!(for_other, vec![TransactionId::from("tx2")]);

        // Indexing twice doesn't duplicate entries
        let mut ledger = ledger;
        ledger.index_transaction(&"tx2".into());
        let again = ledger.transaction_page(&addr(ADDR), page).await.unwrap();
        assert_eq!(again, for_addr);
    }

    #[tokio::test]
    async fn assembly_projection() {
        let ledger = sample_ledger();
        let ids = vec![TransactionId::from("tx2"), "unknown".into(), "tx1".into()];

        let views = ledger.assemble(&ids, &FieldMask::all()).await.unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].transaction.transaction_id, "tx2".into());
        assert_eq!(views[0].inputs.as_ref().unwrap().len(), 1);
        assert_eq!(views[1].outputs.as_ref().unwrap().len(), 2);

        let views = ledger
            .assemble(&ids, &FieldMask::parse("inputs"))
            .await
            .unwrap();
        assert!(views.iter().all(|v| v.outputs.is_none() && v.inputs.is_some()));
    }
}
