mod schema;

use crate::{
    address::Address,
    error::StoreError,
    ledger::{Input, Output, Transaction, TransactionId, TransactionView},
    page::{FieldMask, PageRequest},
    store::{AddressIndex, LedgerStore, SpendRow, TransactionAssembler},
};
use schema::*;

use std::{collections::HashMap, convert::TryFrom, future::Future, time::Duration};

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::{types::Type, NoTls, Row};

/// At most `max_connections` connections to the ledger database, kept open and handed
/// out again once an access is done with them.
#[derive(Clone)]
pub struct DbPool {
    pool: Pool,
    query_timeout: Duration,
}

impl DbPool {
    pub fn new(
        config: tokio_postgres::Config,
        max_connections: usize,
        query_timeout: Duration,
    ) -> Result<DbPool, StoreError> {
        let manager = Manager::from_config(
            config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(max_connections)
            .build()
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        Ok(DbPool {
            pool,
            query_timeout,
        })
    }

    /// A connection out of the pool, back into it once dropped.
    pub async fn get(&self) -> Result<Object, StoreError> {
        Ok(self.pool.get().await?)
    }

    /// Run a store access under the query timeout. Whatever it acquired is released if it
    /// fails, times out, or is dropped by the caller.
    pub async fn timed<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.query_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    pub fn close(&self) {
        self.pool.close();
    }
}

/// The ledger tables the indexer has not created (yet).
pub async fn missing_tables(pool: &DbPool) -> Result<Vec<&'static str>, StoreError> {
    let existing = pool.timed(existing_tables(pool)).await?;

    Ok(LEDGER_TABLES
        .iter()
        .copied()
        .filter(|table| !existing.iter().any(|e| e == table))
        .collect())
}

async fn existing_tables(pool: &DbPool) -> Result<Vec<String>, StoreError> {
    let client = pool.get().await?;

    client
        .query(EXISTING_TABLES, &[&LEDGER_TABLES])
        .await?
        .iter()
        .map(|row| row.try_get(0).map_err(StoreError::from))
        .collect()
}

fn index_from_sql(index: i32) -> Result<u32, StoreError> {
    u32::try_from(index).map_err(|_| StoreError::Row(format!("Negative index {}", index)))
}

/// The ledger tables in Postgres.
pub struct PgLedger {
    pool: DbPool,
}

impl PgLedger {
    pub fn new(pool: DbPool) -> PgLedger {
        PgLedger { pool }
    }

    fn spend_from_row(row: &Row) -> Result<SpendRow, StoreError> {
        Ok(SpendRow {
            received: TransactionId(row.try_get(0)?),
            index: index_from_sql(row.try_get(1)?)?,
            block_time: row.try_get(2)?,
            spent: row.try_get::<_, Option<String>>(3)?.map(TransactionId),
            spenders: index_from_sql(row.try_get(4)?)?,
        })
    }

    fn transaction_from_row(row: &Row) -> Result<Transaction, StoreError> {
        Ok(Transaction {
            transaction_id: TransactionId(row.try_get(0)?),
            block_time: row.try_get(1)?,
            daa_score: row.try_get(2)?,
            blue_score: row.try_get(3)?,
            difficulty: row.try_get(4)?,
        })
    }

    fn input_from_row(row: &Row) -> Result<Input, StoreError> {
        Ok(Input {
            transaction_id: TransactionId(row.try_get(0)?),
            index: index_from_sql(row.try_get(1)?)?,
            previous_outpoint_hash: TransactionId(row.try_get(2)?),
            previous_outpoint_index: index_from_sql(row.try_get(3)?)?,
        })
    }

    fn output_from_row(row: &Row) -> Result<Output, StoreError> {
        Ok(Output {
            transaction_id: TransactionId(row.try_get(0)?),
            index: index_from_sql(row.try_get(1)?)?,
            script_public_key_address: row.try_get(2)?,
            amount: row.try_get(3)?,
        })
    }

    async fn query_spends(
        &self,
        address: &Address,
        limit: u32,
    ) -> Result<Vec<SpendRow>, StoreError> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_typed_cached(ADDRESS_SPENDS, &[Type::TEXT, Type::INT8])
            .await?;

        client
            .query(&statement, &[&address.as_str(), &(limit as i64)])
            .await?
            .iter()
            .map(Self::spend_from_row)
            .collect()
    }

    async fn query_page(
        &self,
        address: &Address,
        page: PageRequest,
    ) -> Result<Vec<TransactionId>, StoreError> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_typed_cached(ADDRESS_TRANSACTIONS_PAGE, &[Type::TEXT, Type::INT8, Type::INT8])
            .await?;

        client
            .query(
                &statement,
                &[
                    &address.as_str(),
                    &(page.limit() as i64),
                    &(page.offset() as i64),
                ],
            )
            .await?
            .iter()
            .map(|row| {
                row.try_get(0)
                    .map(TransactionId)
                    .map_err(StoreError::from)
            })
            .collect()
    }

    async fn query_transactions(
        &self,
        ids: &[TransactionId],
        fields: &FieldMask,
    ) -> Result<Vec<TransactionView>, StoreError> {
        let with_inputs = fields.includes("inputs");
        let with_outputs = fields.includes("outputs");
        let client = self.pool.get().await?;
        let id_params: Vec<&str> = ids.iter().map(|id| id.0.as_str()).collect();

        let mut transactions = HashMap::with_capacity(ids.len());
        let statement = client
            .prepare_typed_cached(TRANSACTIONS_BY_ID, &[Type::TEXT_ARRAY])
            .await?;
        for row in client.query(&statement, &[&id_params]).await? {
            let transaction = Self::transaction_from_row(&row)?;
            transactions.insert(transaction.transaction_id.clone(), transaction);
        }

        let mut inputs: HashMap<TransactionId, Vec<Input>> = HashMap::new();
        if with_inputs {
            let statement = client
                .prepare_typed_cached(INPUTS_BY_TRANSACTION, &[Type::TEXT_ARRAY])
                .await?;
            for row in client.query(&statement, &[&id_params]).await? {
                let input = Self::input_from_row(&row)?;
                inputs
                    .entry(input.transaction_id.clone())
                    .or_insert_with(Vec::new)
                    .push(input);
            }
        }

        let mut outputs: HashMap<TransactionId, Vec<Output>> = HashMap::new();
        if with_outputs {
            let statement = client
                .prepare_typed_cached(OUTPUTS_BY_TRANSACTION, &[Type::TEXT_ARRAY])
                .await?;
            for row in client.query(&statement, &[&id_params]).await? {
                let output = Self::output_from_row(&row)?;
                outputs
                    .entry(output.transaction_id.clone())
                    .or_insert_with(Vec::new)
                    .push(output);
            }
        }

        // Back to the order we were given. Unknown ids are skipped.
        Ok(ids
            .iter()
            .filter_map(|id| {
                let transaction = transactions.get(id)?.clone();
                Some(TransactionView {
                    transaction,
                    inputs: if with_inputs {
                        Some(inputs.get(id).cloned().unwrap_or_default())
                    } else {
                        None
                    },
                    outputs: if with_outputs {
                        Some(outputs.get(id).cloned().unwrap_or_default())
                    } else {
                        None
                    },
                })
            })
            .collect())
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn address_spends(
        &self,
        address: &Address,
        limit: u32,
    ) -> Result<Vec<SpendRow>, StoreError> {
        self.pool.timed(self.query_spends(address, limit)).await
    }
}

#[async_trait]
impl AddressIndex for PgLedger {
    async fn transaction_page(
        &self,
        address: &Address,
        page: PageRequest,
    ) -> Result<Vec<TransactionId>, StoreError> {
        self.pool.timed(self.query_page(address, page)).await
    }
}

#[async_trait]
impl TransactionAssembler for PgLedger {
    async fn assemble(
        &self,
        ids: &[TransactionId],
        fields: &FieldMask,
    ) -> Result<Vec<TransactionView>, StoreError> {
        self.pool.timed(self.query_transactions(ids, fields)).await
    }
}
