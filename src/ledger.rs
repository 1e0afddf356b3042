//! The ledger records we read, as written by the indexer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A transaction hash, hex-encoded. Ordered lexicographically, which is what we use to
/// break ties between transactions sharing a block time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        TransactionId(s.to_string())
    }
}

/// A reference to a specific output of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Outpoint {
    pub transaction_id: TransactionId,
    pub index: u32,
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    /// Milliseconds since epoch of the accepting block
    pub block_time: i64,
    /// Taken from the accepting block, unknown until the indexer has it
    pub daa_score: Option<i64>,
    pub blue_score: Option<i64>,
    pub difficulty: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub transaction_id: TransactionId,
    pub index: u32,
    /// As written by the indexer. Not all scripts have an address, and the ones we get
    /// are not held to the format we require from requests.
    pub script_public_key_address: Option<String>,
    pub amount: i64,
}

impl Output {
    pub fn outpoint(&self) -> Outpoint {
        Outpoint {
            transaction_id: self.transaction_id.clone(),
            index: self.index,
        }
    }
}

/// An input of the (spending) transaction `transaction_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub transaction_id: TransactionId,
    pub index: u32,
    pub previous_outpoint_hash: TransactionId,
    pub previous_outpoint_index: u32,
}

impl Input {
    pub fn previous_outpoint(&self) -> Outpoint {
        Outpoint {
            transaction_id: self.previous_outpoint_hash.clone(),
            index: self.previous_outpoint_index,
        }
    }
}

/// An entry of the address index: `address` appears in `transaction_id`, either as an
/// output owner or as the owner of a spent previous output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressMapping {
    pub address: String,
    pub transaction_id: TransactionId,
    pub block_time: i64,
}

/// An output received by an address, and the transaction that spent it if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpendRecord {
    pub received: TransactionId,
    pub index: u32,
    pub block_time: i64,
    pub spent: Option<TransactionId>,
}

/// A transaction as handed back by the assembler. Inputs and outputs are `None` when
/// they were projected out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: Transaction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Vec<Input>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<Output>>,
}
