//! Two ways to answer "what happened to this address": joining the ledger tables right
//! away, or going through the address index then assembling the transactions.

mod index;
mod join;

pub use index::IndexResolver;
pub use join::JoinResolver;

use crate::{
    address::Address,
    error::ResolveError,
    ledger::{SpendRecord, TransactionView},
    page::{FieldMask, PageRequest},
};

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How fresh the answer must be with regard to the ingested ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    /// Read the Output and Input tables directly
    Canonical,
    /// Go through the address index, which may lag behind the ledger tables
    Indexed,
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Canonical => write!(f, "canonical"),
            Self::Indexed => write!(f, "indexed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub address: Address,
    pub page: PageRequest,
    pub fields: FieldMask,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum History {
    Spends(Vec<SpendRecord>),
    Transactions(Vec<TransactionView>),
}

impl History {
    pub fn len(&self) -> usize {
        match self {
            Self::Spends(s) => s.len(),
            Self::Transactions(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, query: &HistoryQuery) -> Result<History, ResolveError>;
}

/// Both strategies, and which one to use when the caller doesn't say.
#[derive(Clone)]
pub struct Resolvers {
    canonical: Arc<dyn AddressResolver>,
    indexed: Arc<dyn AddressResolver>,
    pub default_consistency: Consistency,
}

impl Resolvers {
    pub fn new(
        canonical: Arc<dyn AddressResolver>,
        indexed: Arc<dyn AddressResolver>,
        default_consistency: Consistency,
    ) -> Resolvers {
        Resolvers {
            canonical,
            indexed,
            default_consistency,
        }
    }

    pub async fn resolve(
        &self,
        consistency: Option<Consistency>,
        query: &HistoryQuery,
    ) -> Result<History, ResolveError> {
        match consistency.unwrap_or(self.default_consistency) {
            Consistency::Canonical => self.canonical.resolve(query).await,
            Consistency::Indexed => self.indexed.resolve(query).await,
        }
    }
}
