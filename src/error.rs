use std::fmt;

/// A request we refuse before touching the store. Never worth retrying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Address not matching the `<prefix>:<61 chars>` scheme
    Address(String),
    /// Page size out of the [1, 500] range
    Limit(u32),
    /// An offset on a strategy that doesn't paginate
    Offset(u32),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Address(a) => write!(f, "Invalid address '{}'", a),
            Self::Limit(l) => write!(
                f,
                "Invalid limit {}: must be between 1 and {}",
                l,
                crate::page::MAX_LIMIT
            ),
            Self::Offset(o) => write!(f, "Offset not supported by this query (got {})", o),
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug)]
pub enum StoreError {
    /// An error originating from the Postgres backend
    Postgres(tokio_postgres::Error),
    /// The query did not complete in time
    Timeout,
    /// The connection pool was shut down
    PoolClosed,
    /// Any other failure to get a connection out of the pool
    Pool(String),
    /// A row we could not make sense of
    Row(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Postgres(e) => write!(f, "{}", e),
            Self::Timeout => write!(f, "Query timed out"),
            Self::PoolClosed => write!(f, "Connection pool is closed"),
            Self::Pool(e) => write!(f, "Connection pool error: {}", e),
            Self::Row(e) => write!(f, "Unexpected row: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        Self::Postgres(e)
    }
}

impl From<deadpool_postgres::PoolError> for StoreError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        match e {
            deadpool_postgres::PoolError::Backend(e) => Self::Postgres(e),
            deadpool_postgres::PoolError::Closed => Self::PoolClosed,
            deadpool_postgres::PoolError::Timeout(_) => Self::Timeout,
            e => Self::Pool(e.to_string()),
        }
    }
}

/// Which store access failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SpendJoin,
    IndexLookup,
    Assembly,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SpendJoin => write!(f, "spend join"),
            Self::IndexLookup => write!(f, "address index lookup"),
            Self::Assembly => write!(f, "transaction assembly"),
        }
    }
}

#[derive(Debug)]
pub enum ResolveError {
    Validation(ValidationError),
    /// The store failed us. The same request may succeed later.
    Infrastructure { stage: Stage, source: StoreError },
}

impl ResolveError {
    pub fn infra(stage: Stage) -> impl FnOnce(StoreError) -> ResolveError {
        move |source| ResolveError::Infrastructure { stage, source }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Infrastructure { .. })
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "{}", e),
            Self::Infrastructure { stage, source } => {
                write!(f, "Store error during {}: {}", stage, source)
            }
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Validation(e) => Some(e),
            Self::Infrastructure { source, .. } => Some(source),
        }
    }
}

impl From<ValidationError> for ResolveError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}
