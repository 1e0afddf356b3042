use crate::error::ValidationError;

use std::collections::BTreeSet;

/// The most entries a single query will ever return.
pub const MAX_LIMIT: u32 = 500;
pub const DEFAULT_LIMIT: u32 = 50;

/// A window over an address' history, most recent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    limit: u32,
    offset: u32,
}

impl PageRequest {
    pub fn new(limit: u32, offset: u32) -> Result<PageRequest, ValidationError> {
        if limit == 0 || limit > MAX_LIMIT {
            return Err(ValidationError::Limit(limit));
        }

        Ok(PageRequest { limit, offset })
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// The page right after this one.
    pub fn next(&self) -> PageRequest {
        PageRequest {
            limit: self.limit,
            offset: self.offset.saturating_add(self.limit),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

/// A projection over the assembled transactions. We don't interpret it beyond splitting
/// the comma-separated names, that's up to the assembler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMask(Option<BTreeSet<String>>);

impl FieldMask {
    /// No projection, fetch everything.
    pub fn all() -> FieldMask {
        FieldMask(None)
    }

    pub fn parse(fields: &str) -> FieldMask {
        let names: BTreeSet<String> = fields
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(String::from)
            .collect();

        if names.is_empty() {
            FieldMask(None)
        } else {
            FieldMask(Some(names))
        }
    }

    pub fn includes(&self, field: &str) -> bool {
        self.0.as_ref().map(|f| f.contains(field)).unwrap_or(true)
    }
}
