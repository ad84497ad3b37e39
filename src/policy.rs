//! Read-only query policy.
//!
//! A prefix check, not a parser: the statement must start with `SELECT` in any
//! letter case once surrounding whitespace is trimmed. Statements that reach a
//! SELECT only after a leading comment or a `WITH` clause are rejected. The
//! read-only open mode is what actually prevents writes.

use crate::error::{QueryError, Result};

const SELECT_PREFIX: &[u8] = b"SELECT";

/// Returns `Ok` when `query` begins with SELECT.
pub fn ensure_select(query: &str) -> Result<()> {
    let allowed = query
        .trim()
        .as_bytes()
        .get(..SELECT_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(SELECT_PREFIX));

    if allowed {
        Ok(())
    } else {
        Err(QueryError::PolicyViolation)
    }
}
