//! Ledger identity validation.
//!
//! A ledger id names a directory in both stores, so it is restricted to a
//! filesystem-safe alphabet:
//! - Must be non-empty and at most 249 bytes
//! - Must start with an ASCII letter or digit
//! - May contain only ASCII letters, digits, `.`, `-` and `_`
//! - Must not contain `..`

use crate::error::TypeError;

const MAX_LEN: usize = 249;

/// Validate a ledger id, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use pdl_types::ledger_id::validate_ledger_id;
///
/// assert!(validate_ledger_id("testLedger").is_ok());
/// assert!(validate_ledger_id("my-chain.v2").is_ok());
/// assert!(validate_ledger_id("").is_err());
/// assert!(validate_ledger_id("../etc").is_err());
/// ```
pub fn validate_ledger_id(id: &str) -> Result<(), TypeError> {
    let invalid = |reason: &str| TypeError::InvalidLedgerId {
        id: id.to_string(),
        reason: reason.to_string(),
    };

    if id.is_empty() {
        return Err(invalid("ledger id must not be empty"));
    }
    if id.len() > MAX_LEN {
        return Err(invalid("ledger id is longer than 249 bytes"));
    }
    if !id.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(invalid("must start with a letter or digit"));
    }
    if let Some(ch) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')))
    {
        return Err(invalid(&format!("contains forbidden character: {ch:?}")));
    }
    if id.contains("..") {
        return Err(invalid("must not contain '..'"));
    }
    Ok(())
}
