//! Content fingerprints.
//!
//! Plan identifiers embed a short hash of the values they depend on (filter
//! conditions, query datasource identifiers), so CTE names are stable across
//! runs and across equivalent plans.

mod hash;
pub use hash::{compute_hash, fingerprint, short_hash, SHORT_HASH_LEN};
