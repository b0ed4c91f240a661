//! Content fingerprints of compiled forms using blake3.
//!
//! The fingerprint is taken over the canonical JSON of the form: nodes are
//! serialized in id order and no node kind contains a `HashMap`, so the same
//! content always yields the same bytes.

use formwire_core::CompiledForm;

use crate::error::RuntimeError;

/// Computes the blake3 fingerprint of a compiled form.
pub fn fingerprint(form: &CompiledForm) -> Result<blake3::Hash, RuntimeError> {
    let bytes = serde_json::to_vec(form)?;
    Ok(blake3::hash(&bytes))
}
