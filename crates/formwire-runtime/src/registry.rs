//! Registry of wired forms.
//!
//! [`FormRegistry`] wires each form once at registration and shares the
//! result behind an `Arc`. Backed by `DashMap`, so concurrent requests can
//! look forms up while another form is being registered.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use formwire_core::CompiledForm;
use formwire_wiring::{WiredForm, WiringConfig};

use crate::error::RuntimeError;
use crate::hash::fingerprint;
use crate::overlay::RequestScope;

/// What a call to [`FormRegistry::register`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// First registration under this code.
    Registered,
    /// Identical content was already registered; nothing was rewired.
    Unchanged,
    /// Different content replaced an earlier registration.
    Replaced,
}

/// Result of a registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub form: Arc<WiredForm>,
    pub fingerprint: blake3::Hash,
    pub outcome: RegistrationOutcome,
}

#[derive(Debug)]
struct RegisteredForm {
    fingerprint: blake3::Hash,
    wired: Arc<WiredForm>,
}

/// Wired forms by form code.
pub struct FormRegistry {
    forms: DashMap<String, RegisteredForm>,
    config: WiringConfig,
}

impl FormRegistry {
    /// Creates an empty registry that wires forms with `config`.
    pub fn new(config: WiringConfig) -> Self {
        FormRegistry {
            forms: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &WiringConfig {
        &self.config
    }

    /// Synthesizes and wires `form`, then stores it under its code.
    ///
    /// Re-registering content with the same fingerprint returns the existing
    /// wired form untouched. A wiring failure leaves the registry unchanged.
    pub fn register(&self, form: CompiledForm) -> Result<Registration, RuntimeError> {
        let fingerprint = fingerprint(&form)?;
        if let Some(existing) = self.forms.get(&form.code) {
            if existing.fingerprint == fingerprint {
                tracing::debug!(form = %form.code, "form unchanged, keeping existing wiring");
                return Ok(Registration {
                    form: Arc::clone(&existing.wired),
                    fingerprint,
                    outcome: RegistrationOutcome::Unchanged,
                });
            }
        }

        let code = form.code.clone();
        let wired = Arc::new(WiredForm::wire(form, self.config.clone())?);
        let registered = RegisteredForm {
            fingerprint,
            wired: Arc::clone(&wired),
        };
        // Another thread may have registered the same code while we wired.
        let outcome = match self.forms.entry(code.clone()) {
            Entry::Occupied(existing) if existing.get().fingerprint == fingerprint => {
                return Ok(Registration {
                    form: Arc::clone(&existing.get().wired),
                    fingerprint,
                    outcome: RegistrationOutcome::Unchanged,
                });
            }
            Entry::Occupied(mut existing) => {
                existing.insert(registered);
                RegistrationOutcome::Replaced
            }
            Entry::Vacant(slot) => {
                slot.insert(registered);
                RegistrationOutcome::Registered
            }
        };
        tracing::info!(
            form = %code,
            fingerprint = %fingerprint.to_hex(),
            edges = wired.graph.edge_count(),
            ?outcome,
            "form registered"
        );
        Ok(Registration {
            form: wired,
            fingerprint,
            outcome,
        })
    }

    /// Returns the wired form registered under `code`.
    pub fn get(&self, code: &str) -> Option<Arc<WiredForm>> {
        self.forms.get(code).map(|entry| Arc::clone(&entry.wired))
    }

    /// Fingerprint of the form registered under `code`.
    pub fn fingerprint(&self, code: &str) -> Option<blake3::Hash> {
        self.forms.get(code).map(|entry| entry.fingerprint)
    }

    /// Removes a form. Requests already holding it keep their `Arc`.
    pub fn remove(&self, code: &str) -> bool {
        self.forms.remove(code).is_some()
    }

    /// Registered form codes, sorted.
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.forms.iter().map(|entry| entry.key().clone()).collect();
        codes.sort();
        codes
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    /// Opens a request scope over the form registered under `code`.
    pub fn begin_request(&self, code: &str) -> Result<RequestScope, RuntimeError> {
        let form = self
            .get(code)
            .ok_or_else(|| RuntimeError::UnknownForm(code.to_string()))?;
        Ok(RequestScope::new(form))
    }
}

impl Default for FormRegistry {
    fn default() -> Self {
        FormRegistry::new(WiringConfig::default())
    }
}
