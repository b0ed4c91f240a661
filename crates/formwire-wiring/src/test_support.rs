//! Form-building helpers shared by unit tests.

use formwire_core::{CompiledForm, NodeId, NodeSource, PseudoKey, PseudoKind, TransitionTrigger};

use crate::config::WiringConfig;
use crate::error::WiringError;
use crate::orchestrator::WiredForm;

/// A form with one journey and one step, plus builder shortcuts.
pub(crate) struct FormFixture {
    pub form: CompiledForm,
    pub journey: NodeId,
    pub step: NodeId,
}

impl FormFixture {
    pub fn new() -> Self {
        let mut form = CompiledForm::new("fixture");
        let journey = form.add_journey(None, "apply").unwrap();
        let step = form.add_step(journey, "/details").unwrap();
        FormFixture {
            form,
            journey,
            step,
        }
    }

    pub fn step(&mut self, path: &str) -> NodeId {
        self.form.add_step(self.journey, path).unwrap()
    }

    pub fn field(&mut self, parent: NodeId, code: &str) -> NodeId {
        self.form.add_field(parent, code, "text").unwrap()
    }

    pub fn formatter(&mut self, field: NodeId, name: &str) -> NodeId {
        self.form.add_formatter(field, name).unwrap()
    }

    pub fn default_literal(&mut self, field: NodeId, value: serde_json::Value) -> NodeId {
        let literal = self.form.add_literal(field, value).unwrap();
        self.form.set_default_value(field, literal).unwrap();
        literal
    }

    pub fn reference(&mut self, parent: NodeId, path: &[&str]) -> NodeId {
        self.form.add_reference(parent, path.iter().copied()).unwrap()
    }

    pub fn collection(&mut self, parent: NodeId, code: &str, source: Option<NodeId>) -> NodeId {
        self.form.add_collection(parent, code, source).unwrap()
    }

    pub fn transition(&mut self, scope: NodeId, trigger: TransitionTrigger) -> NodeId {
        self.form.add_transition(scope, trigger).unwrap()
    }

    /// Adds a load-transition with one effect to `scope`.
    pub fn load(&mut self, scope: NodeId) -> NodeId {
        let transition = self.transition(scope, TransitionTrigger::Load);
        self.form.add_effect(transition, "fetch").unwrap();
        transition
    }

    /// Wires a copy of the fixture's form with the default config.
    pub fn wire(&self) -> WiredForm {
        Self::wire_form(self.form.clone())
    }

    pub fn wire_form(form: CompiledForm) -> WiredForm {
        Self::try_wire_form(form, &WiringConfig::default()).unwrap()
    }

    pub fn try_wire_form(form: CompiledForm, config: &WiringConfig) -> Result<WiredForm, WiringError> {
        WiredForm::wire(form, config.clone())
    }
}

impl WiredForm {
    /// The pseudo-node `(kind, step, key)`; panics if it was not synthesized.
    pub(crate) fn pseudo(&self, kind: PseudoKind, step: NodeId, key: &str) -> NodeId {
        let identity = PseudoKey::new(kind, step, key);
        self.form
            .nodes
            .pseudo(&identity)
            .unwrap_or_else(|| panic!("no pseudo-node {identity}"))
    }
}
