use std::collections::HashMap;

use crate::errors::AssemblyError;
use crate::initializer::{Initializer, Invoke, Produced, Value};
use crate::kind::Kind;

/// Label used for components seeded by the container itself.
pub(crate) const CONTAINER_LABEL: &str = "<container>";

/// A constructor: one callable producing one or more kinds.
pub(crate) struct Constructor {
    pub label: &'static str,
    pub dependencies: Vec<Kind>,
    invoke: Option<Invoke>,
}

impl Constructor {
    /// Hand out the callable; a constructor runs at most once.
    pub fn take(&mut self) -> Option<Invoke> {
        self.invoke.take()
    }
}

/// An initializer with no products, run after every constructor.
pub(crate) struct ActionSpec {
    pub label: &'static str,
    pub dependencies: Vec<Kind>,
    pub invoke: Invoke,
}

/// One record per kind. `value` stays `None` until the kind is constructed.
pub(crate) struct ComponentRecord {
    constructor: Option<usize>,
    value: Option<Value>,
}

/// Kind → record mapping, in registration order.
#[derive(Default)]
pub(crate) struct Registry {
    records: HashMap<Kind, ComponentRecord>,
    order: Vec<Kind>,
    constructors: Vec<Constructor>,
}

impl Registry {
    pub fn contains(&self, kind: &Kind) -> bool {
        self.records.contains_key(kind)
    }

    pub fn kinds(&self) -> &[Kind] {
        &self.order
    }

    pub fn is_resolved(&self, kind: &Kind) -> bool {
        self.records
            .get(kind)
            .is_some_and(|record| record.value.is_some())
    }

    pub fn value(&self, kind: &Kind) -> Option<&Value> {
        self.records.get(kind).and_then(|record| record.value.as_ref())
    }

    pub fn constructor_mut(&mut self, kind: &Kind) -> Option<&mut Constructor> {
        let idx = self.records.get(kind)?.constructor?;
        self.constructors.get_mut(idx)
    }

    /// Store a constructed value. Only kinds with a record are accepted.
    pub fn fill(&mut self, produced: &Produced) -> bool {
        match self.records.get_mut(&produced.kind) {
            Some(record) => {
                record.value = Some(produced.value.clone());
                true
            }
            None => false,
        }
    }

    /// Overwrite the value of a container-seeded kind.
    pub fn replace(&mut self, produced: Produced) {
        if let Some(record) = self.records.get_mut(&produced.kind) {
            record.value = Some(produced.value);
        }
    }

    pub fn into_values(self) -> HashMap<Kind, Value> {
        self.records
            .into_iter()
            .filter_map(|(kind, record)| record.value.map(|value| (kind, value)))
            .collect()
    }
}

/// Graph builder: classifies initializers and fills the registry.
/// Kind uniqueness is enforced eagerly, before anything is constructed.
#[derive(Default)]
pub(crate) struct RegistryBuilder {
    registry: Registry,
    labels: HashMap<Kind, &'static str>,
    actions: Vec<ActionSpec>,
}

impl RegistryBuilder {
    /// Register a component the container owns from the start (already resolved).
    pub fn seed(&mut self, produced: Produced) -> Result<(), AssemblyError> {
        self.claim(produced.kind, CONTAINER_LABEL)?;
        self.registry.records.insert(
            produced.kind,
            ComponentRecord {
                constructor: None,
                value: Some(produced.value),
            },
        );
        Ok(())
    }

    pub fn register(&mut self, initializer: Initializer) -> Result<(), AssemblyError> {
        let Initializer {
            label,
            dependencies,
            products,
            invoke,
        } = initializer;

        if products.is_empty() {
            tracing::trace!(action = label, "Registered action");
            self.actions.push(ActionSpec {
                label,
                dependencies,
                invoke,
            });
            return Ok(());
        }

        for (i, kind) in products.iter().enumerate() {
            // A constructor listing the same kind twice collides with itself.
            if products[..i].contains(kind) {
                return Err(AssemblyError::DuplicateKind {
                    kind: *kind,
                    first: label,
                    second: label,
                });
            }
            self.claim(*kind, label)?;
        }

        let idx = self.registry.constructors.len();
        self.registry.constructors.push(Constructor {
            label,
            dependencies,
            invoke: Some(invoke),
        });
        for kind in products {
            tracing::trace!(kind = %kind, constructor = label, "Registered component");
            self.registry.records.insert(
                kind,
                ComponentRecord {
                    constructor: Some(idx),
                    value: None,
                },
            );
        }

        Ok(())
    }

    fn claim(&mut self, kind: Kind, label: &'static str) -> Result<(), AssemblyError> {
        if let Some(&first) = self.labels.get(&kind) {
            return Err(AssemblyError::DuplicateKind {
                kind,
                first,
                second: label,
            });
        }
        self.labels.insert(kind, label);
        self.registry.order.push(kind);
        Ok(())
    }

    pub fn build(self) -> (Registry, Vec<ActionSpec>) {
        (self.registry, self.actions)
    }
}
