//! Depth-first component resolution and action invocation.
//!
//! Resolution is lazy and memoized: a kind is constructed the first time
//! something needs it, and never again. The resolution path is an ordered
//! stack that grows and shrinks with the recursion, so a cycle is reported
//! only along the active chain.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::contracts::Component;
use crate::errors::AssemblyError;
use crate::initializer::Value;
use crate::kind::Kind;
use crate::registry::{ActionSpec, Constructor, Registry};

/// A constructed component kept for the run or shutdown phase.
#[derive(Clone)]
pub(crate) struct Handle {
    pub kind: Kind,
    pub component: Arc<dyn Component>,
}

/// Output of a resolution pass, complete or partial.
#[derive(Default)]
pub(crate) struct Resolved {
    /// Kinds in the order their constructor finished.
    pub order: Vec<Kind>,
    pub runners: Vec<Handle>,
    /// Construction order; shut down back to front.
    pub shutdowners: Vec<Handle>,
}

pub(crate) struct Resolver {
    registry: Registry,
    path: Vec<Kind>,
    resolved: Resolved,
}

impl Resolver {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            path: Vec::new(),
            resolved: Resolved::default(),
        }
    }

    /// Construct every registered kind, in registration order.
    pub async fn resolve_all(&mut self) -> Result<(), AssemblyError> {
        let kinds = self.registry.kinds().to_vec();
        for kind in kinds {
            if !self.registry.is_resolved(&kind) {
                self.resolve(kind).await?;
            }
        }
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Hand back the registry and whatever was constructed so far.
    pub fn into_parts(self) -> (Registry, Resolved) {
        (self.registry, self.resolved)
    }

    fn resolve(&mut self, kind: Kind) -> BoxFuture<'_, Result<(), AssemblyError>> {
        async move {
            let Some(constructor) = self.registry.constructor_mut(&kind) else {
                // Seeded by the container, nothing to build.
                return Ok(());
            };
            let label = constructor.label;
            let dependencies = constructor.dependencies.clone();

            self.path.push(kind);
            let result = self.construct(kind, label, dependencies).await;
            self.path.pop();
            result
        }
        .boxed()
    }

    async fn construct(
        &mut self,
        kind: Kind,
        label: &'static str,
        dependencies: Vec<Kind>,
    ) -> Result<(), AssemblyError> {
        for dep in &dependencies {
            if !self.registry.contains(dep) {
                return Err(AssemblyError::MissingDependency {
                    kind: *dep,
                    required_by: label,
                });
            }
            if let Some(pos) = self.path.iter().position(|k| k == dep) {
                let mut path = self.path[pos..].to_vec();
                path.push(*dep);
                return Err(AssemblyError::CycleDetected { path });
            }
            if !self.registry.is_resolved(dep) {
                self.resolve(*dep).await?;
            }
        }

        let args = collect_args(&self.registry, &dependencies, label)?;

        let Some(invoke) = self
            .registry
            .constructor_mut(&kind)
            .and_then(Constructor::take)
        else {
            return Ok(());
        };

        tracing::debug!(kind = %kind, constructor = label, "Constructing component");
        let produced = invoke(args)
            .await
            .map_err(|source| AssemblyError::ConstructorFailure {
                constructor: label,
                source,
            })?;

        for item in produced {
            if !self.registry.fill(&item) {
                tracing::warn!(kind = %item.kind, constructor = label, "Dropping undeclared product");
                continue;
            }
            let handle = Handle {
                kind: item.kind,
                component: item.component,
            };
            let runnable = handle.component.as_runnable().is_some();
            let shutdownable = handle.component.as_shutdownable().is_some();
            tracing::debug!(kind = %handle.kind, runnable, shutdownable, "Component ready");

            self.resolved.order.push(handle.kind);
            if runnable {
                self.resolved.runners.push(handle.clone());
            }
            if shutdownable {
                self.resolved.shutdowners.push(handle);
            }
        }

        Ok(())
    }
}

fn collect_args(
    registry: &Registry,
    dependencies: &[Kind],
    required_by: &'static str,
) -> Result<Vec<Value>, AssemblyError> {
    dependencies
        .iter()
        .map(|dep| {
            registry
                .value(dep)
                .cloned()
                .ok_or(AssemblyError::MissingDependency {
                    kind: *dep,
                    required_by,
                })
        })
        .collect()
}

/// Run every action in declaration order against the resolved registry.
pub(crate) async fn invoke_actions(
    registry: &Registry,
    actions: Vec<ActionSpec>,
) -> Result<(), AssemblyError> {
    for action in actions {
        let args = collect_args(registry, &action.dependencies, action.label)?;
        tracing::debug!(action = action.label, "Invoking action");
        (action.invoke)(args)
            .await
            .map_err(|source| AssemblyError::ActionFailure {
                action: action.label,
                source,
            })?;
    }
    Ok(())
}
