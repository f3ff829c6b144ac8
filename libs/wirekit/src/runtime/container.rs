use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::contracts::Component;
use crate::errors::{AssemblyError, RunError};
use crate::initializer::{Action, Initializer, Module, MultiProvider, Produced, Provider, Value};
use crate::kind::Kind;
use crate::registry::RegistryBuilder;
use crate::resolver::{invoke_actions, Handle, Resolver};
use crate::runtime::runner::{run_all, RunOptions};
use crate::runtime::shutdown::{shutdown_all, ShutdownOptions};
use crate::runtime::signals::{self, InterruptSource, Signal};
use crate::runtime::token::scoped;

/// Observable container state. `ShutDown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Ready,
    Running,
    ShutDown,
}

/// Collects declarations; `build` assembles them into a ready container.
#[derive(Debug, Default)]
pub struct ContainerBuilder {
    initializers: Vec<Initializer>,
    components: Vec<Initializer>,
    token: Option<CancellationToken>,
    interrupt: InterruptSource,
}

impl ContainerBuilder {
    pub fn with(mut self, initializer: Initializer) -> Self {
        self.initializers.push(initializer);
        self
    }

    pub fn provide<Args, F: Provider<Args>>(self, f: F) -> Self {
        self.with(Initializer::provide(f))
    }

    pub fn provide_each<Args, F: MultiProvider<Args>>(self, f: F) -> Self {
        self.with(Initializer::provide_each(f))
    }

    pub fn invoke<Args, F: Action<Args>>(self, f: F) -> Self {
        self.with(Initializer::invoke(f))
    }

    /// Register an already built component.
    pub fn with_component<T: Component>(mut self, value: T) -> Self {
        self.components.push(Initializer::value(value));
        self
    }

    pub fn with_module(mut self, module: Module) -> Self {
        tracing::debug!(module = module.name(), "Merging module");
        let (initializers, components) = module.into_parts();
        self.initializers.extend(initializers);
        self.components.extend(components);
        self
    }

    /// Parent for the token injected during assembly. The root token is still
    /// linked in, and lookups after `build` observe the root only.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Extra signals that cancel the root token, on top of Ctrl+C.
    /// Switches the interrupt source back to signals if it was replaced.
    pub fn with_signals(mut self, extra: impl IntoIterator<Item = Signal>) -> Self {
        match &mut self.interrupt {
            InterruptSource::Signals(signals) => signals.extend(extra),
            other => *other = InterruptSource::Signals(extra.into_iter().collect()),
        }
        self
    }

    /// Replace the interrupt source entirely.
    pub fn with_interrupt(mut self, source: InterruptSource) -> Self {
        self.interrupt = source;
        self
    }

    /// Assemble the container: graph build, resolution, then actions.
    ///
    /// On failure every component constructed so far is shut down (last
    /// constructed first) and the root token is cancelled before the error is
    /// returned.
    pub async fn build(self) -> Result<Container, AssemblyError> {
        let ContainerBuilder {
            initializers,
            components,
            token,
            interrupt,
        } = self;

        let root = CancellationToken::new();
        signals::subscribe(&root, interrupt);

        let ambient = match &token {
            Some(parent) => scoped(&root, Some(parent)),
            None => root.clone(),
        };
        // The assembly-scoped token is released once build returns.
        let _ambient_guard = token.is_some().then(|| ambient.clone().drop_guard());

        tracing::info!("Phase: graph");
        let mut builder = RegistryBuilder::default();
        let registered = builder.seed(Produced::new(ambient.clone())).and_then(|()| {
            initializers
                .into_iter()
                .chain(components)
                .try_for_each(|init| builder.register(init))
        });
        if let Err(err) = registered {
            tracing::warn!(error = %err, "Assembly failed");
            shutdown_all(&root, &[], Some(&ambient)).await;
            return Err(err);
        }
        let (registry, actions) = builder.build();

        tracing::info!(components = registry.kinds().len(), "Phase: resolve");
        let mut resolver = Resolver::new(registry);
        let mut result = resolver.resolve_all().await;
        if result.is_ok() {
            tracing::info!(actions = actions.len(), "Phase: actions");
            result = invoke_actions(resolver.registry(), actions).await;
        }

        let (mut registry, resolved) = resolver.into_parts();
        if let Err(err) = result {
            tracing::warn!(
                error = %err,
                constructed = resolved.order.len(),
                "Assembly failed; releasing constructed components"
            );
            shutdown_all(&root, &resolved.shutdowners, Some(&ambient)).await;
            return Err(err);
        }

        registry.replace(Produced::new(root.clone()));
        tracing::info!(
            components = resolved.order.len(),
            runners = resolved.runners.len(),
            shutdowners = resolved.shutdowners.len(),
            "Container ready"
        );

        Ok(Container {
            inner: Arc::new(Inner {
                root,
                values: registry.into_values(),
                order: resolved.order,
                runners: resolved.runners,
                shutdowners: resolved.shutdowners,
                phase: Mutex::new(Phase::default()),
                shut_down: AtomicBool::new(false),
            }),
        })
    }
}

/// An assembled component graph.
///
/// Cloning is cheap; clones share the same components and root token. Dropping
/// the last clone cancels the root token.
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

struct Inner {
    root: CancellationToken,
    values: HashMap<Kind, Value>,
    order: Vec<Kind>,
    runners: Vec<Handle>,
    shutdowners: Vec<Handle>,
    phase: Mutex<Phase>,
    shut_down: AtomicBool,
}

#[derive(Debug, Default)]
struct Phase {
    active_runs: usize,
    released: bool,
}

/// Counts one `run` call; dropping it (also on cancellation) ends that run.
struct ActiveRun<'a>(&'a Mutex<Phase>);

impl<'a> ActiveRun<'a> {
    fn enter(phase: &'a Mutex<Phase>) -> Self {
        let mut p = phase.lock();
        if p.released {
            tracing::warn!("Running a container that was already shut down");
        }
        p.active_runs += 1;
        drop(p);
        Self(phase)
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.0.lock().active_runs -= 1;
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

impl Container {
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::default()
    }

    /// A clone of the component registered for `T`. Never constructs anything.
    pub fn get<T: Component + Clone>(&self) -> Option<T> {
        self.inner
            .values
            .get(&Kind::of::<T>())?
            .downcast_ref::<T>()
            .cloned()
    }

    pub fn contains(&self, kind: &Kind) -> bool {
        self.inner.values.contains_key(kind)
    }

    /// The root token: cancelled by the interrupt source or by shutdown.
    pub fn token(&self) -> CancellationToken {
        self.inner.root.clone()
    }

    /// `Running` while at least one `run` call is in flight.
    pub fn state(&self) -> Lifecycle {
        let phase = self.inner.phase.lock();
        if phase.released {
            Lifecycle::ShutDown
        } else if phase.active_runs > 0 {
            Lifecycle::Running
        } else {
            Lifecycle::Ready
        }
    }

    /// Kinds in the order their constructors completed.
    pub fn construction_order(&self) -> &[Kind] {
        &self.inner.order
    }

    /// Run every runnable component concurrently until all of them return.
    ///
    /// The first failure cancels the others; the call still waits for every
    /// runner before returning.
    /// Overlapping calls are allowed; each starts its own set of runner tasks.
    pub async fn run(&self, options: RunOptions) -> Result<(), RunError> {
        let _active = ActiveRun::enter(&self.inner.phase);
        run_all(&self.inner.root, &self.inner.runners, options).await
    }

    /// Shut down components last-constructed first, then cancel the root token.
    ///
    /// Only the first call releases components; later calls just cancel the
    /// root again.
    pub async fn shutdown(&self, options: ShutdownOptions) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            tracing::debug!("Container already shut down");
            self.inner.root.cancel();
            return;
        }

        shutdown_all(&self.inner.root, &self.inner.shutdowners, options.parent()).await;
        self.inner.phase.lock().released = true;
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("state", &self.state())
            .field("components", &self.inner.order)
            .field("runners", &self.inner.runners.len())
            .field("shutdowners", &self.inner.shutdowners.len())
            .finish()
    }
}
