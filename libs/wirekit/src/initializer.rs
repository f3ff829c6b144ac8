//! Initializer declarations.
//!
//! An initializer is an async function of 0..=8 components returning an
//! `anyhow::Result`. Its dependency and product kinds are derived from its
//! signature at compile time, so the graph builder never inspects callables.
//!
//! - `Initializer::provide(f)`: `f(..) -> anyhow::Result<T>` produces `T`.
//! - `Initializer::provide_each(f)`: `f(..) -> anyhow::Result<(A, B, ..)>` produces every tuple member.
//! - `Initializer::invoke(f)`: `f(..) -> anyhow::Result<()>` is an action, run after all constructors.
//! - `Initializer::value(v)`: an already built component.
//!
//! Parameters are injected by value: each is a clone of the stored component,
//! so shared state should be declared as `Arc<T>`.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::{FutureExt, TryFutureExt};

use crate::contracts::Component;
use crate::kind::Kind;

/// Type-erased component value, downcast back to its kind on injection.
pub(crate) type Value = Arc<dyn Any + Send + Sync>;

pub(crate) type Invoke =
    Box<dyn FnOnce(Vec<Value>) -> BoxFuture<'static, anyhow::Result<Vec<Produced>>> + Send>;

/// A freshly constructed component together with its capability view.
pub struct Produced {
    pub(crate) kind: Kind,
    pub(crate) value: Value,
    pub(crate) component: Arc<dyn Component>,
}

impl Produced {
    pub(crate) fn new<T: Component>(value: T) -> Self {
        let value = Arc::new(value);
        Self {
            kind: Kind::of::<T>(),
            value: value.clone(),
            component: value,
        }
    }
}

/// Components that can be injected as initializer parameters.
pub trait Dependency: Component + Clone {}

impl<T: Component + Clone> Dependency for T {}

/// The set of components produced by one `provide_each` constructor.
pub trait Products: Send + 'static {
    fn kinds() -> Vec<Kind>;

    #[doc(hidden)]
    fn into_produced(self) -> Vec<Produced>;
}

/// Async functions usable with `Initializer::provide`.
pub trait Provider<Args>: Sized {
    fn into_initializer(self) -> Initializer;
}

/// Async functions usable with `Initializer::provide_each`.
pub trait MultiProvider<Args>: Sized {
    fn into_initializer(self) -> Initializer;
}

/// Async functions usable with `Initializer::invoke`.
pub trait Action<Args>: Sized {
    fn into_initializer(self) -> Initializer;
}

/// One declaration fed to the graph builder.
pub struct Initializer {
    pub(crate) label: &'static str,
    pub(crate) dependencies: Vec<Kind>,
    pub(crate) products: Vec<Kind>,
    pub(crate) invoke: Invoke,
}

impl Initializer {
    pub fn provide<Args, F: Provider<Args>>(f: F) -> Self {
        f.into_initializer()
    }

    pub fn provide_each<Args, F: MultiProvider<Args>>(f: F) -> Self {
        f.into_initializer()
    }

    pub fn invoke<Args, F: Action<Args>>(f: F) -> Self {
        f.into_initializer()
    }

    /// A pre-built component: a constructor with no dependencies returning `value`.
    pub fn value<T: Component>(value: T) -> Self {
        Self {
            label: std::any::type_name::<T>(),
            dependencies: Vec::new(),
            products: vec![Kind::of::<T>()],
            invoke: Box::new(move |_| future::ready(Ok(vec![Produced::new(value)])).boxed()),
        }
    }

    /// Type name of the underlying callable (or of the value for pre-built components).
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn dependencies(&self) -> &[Kind] {
        &self.dependencies
    }

    pub fn products(&self) -> &[Kind] {
        &self.products
    }

    /// Actions produce nothing and run after every constructor.
    pub fn is_action(&self) -> bool {
        self.products.is_empty()
    }
}

impl std::fmt::Debug for Initializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Initializer")
            .field("label", &self.label)
            .field("dependencies", &self.dependencies)
            .field("products", &self.products)
            .finish()
    }
}

/// A named bundle of initializers, merged as a whole into a container.
#[derive(Debug, Default)]
pub struct Module {
    name: &'static str,
    initializers: Vec<Initializer>,
    components: Vec<Initializer>,
}

impl Module {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

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

    pub fn with_component<T: Component>(mut self, value: T) -> Self {
        self.components.push(Initializer::value(value));
        self
    }

    /// Absorb another module; its declarations keep their relative order.
    pub fn include(mut self, other: Module) -> Self {
        self.initializers.extend(other.initializers);
        self.components.extend(other.components);
        self
    }

    pub(crate) fn into_parts(self) -> (Vec<Initializer>, Vec<Initializer>) {
        (self.initializers, self.components)
    }
}

/* ----------------------- signature-derived impls ----------------------- */

/// Positional extraction of injected parameters.
trait Extract: Sized {
    fn extract(args: Vec<Value>) -> anyhow::Result<Self>;
}

fn take<T: Dependency>(value: Option<Value>) -> anyhow::Result<T> {
    value
        .as_deref()
        .and_then(|v| v.downcast_ref::<T>())
        .cloned()
        .ok_or_else(|| {
            anyhow::anyhow!(
                "component '{}' is not available as its declared kind",
                Kind::of::<T>()
            )
        })
}

macro_rules! impl_initializers {
    ($($arg:ident),*) => {
        impl<$($arg: Dependency,)*> Extract for ($($arg,)*) {
            #[allow(unused_mut, unused_variables)]
            fn extract(args: Vec<Value>) -> anyhow::Result<Self> {
                let mut args = args.into_iter();
                Ok(($(take::<$arg>(args.next())?,)*))
            }
        }

        impl<F, Fut, T, $($arg,)*> Provider<($($arg,)*)> for F
        where
            F: FnOnce($($arg),*) -> Fut + Send + 'static,
            Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
            T: Component,
            $($arg: Dependency,)*
        {
            #[allow(non_snake_case)]
            fn into_initializer(self) -> Initializer {
                Initializer {
                    label: std::any::type_name::<F>(),
                    dependencies: vec![$(Kind::of::<$arg>()),*],
                    products: vec![Kind::of::<T>()],
                    invoke: Box::new(move |args| {
                        match <($($arg,)*) as Extract>::extract(args) {
                            Ok(($($arg,)*)) => self($($arg),*)
                                .map_ok(|value| vec![Produced::new(value)])
                                .boxed(),
                            Err(err) => future::ready(Err(err)).boxed(),
                        }
                    }),
                }
            }
        }

        impl<F, Fut, P, $($arg,)*> MultiProvider<($($arg,)*)> for F
        where
            F: FnOnce($($arg),*) -> Fut + Send + 'static,
            Fut: Future<Output = anyhow::Result<P>> + Send + 'static,
            P: Products,
            $($arg: Dependency,)*
        {
            #[allow(non_snake_case)]
            fn into_initializer(self) -> Initializer {
                Initializer {
                    label: std::any::type_name::<F>(),
                    dependencies: vec![$(Kind::of::<$arg>()),*],
                    products: P::kinds(),
                    invoke: Box::new(move |args| {
                        match <($($arg,)*) as Extract>::extract(args) {
                            Ok(($($arg,)*)) => self($($arg),*)
                                .map_ok(P::into_produced)
                                .boxed(),
                            Err(err) => future::ready(Err(err)).boxed(),
                        }
                    }),
                }
            }
        }

        impl<F, Fut, $($arg,)*> Action<($($arg,)*)> for F
        where
            F: FnOnce($($arg),*) -> Fut + Send + 'static,
            Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
            $($arg: Dependency,)*
        {
            #[allow(non_snake_case)]
            fn into_initializer(self) -> Initializer {
                Initializer {
                    label: std::any::type_name::<F>(),
                    dependencies: vec![$(Kind::of::<$arg>()),*],
                    products: Vec::new(),
                    invoke: Box::new(move |args| {
                        match <($($arg,)*) as Extract>::extract(args) {
                            Ok(($($arg,)*)) => self($($arg),*).map_ok(|()| Vec::new()).boxed(),
                            Err(err) => future::ready(Err(err)).boxed(),
                        }
                    }),
                }
            }
        }
    };
}

impl_initializers!();
impl_initializers!(A1);
impl_initializers!(A1, A2);
impl_initializers!(A1, A2, A3);
impl_initializers!(A1, A2, A3, A4);
impl_initializers!(A1, A2, A3, A4, A5);
impl_initializers!(A1, A2, A3, A4, A5, A6);
impl_initializers!(A1, A2, A3, A4, A5, A6, A7);
impl_initializers!(A1, A2, A3, A4, A5, A6, A7, A8);

macro_rules! impl_products {
    ($($out:ident),+) => {
        impl<$($out: Component,)+> Products for ($($out,)+) {
            fn kinds() -> Vec<Kind> {
                vec![$(Kind::of::<$out>()),+]
            }

            #[allow(non_snake_case)]
            fn into_produced(self) -> Vec<Produced> {
                let ($($out,)+) = self;
                vec![$(Produced::new($out)),+]
            }
        }
    };
}

impl_products!(P1);
impl_products!(P1, P2);
impl_products!(P1, P2, P3);
impl_products!(P1, P2, P3, P4);
impl_products!(P1, P2, P3, P4, P5);
impl_products!(P1, P2, P3, P4, P5, P6);
