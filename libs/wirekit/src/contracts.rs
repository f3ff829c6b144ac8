use std::future::Future;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

/// Run capability: the component is driven concurrently by `Container::run`.
///
/// Implementations are expected to return once `cancel` fires. The container
/// never aborts a runner.
#[async_trait]
pub trait Runnable: Send + Sync {
    async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// Shutdown capability: the component is released by `Container::shutdown`,
/// last-constructed first. Failures stay private to the component.
#[async_trait]
pub trait Shutdownable: Send + Sync {
    async fn shutdown(&self, cancel: CancellationToken);
}

/// Anything that can live in the container.
///
/// The capability probes are checked once, right after the component is
/// constructed. Most components use the `component!` macro instead of writing
/// this impl by hand.
pub trait Component: Send + Sync + 'static {
    /// Return self as a `Runnable` if this component has the run capability.
    fn as_runnable(&self) -> Option<&dyn Runnable> {
        None
    }

    /// Return self as a `Shutdownable` if this component has the shutdown capability.
    fn as_shutdownable(&self) -> Option<&dyn Shutdownable> {
        None
    }
}

impl<T: Component + ?Sized> Component for Arc<T> {
    fn as_runnable(&self) -> Option<&dyn Runnable> {
        (**self).as_runnable()
    }

    fn as_shutdownable(&self) -> Option<&dyn Shutdownable> {
        (**self).as_shutdownable()
    }
}

impl Component for CancellationToken {}
impl Component for String {}
impl Component for PathBuf {}
impl Component for Duration {}

/// Declares one or more types as components.
///
/// ```rust,ignore
/// wirekit::component!(Config, Client);
/// wirekit::component!(Server => runnable, shutdownable);
/// ```
#[macro_export]
macro_rules! component {
    (@cap runnable) => {
        fn as_runnable(&self) -> ::core::option::Option<&dyn $crate::Runnable> {
            ::core::option::Option::Some(self)
        }
    };
    (@cap shutdownable) => {
        fn as_shutdownable(&self) -> ::core::option::Option<&dyn $crate::Shutdownable> {
            ::core::option::Option::Some(self)
        }
    };
    ($ty:ty => $($cap:ident),+ $(,)?) => {
        impl $crate::Component for $ty {
            $( $crate::component!(@cap $cap); )+
        }
    };
    ($($ty:ty),+ $(,)?) => {
        $( impl $crate::Component for $ty {} )+
    };
}

type RunFn = dyn Fn(CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// A runner-only component backed by a closure.
///
/// `Tag` only distinguishes kinds: two `FuncRunner`s with different tags can be
/// registered side by side.
///
/// ```rust,ignore
/// struct Ticker;
/// Initializer::provide(|| async {
///     Ok(FuncRunner::<Ticker>::new(|cancel| async move {
///         cancel.cancelled().await;
///         Ok(())
///     }))
/// });
/// ```
pub struct FuncRunner<Tag = ()> {
    f: Arc<RunFn>,
    _tag: PhantomData<fn() -> Tag>,
}

impl<Tag> FuncRunner<Tag> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |cancel| f(cancel).boxed()),
            _tag: PhantomData,
        }
    }
}

impl<Tag> Clone for FuncRunner<Tag> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
            _tag: PhantomData,
        }
    }
}

impl<Tag> std::fmt::Debug for FuncRunner<Tag> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuncRunner")
            .field("tag", &std::any::type_name::<Tag>())
            .finish()
    }
}

#[async_trait]
impl<Tag: 'static> Runnable for FuncRunner<Tag> {
    async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        (self.f)(cancel).await
    }
}

impl<Tag: 'static> Component for FuncRunner<Tag> {
    fn as_runnable(&self) -> Option<&dyn Runnable> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;
    struct Both;

    #[async_trait]
    impl Runnable for Both {
        async fn run(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Shutdownable for Both {
        async fn shutdown(&self, _cancel: CancellationToken) {}
    }

    crate::component!(Plain);
    crate::component!(Both => runnable, shutdownable);

    #[test]
    fn capability_probes_follow_declaration() {
        assert!(Plain.as_runnable().is_none());
        assert!(Plain.as_shutdownable().is_none());
        assert!(Both.as_runnable().is_some());
        assert!(Both.as_shutdownable().is_some());
    }

    #[test]
    fn arc_delegates_capabilities() {
        let both = Arc::new(Both);
        assert!(both.as_runnable().is_some());
        assert!(both.as_shutdownable().is_some());
        assert!(Arc::new(Plain).as_runnable().is_none());
    }

    #[tokio::test]
    async fn func_runner_invokes_closure() {
        struct Tag;
        let runner = FuncRunner::<Tag>::new(|cancel| async move {
            cancel.cancelled().await;
            Err(anyhow::anyhow!("stopped"))
        });
        let cancel = CancellationToken::new();
        cancel.cancel();

        let runnable = runner.as_runnable().expect("func runner is runnable");
        let err = runnable.run(cancel).await.unwrap_err();
        assert_eq!(err.to_string(), "stopped");
        assert!(runner.as_shutdownable().is_none());
    }
}
