//! # wirekit - typed component container
//!
//! Assembles an application from async initializers, resolves construction
//! order from their signatures, runs the runnable components concurrently and
//! shuts the shutdownable ones down in reverse construction order.
//!
//! ## Lifecycle
//!
//! - **graph**: initializers are classified into constructors and actions;
//!   duplicate products fail immediately.
//! - **resolve**: every component is constructed exactly once, dependencies first.
//! - **actions**: product-less initializers run in declaration order.
//! - **run** / **shutdown**: driven by the caller, see [`Container::run`] and
//!   [`Container::shutdown`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use wirekit::{component, Container, RunOptions, ShutdownOptions};
//!
//! #[derive(Clone)]
//! struct Config { port: u16 }
//! component!(Config);
//!
//! async fn new_server(config: Config, cancel: CancellationToken) -> wirekit::Result<Server> {
//!     Server::bind(config.port, cancel).await
//! }
//!
//! let container = Container::builder()
//!     .with_component(Config { port: 8080 })
//!     .provide(new_server)
//!     .build()
//!     .await?;
//!
//! let outcome = container.run(RunOptions::default()).await;
//! container.shutdown(ShutdownOptions::default()).await;
//! outcome?;
//! ```

pub use anyhow::Result;
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;

pub mod contracts;
pub mod errors;
pub mod initializer;
pub mod kind;
mod registry;
mod resolver;
pub mod runtime;

pub use contracts::{Component, FuncRunner, Runnable, Shutdownable};
pub use errors::{AssemblyError, RunError};
pub use initializer::{Action, Dependency, Initializer, Module, MultiProvider, Products, Provider};
pub use kind::Kind;
pub use runtime::{
    Container, ContainerBuilder, InterruptSource, Lifecycle, RunOptions, ShutdownOptions, Signal,
};
