//! Container lifecycle: assembly, run and shutdown phases plus interrupt wiring.

mod container;
mod runner;
mod shutdown;
mod signals;
mod token;

pub use container::{Container, ContainerBuilder, Lifecycle};
pub use runner::RunOptions;
pub use shutdown::ShutdownOptions;
pub use signals::{InterruptSource, Signal};
