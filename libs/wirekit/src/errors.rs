use thiserror::Error;

use crate::kind::Kind;

/// Structured errors surfaced while assembling a container.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("component '{kind}' is produced by both '{first}' and '{second}'")]
    DuplicateKind {
        kind: Kind,
        first: &'static str,
        second: &'static str,
    },
    #[error("'{required_by}' depends on '{kind}', which nothing produces")]
    MissingDependency {
        kind: Kind,
        required_by: &'static str,
    },
    #[error("cyclic dependency detected: {}", join_path(path))]
    CycleDetected { path: Vec<Kind> },
    #[error("constructor '{constructor}' failed")]
    ConstructorFailure {
        constructor: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("action '{action}' failed")]
    ActionFailure {
        action: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl AssemblyError {
    /// The error returned by a failing constructor or action, for `downcast_ref` inspection.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self {
            Self::ConstructorFailure { source, .. } | Self::ActionFailure { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

fn join_path(path: &[Kind]) -> String {
    path.iter()
        .map(Kind::name)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Aggregated failure of `Container::run`.
///
/// `primary` is the first runner failure by completion order; the rest follow
/// in the order they completed.
#[derive(Debug, Error)]
#[error("{} runner(s) failed, first: {primary:#}", 1 + secondary.len())]
pub struct RunError {
    #[source]
    primary: anyhow::Error,
    secondary: Vec<anyhow::Error>,
}

impl RunError {
    pub(crate) fn new(primary: anyhow::Error, secondary: Vec<anyhow::Error>) -> Self {
        Self { primary, secondary }
    }

    pub fn primary(&self) -> &anyhow::Error {
        &self.primary
    }

    pub fn secondary(&self) -> &[anyhow::Error] {
        &self.secondary
    }

    pub fn into_primary(self) -> anyhow::Error {
        self.primary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;

    #[test]
    fn cycle_message_joins_path() {
        let err = AssemblyError::CycleDetected {
            path: vec![Kind::of::<A>(), Kind::of::<B>(), Kind::of::<A>()],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("cyclic dependency detected"));
        assert_eq!(msg.matches(" -> ").count(), 2);
    }

    #[test]
    fn cause_exposes_component_error() {
        #[derive(Debug, thiserror::Error)]
        #[error("disk full")]
        struct DiskFull;

        let err = AssemblyError::ConstructorFailure {
            constructor: "new_store",
            source: DiskFull.into(),
        };
        assert!(err.cause().unwrap().downcast_ref::<DiskFull>().is_some());
        assert!(std::error::Error::source(&err).is_some());

        let missing = AssemblyError::MissingDependency {
            kind: Kind::of::<A>(),
            required_by: "new_b",
        };
        assert!(missing.cause().is_none());
    }

    #[test]
    fn run_error_reports_counts() {
        let err = RunError::new(anyhow::anyhow!("boom"), vec![anyhow::anyhow!("late")]);
        assert_eq!(err.to_string(), "2 runner(s) failed, first: boom");
        assert_eq!(err.secondary().len(), 1);
        assert_eq!(err.into_primary().to_string(), "boom");
    }
}
