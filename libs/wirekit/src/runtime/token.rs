use tokio_util::sync::CancellationToken;

/// Derive the token for one phase (assembly, run or shutdown).
///
/// Without a parent the scope is a plain child of the root. With a parent the
/// scope is a child of that parent and is additionally cancelled when the root
/// fires. Cancelling the scope never reaches the root.
pub(crate) fn scoped(root: &CancellationToken, parent: Option<&CancellationToken>) -> CancellationToken {
    let Some(parent) = parent else {
        return root.child_token();
    };

    let scope = parent.child_token();
    let (root, linked) = (root.clone(), scope.clone());
    tokio::spawn(async move {
        tokio::select! {
            _ = root.cancelled() => linked.cancel(),
            _ = linked.cancelled() => {}
        }
    });
    scope
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn root_cancellation_reaches_parented_scope() {
        let root = CancellationToken::new();
        let parent = CancellationToken::new();
        let scope = scoped(&root, Some(&parent));

        root.cancel();
        tokio::time::timeout(Duration::from_secs(1), scope.cancelled())
            .await
            .expect("scope follows root");
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn parent_cancellation_reaches_scope_but_not_root() {
        let root = CancellationToken::new();
        let parent = CancellationToken::new();
        let scope = scoped(&root, Some(&parent));

        parent.cancel();
        assert!(scope.is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn scope_cancellation_stays_local() {
        let root = CancellationToken::new();
        let scope = scoped(&root, None);
        scope.cancel();
        assert!(!root.is_cancelled());

        let other = scoped(&root, None);
        root.cancel();
        assert!(other.is_cancelled());
    }
}
