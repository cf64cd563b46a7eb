use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-request context handed to query functions.
///
/// Cloning shares the cancellation token, so a client disconnect seen by the
/// HTTP layer is visible to the backend query running on its behalf.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: Uuid,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            cancel,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_cancellation() {
        let ctx = RequestContext::new();
        let clone = ctx.clone();
        assert_eq!(ctx.request_id(), clone.request_id());

        ctx.cancellation().cancel();
        assert!(clone.is_cancelled());
    }
}
