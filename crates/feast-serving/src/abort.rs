use std::sync::Arc;

use tokio::sync::watch;

/// Abort signal observed by an in-flight request.
#[derive(Clone, Debug)]
pub struct AbortSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_aborted(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once the signal fires. Stays pending forever if the owning
    /// controller is dropped without aborting.
    pub async fn aborted(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::never()
    }
}

/// Owns the sending half of an [`AbortSignal`].
#[derive(Clone, Debug)]
pub struct AbortController {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortController {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: Some(self.tx.subscribe()),
        }
    }

    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}
