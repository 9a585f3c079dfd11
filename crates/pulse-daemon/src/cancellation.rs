use tokio::sync::watch;

/// Owner side of the shutdown signal; held by the run loop.
pub struct ShutdownController {
    sender: watch::Sender<bool>,
}

/// Cooperative cancellation handle for the accept loops, so tests and the
/// shutdown path can stop them deterministically.
#[derive(Clone)]
pub struct CancellationToken {
    receiver: watch::Receiver<bool>,
}

/// One controller, any number of token clones.
pub fn shutdown_pair() -> (ShutdownController, CancellationToken) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownController { sender }, CancellationToken { receiver })
}

impl ShutdownController {
    pub fn shutdown(&self) {
        let _ = self.sender.send(true);
    }
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once shutdown is signalled. Also resolves when the
    /// controller is dropped, so orphaned loops cannot hang forever.
    pub async fn cancelled(&mut self) {
        let _ = self.receiver.wait_for(|stop| *stop).await;
    }
}
