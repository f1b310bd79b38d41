use tokio::sync::mpsc;

/// Create a connected trigger pair.
///
/// A trigger is a coalescing wakeup edge for a worker task: firing while a
/// wakeup is already pending is a no-op, so any number of hooks can poke
/// the worker without queueing redundant passes.
pub fn trigger() -> (Trigger, TriggerListener) {
    let (tx, rx) = mpsc::channel(1);
    (Trigger { tx }, TriggerListener { rx })
}

/// Sending half. Cheap to clone and fire from any hook.
#[derive(Clone)]
pub struct Trigger {
    tx: mpsc::Sender<()>,
}

impl Trigger {
    /// Request a wakeup. Never blocks; a pending wakeup absorbs the edge.
    pub fn fire(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Receiving half, held by the worker task.
pub struct TriggerListener {
    rx: mpsc::Receiver<()>,
}

impl TriggerListener {
    /// Wait for the next wakeup. Returns false once every `Trigger` handle
    /// has been dropped.
    pub async fn next(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }

    /// Discard queued wakeups so one pass serves every edge fired so far.
    pub fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}
