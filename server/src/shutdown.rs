//! Process-wide stop flag observed by the acceptor, the broadcaster and
//! every session.

use tokio::sync::watch;

/// Cloneable handle to the stop flag. Once requested it stays requested.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Sets the flag and wakes every task waiting in [`Shutdown::requested`]
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the flag is set; returns immediately if it already is
    pub async fn requested(&self) {
        let mut rx = self.rx.clone();
        // The sender lives in self, so wait_for cannot fail while we hold it
        let _ = rx.wait_for(|stop| *stop).await;
    }
}
