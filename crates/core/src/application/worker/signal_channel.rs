// Worker Signal Channel
// Single-slot rendezvous: the sender resumes only once the worker loop has
// observed the command.

use crate::domain::Signal;
use tokio::sync::{mpsc, oneshot};

struct Envelope {
    signal: Signal,
    observed: oneshot::Sender<()>,
}

/// Controller side of a worker's signal channel
#[derive(Clone)]
pub struct SignalSender {
    tx: mpsc::Sender<Envelope>,
}

/// Worker side of a signal channel
pub struct SignalReceiver {
    rx: mpsc::Receiver<Envelope>,
}

/// A signal taken off the channel but not yet acknowledged
pub struct ReceivedSignal {
    envelope: Envelope,
}

/// Create a signal channel bounded to one in-flight command
pub fn signal_channel() -> (SignalSender, SignalReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (SignalSender { tx }, SignalReceiver { rx })
}

impl SignalSender {
    /// Deliver a signal and wait until the worker has observed it.
    ///
    /// Returns false when the worker side went away before observing it.
    pub async fn send(&self, signal: Signal) -> bool {
        let (observed, ack) = oneshot::channel();
        if self.tx.send(Envelope { signal, observed }).await.is_err() {
            return false;
        }
        ack.await.is_ok()
    }
}

impl SignalReceiver {
    /// Wait for the next signal (None once the controller side is dropped)
    pub async fn recv(&mut self) -> Option<ReceivedSignal> {
        self.rx.recv().await.map(|envelope| ReceivedSignal { envelope })
    }
}

impl ReceivedSignal {
    pub fn signal(&self) -> Signal {
        self.envelope.signal
    }

    /// Mark the signal as observed, releasing the sender
    pub fn ack(self) -> Signal {
        let _ = self.envelope.observed.send(());
        self.envelope.signal
    }
}
