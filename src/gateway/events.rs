use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

use super::envelope::Envelope;

/// Dispatch fan-out owned by the session actor.
///
/// Subscribers outlive individual connections; a reconnect never drops them.
#[derive(Debug, Default)]
pub struct EventSurface {
    subscribers: Vec<mpsc::UnboundedSender<Envelope>>,
    published: u64,
}

impl EventSurface {
    pub fn subscribe(&mut self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        EventStream { rx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn published(&self) -> u64 {
        self.published
    }

    /// Deliver to every live subscriber and forget the ones that went away.
    pub fn publish(&mut self, envelope: Envelope) {
        self.published = self.published.saturating_add(1);
        match self.subscribers.len() {
            0 => {}
            1 => {
                if self.subscribers[0].send(envelope).is_err() {
                    self.subscribers.clear();
                }
            }
            _ => self
                .subscribers
                .retain(|subscriber| subscriber.send(envelope.clone()).is_ok()),
        }
    }
}

/// Receiving end of one subscription. Ends when the session actor stops.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = Envelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
