//! Live update dispatcher: two independent toggles (real-time events and a
//! periodic auto-refresh timer) that both feed one `Invalidate` channel.
//! The board consumes the channel serially.
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// The notification topics that invalidate the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabTopic {
    LabAvailability,
    Booking,
    PcStatus,
}

impl LabTopic {
    pub fn from_wire(topic: &str) -> Option<LabTopic> {
        match topic {
            "lab_availability" => Some(LabTopic::LabAvailability),
            "booking" => Some(LabTopic::Booking),
            "pc_status" => Some(LabTopic::PcStatus),
            _ => None,
        }
    }
}

/// An event from the backend notification bus. The payload is opaque; only
/// the topic is inspected.
#[derive(Debug, Clone, Deserialize)]
pub struct LabEvent {
    pub topic: String,
    #[serde(default)]
    pub payload: Value,
}

/// Message telling the board to refetch for its pinned selection.
#[derive(Debug, Clone, Copy)]
pub struct Invalidate;

pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Invalidate>,
    real_time: Option<JoinHandle<()>>,
    auto_refresh: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Creates the dispatcher and the invalidation channel its toggles
    /// feed. Both toggles start disabled.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Invalidate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                real_time: None,
                auto_refresh: None,
            },
            rx,
        )
    }

    pub fn real_time_enabled(&self) -> bool {
        self.real_time.is_some()
    }

    pub fn auto_refresh_enabled(&self) -> bool {
        self.auto_refresh.is_some()
    }

    /// Forwards one `Invalidate` per relevant event on `events`. Enabling
    /// again replaces the previous subscription.
    pub fn enable_real_time(&mut self, mut events: mpsc::UnboundedReceiver<LabEvent>) {
        self.disable_real_time();
        let tx = self.tx.clone();
        self.real_time = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match LabTopic::from_wire(&event.topic) {
                    Some(topic) => {
                        debug!(?topic, "live event received");
                        if tx.send(Invalidate).is_err() {
                            break;
                        }
                    }
                    None => debug!(topic = %event.topic, "ignoring unrelated event"),
                }
            }
        }));
    }

    pub fn disable_real_time(&mut self) {
        if let Some(handle) = self.real_time.take() {
            handle.abort();
        }
    }

    /// Fires one `Invalidate` per elapsed `period`, independently of the
    /// event stream.
    pub fn enable_auto_refresh(&mut self, period: Duration) {
        self.disable_auto_refresh();
        let tx = self.tx.clone();
        self.auto_refresh = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if tx.send(Invalidate).is_err() {
                    break;
                }
            }
        }));
    }

    pub fn disable_auto_refresh(&mut self) {
        if let Some(handle) = self.auto_refresh.take() {
            handle.abort();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.disable_real_time();
        self.disable_auto_refresh();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn event(topic: &str) -> LabEvent {
        LabEvent {
            topic: topic.into(),
            payload: Value::Null,
        }
    }

    #[tokio::test]
    async fn real_time_forwards_relevant_topics_only() {
        let (mut dispatcher, mut invalidations) = Dispatcher::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        dispatcher.enable_real_time(events_rx);
        assert!(dispatcher.real_time_enabled());

        events_tx.send(event("booking")).unwrap();
        events_tx.send(event("chat_message")).unwrap();
        events_tx.send(event("pc_status")).unwrap();

        timeout(Duration::from_secs(1), invalidations.recv())
            .await
            .unwrap()
            .unwrap();
        timeout(Duration::from_secs(1), invalidations.recv())
            .await
            .unwrap()
            .unwrap();
        // the unrelated topic produced nothing further
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(invalidations.try_recv().is_err());
    }

    #[tokio::test]
    async fn disabling_real_time_stops_forwarding() {
        let (mut dispatcher, mut invalidations) = Dispatcher::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        dispatcher.enable_real_time(events_rx);
        dispatcher.disable_real_time();
        assert!(!dispatcher.real_time_enabled());

        let _ = events_tx.send(event("booking"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(invalidations.try_recv().is_err());
    }

    #[tokio::test]
    async fn auto_refresh_ticks_until_disabled() {
        let (mut dispatcher, mut invalidations) = Dispatcher::new();
        dispatcher.enable_auto_refresh(Duration::from_millis(5));

        timeout(Duration::from_secs(1), invalidations.recv())
            .await
            .unwrap()
            .unwrap();
        timeout(Duration::from_secs(1), invalidations.recv())
            .await
            .unwrap()
            .unwrap();

        dispatcher.disable_auto_refresh();
        tokio::time::sleep(Duration::from_millis(30)).await;
        while invalidations.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(invalidations.try_recv().is_err());
    }

    #[test]
    fn topic_wire_names() {
        assert_eq!(
            LabTopic::from_wire("lab_availability"),
            Some(LabTopic::LabAvailability)
        );
        assert_eq!(LabTopic::from_wire("booking"), Some(LabTopic::Booking));
        assert_eq!(LabTopic::from_wire("pc_status"), Some(LabTopic::PcStatus));
        assert_eq!(LabTopic::from_wire("attendance"), None);
    }
}
