//! Pose fan-out to connected clients.
//!
//! Delivery is best-effort: each subscriber gets one `try_send` per update.
//! A full buffer loses that update; a closed channel removes the subscriber
//! once the sweep is over.

use super::encode_event;
use anyhow::Result;
use axum::extract::ws::Utf8Bytes;
use ddr_common::{core::PoseSnapshot, live::LiveEvent};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};
use thiserror::Error;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    Mutex, RwLock,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle used to push frames to one connected client.
#[derive(Clone, Debug)]
pub struct Subscriber {
    pub id: SubscriberId,
    tx: mpsc::Sender<Utf8Bytes>,
}

impl Subscriber {
    pub fn new(id: SubscriberId, tx: mpsc::Sender<Utf8Bytes>) -> Self {
        Self { id, tx }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum DeliveryFailed {
    #[error("outbound buffer full")]
    Full,
    #[error("connection closed")]
    Closed,
}

/// Per-subscriber results of one publish.
#[derive(Debug, Default)]
pub struct PublishReport {
    pub delivered: usize,
    pub failures: Vec<(SubscriberId, DeliveryFailed)>,
}

impl PublishReport {
    pub fn pruned(&self) -> impl Iterator<Item = SubscriberId> + '_ {
        self.failures
            .iter()
            .filter(|(_, e)| *e == DeliveryFailed::Closed)
            .map(|(id, _)| *id)
    }

    pub fn dropped(&self) -> usize {
        self.failures
            .iter()
            .filter(|(_, e)| *e == DeliveryFailed::Full)
            .count()
    }
}

#[derive(Default)]
pub struct PoseRelayHub {
    next_id: AtomicU64,
    latest: RwLock<Option<PoseSnapshot>>,
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Utf8Bytes>>>,
}

impl PoseRelayHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> SubscriberId {
        SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns `false` if the subscriber was already registered.
    pub async fn subscribe(&self, subscriber: &Subscriber) -> bool {
        let mut subscribers = self.subscribers.lock().await;
        if subscribers.contains_key(&subscriber.id) {
            return false;
        }
        subscribers.insert(subscriber.id, subscriber.tx.clone());
        true
    }

    /// Returns `false` if the subscriber was not registered.
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().await.remove(&id).is_some()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    pub async fn latest(&self) -> Option<PoseSnapshot> {
        self.latest.read().await.clone()
    }

    /// Replace the stored snapshot and push a `pose_update` to every subscriber.
    pub async fn publish(&self, pose: PoseSnapshot, received_at: f64) -> Result<PublishReport> {
        let pose = pose.stamped(received_at);
        let frame = encode_event(&LiveEvent::PoseUpdate {
            joints: Some(pose.clone()).into(),
            timestamp: received_at,
        })?;

        // held across the snapshot write so fan-out order matches `latest`
        let mut subscribers = self.subscribers.lock().await;
        *self.latest.write().await = Some(pose);

        let mut report = PublishReport::default();
        for (id, tx) in subscribers.iter() {
            match tx.try_send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => report.failures.push((*id, DeliveryFailed::Full)),
                Err(TrySendError::Closed(_)) => {
                    report.failures.push((*id, DeliveryFailed::Closed))
                }
            }
        }
        for id in report.pruned() {
            subscribers.remove(&id);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddr_common::core::Joint;
    use serde_json::{json, Value};

    fn pose(x: f64) -> PoseSnapshot {
        PoseSnapshot {
            left_ankle: Joint::new(x, 10.0, 80),
            ..Default::default()
        }
    }

    async fn subscriber(hub: &PoseRelayHub, buffer: usize) -> (Subscriber, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(buffer);
        let subscriber = Subscriber::new(hub.next_id(), tx);
        assert!(hub.subscribe(&subscriber).await);
        (subscriber, rx)
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let hub = PoseRelayHub::new();
        assert_eq!(hub.latest().await, None);

        let report = hub.publish(pose(1.0), 42.0).await.unwrap();
        assert_eq!(report.delivered, 0);
        assert!(report.failures.is_empty());

        let latest = hub.latest().await.unwrap();
        assert_eq!(latest.left_ankle.x, 1.0);
        assert_eq!(latest.timestamp, Some(42.0));
    }

    #[tokio::test]
    async fn test_fan_out() {
        let hub = PoseRelayHub::new();
        let (_a, mut rx_a) = subscriber(&hub, 4).await;
        let (_b, mut rx_b) = subscriber(&hub, 4).await;

        let report = hub.publish(pose(3.0), 7.0).await.unwrap();
        assert_eq!(report.delivered, 2);

        for rx in [&mut rx_a, &mut rx_b] {
            let frame: Value = serde_json::from_str(rx.recv().await.unwrap().as_str()).unwrap();
            assert_eq!(frame["type"], "pose_update");
            assert_eq!(frame["timestamp"], json!(7.0));
            assert_eq!(frame["joints"]["left_ankle"]["x"], json!(3.0));
            assert_eq!(frame["joints"]["left_ankle"]["depth"], json!(80));
        }
    }

    #[tokio::test]
    async fn test_closed_subscribers_pruned() {
        let hub = PoseRelayHub::new();
        let (a, rx_a) = subscriber(&hub, 4).await;
        let (_b, mut rx_b) = subscriber(&hub, 4).await;
        let (c, rx_c) = subscriber(&hub, 4).await;
        drop(rx_a);
        drop(rx_c);

        let report = hub.publish(pose(5.0), 1.0).await.unwrap();
        assert_eq!(report.delivered, 1);
        let mut pruned: Vec<_> = report.pruned().collect();
        pruned.sort();
        assert_eq!(pruned, vec![a.id, c.id]);
        assert_eq!(hub.subscriber_count().await, 1);
        assert!(rx_b.recv().await.is_some());
        assert_eq!(hub.latest().await.unwrap().left_ankle.x, 5.0);
    }

    #[tokio::test]
    async fn test_full_buffer_drops_update() {
        let hub = PoseRelayHub::new();
        let (slow, mut rx_slow) = subscriber(&hub, 1).await;

        hub.publish(pose(1.0), 1.0).await.unwrap();
        let report = hub.publish(pose(2.0), 2.0).await.unwrap();
        assert_eq!(report.failures, vec![(slow.id, DeliveryFailed::Full)]);
        assert_eq!(report.dropped(), 1);
        assert_eq!(report.pruned().count(), 0);
        assert_eq!(hub.subscriber_count().await, 1);

        // only the first update made it
        let frame: Value = serde_json::from_str(rx_slow.recv().await.unwrap().as_str()).unwrap();
        assert_eq!(frame["joints"]["left_ankle"]["x"], json!(1.0));
        assert!(rx_slow.try_recv().is_err());
        assert_eq!(hub.latest().await.unwrap().left_ankle.x, 2.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publish_order() {
        let hub = std::sync::Arc::new(PoseRelayHub::new());
        let (_a, mut rx) = subscriber(&hub, 256).await;

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let hub = hub.clone();
                tokio::spawn(async move { hub.publish(pose(i as f64), i as f64).await.unwrap() })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let mut last = None;
        while let Ok(frame) = rx.try_recv() {
            last = Some(frame);
        }
        let frame: Value = serde_json::from_str(last.unwrap().as_str()).unwrap();
        let latest = hub.latest().await.unwrap();
        assert_eq!(frame["joints"]["left_ankle"]["x"], json!(latest.left_ankle.x));
    }

    #[tokio::test]
    async fn test_subscribe_idempotent() {
        let hub = PoseRelayHub::new();
        let (a, _rx) = subscriber(&hub, 1).await;
        assert!(!hub.subscribe(&a).await);
        assert_eq!(hub.subscriber_count().await, 1);

        assert!(hub.unsubscribe(a.id).await);
        assert!(!hub.unsubscribe(a.id).await);
        assert_eq!(hub.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_producer_timestamp_kept() {
        let hub = PoseRelayHub::new();
        let mut pose = pose(1.0);
        pose.timestamp = Some(12345.67);
        hub.publish(pose, 99.0).await.unwrap();
        assert_eq!(hub.latest().await.unwrap().timestamp, Some(12345.67));
    }
}
