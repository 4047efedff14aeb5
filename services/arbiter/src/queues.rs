//! Producer Queues
//!
//! One bounded queue per event source. Producers hold the sending halves;
//! the arbiter owns the receiving halves and only ever polls them.

use tokio::sync::mpsc::{
    self,
    error::{TryRecvError, TrySendError},
};
use tutor_core::events::{Event, SensorReading, SpeechEvent, VisionEvent};

/// The producer went away before the event could be queued.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{source_name} queue is closed")]
pub struct QueueClosed {
    pub source_name: &'static str,
}

/// Sending halves, cloned into each producer task.
#[derive(Debug, Clone)]
pub struct EventProducers {
    speech: mpsc::Sender<SpeechEvent>,
    vision: mpsc::Sender<VisionEvent>,
    sensor: mpsc::Sender<SensorReading>,
}

/// Receiving halves, owned by the arbiter.
#[derive(Debug)]
pub struct EventQueues {
    speech: mpsc::Receiver<SpeechEvent>,
    vision: mpsc::Receiver<VisionEvent>,
    sensor: mpsc::Receiver<SensorReading>,
}

/// Creates the three queues with the same bound.
pub fn bounded(capacity: usize) -> (EventProducers, EventQueues) {
    let (speech_tx, speech_rx) = mpsc::channel(capacity);
    let (vision_tx, vision_rx) = mpsc::channel(capacity);
    let (sensor_tx, sensor_rx) = mpsc::channel(capacity);
    (
        EventProducers {
            speech: speech_tx,
            vision: vision_tx,
            sensor: sensor_tx,
        },
        EventQueues {
            speech: speech_rx,
            vision: vision_rx,
            sensor: sensor_rx,
        },
    )
}

impl EventProducers {
    /// Queues an event on its source's queue, waiting while the queue is full.
    pub async fn submit(&self, event: Event) -> Result<(), QueueClosed> {
        match event {
            Event::Speech(e) => self.speech.send(e).await.map_err(|_| closed("speech")),
            Event::Vision(e) => self.vision.send(e).await.map_err(|_| closed("vision")),
            Event::Sensor(e) => self.sensor.send(e).await.map_err(|_| closed("sensor")),
        }
    }

    /// Non-blocking variant for producers that drop frames under load.
    /// Returns `Ok(false)` when the queue is full and the event was dropped.
    pub fn try_submit(&self, event: Event) -> Result<bool, QueueClosed> {
        match event {
            Event::Speech(e) => offer(&self.speech, e, "speech"),
            Event::Vision(e) => offer(&self.vision, e, "vision"),
            Event::Sensor(e) => offer(&self.sensor, e, "sensor"),
        }
    }
}

fn offer<T>(tx: &mpsc::Sender<T>, item: T, source_name: &'static str) -> Result<bool, QueueClosed> {
    match tx.try_send(item) {
        Ok(()) => Ok(true),
        Err(TrySendError::Full(_)) => Ok(false),
        Err(TrySendError::Closed(_)) => Err(closed(source_name)),
    }
}

fn closed(source_name: &'static str) -> QueueClosed {
    QueueClosed { source_name }
}

impl EventQueues {
    pub fn drain_sensor(&mut self) -> Vec<SensorReading> {
        drain(&mut self.sensor)
    }

    pub fn drain_speech(&mut self) -> Vec<SpeechEvent> {
        drain(&mut self.speech)
    }

    pub fn drain_vision(&mut self) -> Vec<VisionEvent> {
        drain(&mut self.vision)
    }
}

/// Takes everything currently queued without waiting. An empty or closed
/// queue simply yields nothing.
fn drain<T>(rx: &mut mpsc::Receiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(item) => items.push(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speech(text: &str) -> Event {
        Event::Speech(SpeechEvent {
            text: text.to_string(),
            confidence: 0.9,
            source: "test".to_string(),
        })
    }

    #[tokio::test]
    async fn test_events_route_to_their_source_queue() {
        let (producers, mut queues) = bounded(4);
        producers.submit(speech("one")).await.unwrap();
        producers
            .submit(Event::Sensor(SensorReading::default()))
            .await
            .unwrap();
        producers.submit(speech("two")).await.unwrap();

        let texts: Vec<String> = queues.drain_speech().into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert_eq!(queues.drain_sensor().len(), 1);
        assert!(queues.drain_vision().is_empty());
        assert!(queues.drain_speech().is_empty());
    }

    #[test]
    fn test_try_submit_drops_when_full() {
        let (producers, mut queues) = bounded(1);
        assert_eq!(producers.try_submit(speech("kept")), Ok(true));
        assert_eq!(producers.try_submit(speech("dropped")), Ok(false));
        assert_eq!(queues.drain_speech().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_after_arbiter_gone() {
        let (producers, queues) = bounded(1);
        drop(queues);
        let err = producers
            .submit(Event::Vision(VisionEvent::default()))
            .await
            .unwrap_err();
        assert_eq!(err.source_name, "vision");
    }

    #[test]
    fn test_drain_of_closed_queue_is_empty() {
        let (producers, mut queues) = bounded(2);
        producers.try_submit(speech("last words")).unwrap();
        drop(producers);
        assert_eq!(queues.drain_speech().len(), 1);
        assert!(queues.drain_speech().is_empty());
    }
}
