//! Destinations for decoded measurement sets.

use meterlink_core::Measurements;
use tokio::sync::mpsc;

/// Receiver of decoded measurement sets.
///
/// Invoked synchronously, at most once per decoded frame and only when
/// the set is non-empty.
///
/// Closures implement the trait directly:
///
/// ```
/// use meterlink_core::Measurements;
/// use meterlink_protocol::MeasurementSink;
///
/// let mut seen = 0usize;
/// let mut sink = |set: &Measurements| seen += set.len();
/// sink.on_measurements(&Measurements::new());
/// ```
pub trait MeasurementSink: Send {
    fn on_measurements(&mut self, measurements: &Measurements);
}

impl<F> MeasurementSink for F
where
    F: FnMut(&Measurements) + Send,
{
    fn on_measurements(&mut self, measurements: &Measurements) {
        self(measurements)
    }
}

/// Sink forwarding every set into a tokio channel.
///
/// A closed receiver is not an error for the collector; the set is dropped
/// and a debug event is emitted.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Measurements>,
}

impl ChannelSink {
    /// Create a sink and the receiver draining it.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Measurements>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MeasurementSink for ChannelSink {
    fn on_measurements(&mut self, measurements: &Measurements) {
        if self.tx.send(measurements.clone()).is_err() {
            tracing::debug!("Measurement receiver dropped, discarding set");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_sink() {
        let mut calls = Vec::new();
        {
            let mut sink = |set: &Measurements| calls.push(set.len());
            let mut set = Measurements::new();
            set.record("1-0:1.8.0", 1.0, "Wh");
            sink.on_measurements(&set);
        }
        assert_eq!(calls, vec![1]);
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (mut sink, mut rx) = ChannelSink::new();
        let mut set = Measurements::new();
        set.record("1-0:2.8.0", 3.0, "Wh");
        sink.on_measurements(&set);

        assert_eq!(rx.try_recv().unwrap(), set);
    }

    #[test]
    fn test_channel_sink_tolerates_closed_receiver() {
        let (mut sink, rx) = ChannelSink::new();
        drop(rx);
        sink.on_measurements(&Measurements::new());
    }
}
