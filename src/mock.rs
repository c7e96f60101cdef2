//! In-memory [`RawLink`] used by the test suite (spec.md's testable
//! properties in §8 need a link whose arrivals and drops can be
//! scripted, since exercising the real `PacketSocket` needs a live ring
//! and raw-socket privileges).

use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;

use crate::link::RawLink;

/// A link backed by two in-process queues: frames pushed with
/// [`MockLink::inject`] are what `recv` returns; frames passed to `send`
/// land in [`MockLink::sent`] for the test to inspect.
#[derive(Default)]
pub struct MockLink {
    inbound: Mutex<VecDeque<Vec<u8>>>,
    outbound: Mutex<Vec<Vec<u8>>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame to be returned by a future `recv` call, in order.
    pub fn inject(&self, frame: Vec<u8>) {
        self.inbound.lock().unwrap().push_back(frame);
    }

    /// Snapshot every frame handed to `send` so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.outbound.lock().unwrap().clone()
    }

    /// Number of frames handed to `send` so far.
    pub fn sent_count(&self) -> usize {
        self.outbound.lock().unwrap().len()
    }
}

impl RawLink for MockLink {
    fn send(&self, frame: &[u8]) -> io::Result<usize> {
        self.outbound.lock().unwrap().push(frame.to_vec());
        Ok(frame.len())
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let mut inbound = self.inbound.lock().unwrap();
        match inbound.pop_front() {
            Some(frame) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                Ok(Some(len))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recv_returns_none_when_empty() {
        let link = MockLink::new();
        let mut buf = [0u8; 64];
        assert!(link.recv(&mut buf).unwrap().is_none());
    }

    #[test]
    fn recv_returns_injected_frames_in_order() {
        let link = MockLink::new();
        link.inject(vec![1, 2, 3]);
        link.inject(vec![4, 5]);
        let mut buf = [0u8; 64];

        let len = link.recv(&mut buf).unwrap().unwrap();
        assert_eq!(&buf[..len], &[1, 2, 3]);

        let len = link.recv(&mut buf).unwrap().unwrap();
        assert_eq!(&buf[..len], &[4, 5]);

        assert!(link.recv(&mut buf).unwrap().is_none());
    }

    #[test]
    fn send_is_recorded() {
        let link = MockLink::new();
        link.send(&[9, 9, 9]).unwrap();
        assert_eq!(link.sent(), vec![vec![9, 9, 9]]);
    }
}
