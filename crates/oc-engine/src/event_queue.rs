//! Priority queue for scheduled actions.

use oc_ir::{ClipId, TrackId};

use crate::graph::NodeId;
use crate::voice::VoiceId;

/// Something the scheduler does at a point on the audio clock.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Build and start a synth voice
    NoteOn {
        track: TrackId,
        voice: VoiceId,
        pitch: u8,
        velocity: u8,
        /// Seconds, or `None` to sustain until stopped
        duration: Option<f64>,
    },
    /// Build and start a sample voice, `offset` seconds into the clip
    SampleStart {
        track: TrackId,
        voice: VoiceId,
        clip: ClipId,
        offset: f64,
    },
    /// Drop a voice whose release has completed
    Reap { track: TrackId, voice: VoiceId },
    /// Metronome click
    Click { accent: bool },
    /// Remove nodes that have played out
    Free { nodes: [NodeId; 2] },
}

impl Action {
    /// The voice this action belongs to, if any.
    pub fn voice(&self) -> Option<(TrackId, VoiceId)> {
        match *self {
            Action::NoteOn { track, voice, .. }
            | Action::SampleStart { track, voice, .. }
            | Action::Reap { track, voice } => Some((track, voice)),
            Action::Click { .. } | Action::Free { .. } => None,
        }
    }
}

/// A queued action and its target time in seconds.
#[derive(Clone, Debug, PartialEq)]
pub struct Scheduled {
    pub time: f64,
    seq: u64,
    pub action: Action,
}

/// Actions sorted by time. Equal times keep insertion order.
#[derive(Clone, Debug, Default)]
pub struct EventQueue {
    events: Vec<Scheduled>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an action into the queue.
    pub fn push(&mut self, time: f64, action: Action) {
        let seq = self.next_seq;
        self.next_seq += 1;
        // Find insertion point to maintain sorted order
        let pos = self
            .events
            .binary_search_by(|e| e.time.total_cmp(&time).then(e.seq.cmp(&seq)))
            .unwrap_or_else(|pos| pos);
        self.events.insert(pos, Scheduled { time, seq, action });
    }

    /// Peek at the next action without removing it.
    pub fn peek(&self) -> Option<&Scheduled> {
        self.events.first()
    }

    /// Pop every action due strictly before `time`.
    pub fn pop_before(&mut self, time: f64) -> Vec<Scheduled> {
        let n = self.events.partition_point(|e| e.time < time);
        self.events.drain(..n).collect()
    }

    /// Pop every action due at or before `time`.
    pub fn pop_until(&mut self, time: f64) -> Vec<Scheduled> {
        let n = self.events.partition_point(|e| e.time <= time);
        self.events.drain(..n).collect()
    }

    /// Retain only actions matching the predicate, removing the rest.
    pub fn retain<F: FnMut(&Scheduled) -> bool>(&mut self, f: F) {
        self.events.retain(f);
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns the number of actions in the queue.
    pub fn len(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click(accent: bool) -> Action {
        Action::Click { accent }
    }

    #[test]
    fn event_ordering() {
        let mut queue = EventQueue::new();
        queue.push(10.0, click(false));
        queue.push(5.0, click(false));
        queue.push(15.0, click(true));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.peek().map(|e| e.time), Some(5.0));
        let times: Vec<f64> = queue.pop_until(f64::INFINITY).iter().map(|e| e.time).collect();
        assert_eq!(times, vec![5.0, 10.0, 15.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn equal_times_keep_insertion_order() {
        let mut queue = EventQueue::new();
        queue.push(1.0, click(true));
        queue.push(1.0, click(false));
        queue.push(0.5, click(false));
        let popped = queue.pop_until(1.0);
        assert_eq!(popped.len(), 3);
        assert_eq!(popped[1].action, click(true));
        assert_eq!(popped[2].action, click(false));
    }

    #[test]
    fn pop_before_is_strict() {
        let mut queue = EventQueue::new();
        queue.push(1.0, click(false));
        queue.push(2.0, click(false));
        assert_eq!(queue.pop_before(2.0).len(), 1);
        assert_eq!(queue.pop_until(2.0).len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn retain_drops_rejected_actions() {
        let mut queue = EventQueue::new();
        queue.push(1.0, click(true));
        queue.push(2.0, click(false));
        queue.push(3.0, click(true));
        queue.retain(|e| e.action != click(true));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek().map(|e| e.time), Some(2.0));
    }
}
