//! Client-side prediction bookkeeping.
//!
//! Each tick the client snapshots its pre-send physics state keyed by the
//! input sequence it is about to send. When an authoritative snapshot
//! arrives, confirmed entries are evicted and the remaining window is
//! re-integrated on top of the corrected base so the visible position does
//! not snap backward.

use std::collections::VecDeque;

use glam::Vec3;

use trundle_net::sequence::sequence_greater_than;

/// Prediction ring capacity (~2 s of ticks at 60 Hz).
pub const DEFAULT_RING_CAPACITY: usize = 128;

/// Number of positional-error samples retained for diagnostics.
const ERROR_SAMPLE_CAPACITY: usize = 128;

// ---------------------------------------------------------------------------
// LocosphereState
// ---------------------------------------------------------------------------

/// Snapshot of the local locosphere taken just before an input send.
#[derive(Debug, Clone, PartialEq)]
pub struct LocosphereState {
    /// Position at snapshot time.
    pub position: Vec3,
    /// Linear velocity at snapshot time.
    pub linear_velocity: Vec3,
    /// Angular velocity at snapshot time.
    pub angular_velocity: Vec3,
    /// Velocity change over the previous tick divided by the tick step.
    /// Used to re-integrate the unacknowledged window after a correction.
    pub acceleration_estimate: Vec3,
    /// The input sequence sent alongside this snapshot.
    pub input_sequence: u16,
}

// ---------------------------------------------------------------------------
// PredictionRing
// ---------------------------------------------------------------------------

/// Bounded FIFO of [`LocosphereState`] keyed by wrapping input sequence.
/// Entries live until the server acknowledges their sequence.
#[derive(Debug)]
pub struct PredictionRing {
    entries: VecDeque<LocosphereState>,
    capacity: usize,
}

impl PredictionRing {
    /// Creates a ring holding at most `capacity` snapshots.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a snapshot, evicting the oldest when full.
    pub fn push(&mut self, state: LocosphereState) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(state);
    }

    /// Looks up the snapshot stored for `sequence`.
    pub fn get(&self, sequence: u16) -> Option<&LocosphereState> {
        self.entries
            .iter()
            .find(|entry| entry.input_sequence == sequence)
    }

    /// Drops every entry with sequence ≤ `sequence` in wrapping order.
    pub fn discard_through(&mut self, sequence: u16) {
        self.entries
            .retain(|entry| sequence_greater_than(entry.input_sequence, sequence));
    }

    /// Iterates the retained snapshots, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LocosphereState> {
        self.entries.iter()
    }

    /// Number of retained snapshots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops everything (e.g. on disconnect).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for PredictionRing {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Re-integration
// ---------------------------------------------------------------------------

/// Advances an authoritative position/velocity pair across the
/// still-unacknowledged window: one explicit-Euler step per pending entry,
/// feeding each entry's stored acceleration estimate back into velocity.
pub fn reintegrate<'a>(
    mut position: Vec3,
    mut velocity: Vec3,
    dt: f32,
    pending: impl Iterator<Item = &'a LocosphereState>,
) -> (Vec3, Vec3) {
    for state in pending {
        position += velocity * dt;
        velocity += state.acceleration_estimate * dt;
    }
    (position, velocity)
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Rolling window of positional error samples (predicted vs authoritative).
/// Diagnostics only; corrections never read it.
#[derive(Debug, Default)]
pub struct PredictionDiagnostics {
    samples: VecDeque<f32>,
}

impl PredictionDiagnostics {
    /// Records one error sample, evicting the oldest past capacity.
    pub fn record(&mut self, error: f32) {
        if self.samples.len() >= ERROR_SAMPLE_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(error);
    }

    /// The most recent sample.
    pub fn latest(&self) -> Option<f32> {
        self.samples.back().copied()
    }

    /// Mean of the retained samples (0.0 when empty).
    pub fn mean(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f32>() / self.samples.len() as f32
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if no samples were recorded yet.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn state(sequence: u16) -> LocosphereState {
        LocosphereState {
            position: Vec3::new(sequence as f32, 0.0, 0.0),
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            acceleration_estimate: Vec3::ZERO,
            input_sequence: sequence,
        }
    }

    #[test]
    fn test_ring_is_bounded() {
        let mut ring = PredictionRing::new(4);
        for sequence in 0..10u16 {
            ring.push(state(sequence));
        }
        assert_eq!(ring.len(), 4);
        let retained: Vec<u16> = ring.iter().map(|entry| entry.input_sequence).collect();
        assert_eq!(retained, vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_get_finds_stored_sequence() {
        let mut ring = PredictionRing::default();
        for sequence in 10..15u16 {
            ring.push(state(sequence));
        }
        assert_eq!(ring.get(12).unwrap().position.x, 12.0);
        assert!(ring.get(99).is_none());
    }

    #[test]
    fn test_discard_through_keeps_newer_entries() {
        let mut ring = PredictionRing::default();
        for sequence in 40..=45u16 {
            ring.push(state(sequence));
        }
        ring.discard_through(42);
        let retained: Vec<u16> = ring.iter().map(|entry| entry.input_sequence).collect();
        assert_eq!(retained, vec![43, 44, 45]);
    }

    #[test]
    fn test_discard_through_handles_wrap() {
        let mut ring = PredictionRing::default();
        for sequence in [65534u16, 65535, 0, 1] {
            ring.push(state(sequence));
        }
        ring.discard_through(65535);
        let retained: Vec<u16> = ring.iter().map(|entry| entry.input_sequence).collect();
        assert_eq!(retained, vec![0, 1]);
    }

    #[test]
    fn test_reintegration_matches_explicit_replay() {
        // Server state at the ack, then three pending inputs with known
        // acceleration estimates.
        let dt = 0.01f32;
        let base_position = Vec3::new(1.0, 0.0, 2.0);
        let base_velocity = Vec3::new(0.5, 0.0, -0.5);
        let accelerations = [
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 5.0),
        ];

        let mut ring = PredictionRing::default();
        for (offset, accel) in accelerations.iter().enumerate() {
            ring.push(LocosphereState {
                position: Vec3::ZERO,
                linear_velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
                acceleration_estimate: *accel,
                input_sequence: 100 + offset as u16,
            });
        }

        let (position, velocity) = reintegrate(base_position, base_velocity, dt, ring.iter());

        // From-scratch replay with the same integrator.
        let mut expected_position = base_position;
        let mut expected_velocity = base_velocity;
        for accel in accelerations {
            expected_position += expected_velocity * dt;
            expected_velocity += accel * dt;
        }
        assert!((position - expected_position).length() < 1e-6);
        assert!((velocity - expected_velocity).length() < 1e-6);
    }

    #[test]
    fn test_reintegration_with_empty_window_is_identity() {
        let ring = PredictionRing::default();
        let (position, velocity) = reintegrate(
            Vec3::new(3.0, 1.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
            0.016,
            ring.iter(),
        );
        assert_eq!(position, Vec3::new(3.0, 1.0, 0.0));
        assert_eq!(velocity, Vec3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn test_diagnostics_window_is_bounded() {
        let mut diagnostics = PredictionDiagnostics::default();
        for index in 0..200 {
            diagnostics.record(index as f32);
        }
        assert_eq!(diagnostics.len(), 128);
        assert_eq!(diagnostics.latest(), Some(199.0));
        assert!(diagnostics.mean() > 0.0);
    }
}
