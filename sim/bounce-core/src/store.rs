//! Pre-allocated trajectory storage.

use nalgebra::Vector3;

use bounce_types::{BufferId, Result, SimError, SimulationState};

/// An ordered, fixed-length sequence of states for one rollout.
///
/// States are allocated once and overwritten in place on every re-run.
/// Indices are stable for the lifetime of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryStore {
    states: Vec<SimulationState>,
    has_control_channel: bool,
}

impl TrajectoryStore {
    /// Allocate `n_states` zero-initialized states.
    #[must_use]
    pub fn allocate(n_states: usize, has_control_channel: bool) -> Self {
        Self {
            states: vec![SimulationState::zeroed(has_control_channel); n_states],
            has_control_channel,
        }
    }

    /// Number of states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the store holds no states.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Whether every state carries an external-force channel.
    #[must_use]
    pub fn has_control_channel(&self) -> bool {
        self.has_control_channel
    }

    /// State `index`.
    pub fn state(&self, index: usize) -> Result<&SimulationState> {
        let len = self.len();
        self.states
            .get(index)
            .ok_or(SimError::StateIndexOutOfRange { index, len })
    }

    /// State `index` for in-place mutation.
    pub fn state_mut(&mut self, index: usize) -> Result<&mut SimulationState> {
        let len = self.len();
        self.states
            .get_mut(index)
            .ok_or(SimError::StateIndexOutOfRange { index, len })
    }

    /// States `index` and `index + 1`, both mutable.
    pub fn pair_mut(
        &mut self,
        index: usize,
    ) -> Result<(&mut SimulationState, &mut SimulationState)> {
        let len = self.len();
        if index + 1 >= len {
            return Err(SimError::StateIndexOutOfRange {
                index: index + 1,
                len,
            });
        }
        let (head, tail) = self.states.split_at_mut(index + 1);
        Ok((&mut head[index], &mut tail[0]))
    }

    /// The last state.
    pub fn last(&self) -> Result<&SimulationState> {
        self.states
            .last()
            .ok_or(SimError::StateIndexOutOfRange { index: 0, len: 0 })
    }

    /// Iterate over all states in order.
    pub fn iter(&self) -> impl Iterator<Item = &SimulationState> {
        self.states.iter()
    }

    /// Read one buffer.
    pub fn buffer(&self, id: BufferId) -> Result<&Vector3<f64>> {
        self.state(id.state)?
            .buffer(id.field)
            .ok_or(SimError::MissingControlChannel { state: id.state })
    }

    /// Mutable access to one buffer.
    pub fn buffer_mut(&mut self, id: BufferId) -> Result<&mut Vector3<f64>> {
        self.state_mut(id.state)?
            .buffer_mut(id.field)
            .ok_or(SimError::MissingControlChannel { state: id.state })
    }

    /// Zero every buffer without reallocating.
    pub fn reset(&mut self) {
        for state in &mut self.states {
            state.reset();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_zeroed() {
        let store = TrajectoryStore::allocate(5, true);
        assert_eq!(store.len(), 5);
        assert!(store.iter().all(|s| *s == SimulationState::zeroed(true)));
        assert!(store.has_control_channel());
    }

    #[test]
    fn test_reset_keeps_allocation() {
        let mut store = TrajectoryStore::allocate(3, false);
        store.state_mut(2).unwrap().position = Vector3::new(1.0, 2.0, 3.0);
        let ptr = store.states.as_ptr();

        store.reset();

        assert_eq!(store.states.as_ptr(), ptr);
        assert_eq!(store.state(2).unwrap().position, Vector3::zeros());
    }

    #[test]
    fn test_pair_mut() {
        let mut store = TrajectoryStore::allocate(3, false);
        {
            let (from, to) = store.pair_mut(1).unwrap();
            from.velocity = Vector3::x();
            to.velocity = Vector3::y();
        }
        assert_eq!(store.state(1).unwrap().velocity, Vector3::x());
        assert_eq!(store.state(2).unwrap().velocity, Vector3::y());
        assert!(store.pair_mut(2).is_err());
    }

    #[test]
    fn test_buffer_addressing() {
        let mut store = TrajectoryStore::allocate(2, false);
        *store.buffer_mut(BufferId::velocity(1)).unwrap() = Vector3::new(0.0, -5.0, 0.0);
        assert_eq!(store.buffer(BufferId::velocity(1)).unwrap().y, -5.0);

        assert_eq!(
            store.buffer(BufferId::external_force(0)).unwrap_err(),
            SimError::MissingControlChannel { state: 0 }
        );
        assert_eq!(
            store.buffer(BufferId::position(7)).unwrap_err(),
            SimError::StateIndexOutOfRange { index: 7, len: 2 }
        );
    }
}
