use std::collections::BTreeSet;

use fiducial_sim_core::{MarkerId, TargetSlot};
use rand::{seq::SliceRandom, Rng};

use crate::RandomizerError;

/// Ordered set of distinct markers, one per target slot.
///
/// Position `i` holds the marker assigned to slot `i + 1`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarkerSelection {
    markers: Vec<MarkerId>,
}

impl MarkerSelection {
    /// Draws `count` distinct markers from the pool `0..pool_size`.
    ///
    /// The whole pool is shuffled with Fisher-Yates so every permutation is
    /// equally likely; the first `count` entries are kept in shuffled order.
    pub fn draw<R>(pool_size: u8, count: u8, rng: &mut R) -> Result<Self, RandomizerError>
    where
        R: Rng + ?Sized,
    {
        validate_sizes(pool_size, count)?;

        let mut pool: Vec<MarkerId> = (0..pool_size).map(MarkerId::new).collect();
        pool.shuffle(rng);
        pool.truncate(usize::from(count));

        Ok(Self { markers: pool })
    }

    /// Wraps an explicit assignment, rejecting duplicates and ids outside the pool.
    pub fn from_markers(markers: Vec<MarkerId>, pool_size: u8) -> Result<Self, RandomizerError> {
        let count = u8::try_from(markers.len()).map_err(|_| RandomizerError::InvalidSizes {
            pool_size,
            slot_count: u8::MAX,
        })?;
        validate_sizes(pool_size, count)?;

        let mut seen = BTreeSet::new();
        for marker in &markers {
            if marker.get() >= pool_size {
                return Err(RandomizerError::MarkerOutOfPool {
                    marker: *marker,
                    pool_size,
                });
            }
            if !seen.insert(*marker) {
                return Err(RandomizerError::DuplicateMarker { marker: *marker });
            }
        }

        Ok(Self { markers })
    }

    /// Markers in assignment order.
    #[must_use]
    pub fn markers(&self) -> &[MarkerId] {
        &self.markers
    }

    /// Number of selected markers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Reports whether no markers were selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Marker assigned to the provided slot.
    #[must_use]
    pub fn marker_for(&self, slot: TargetSlot) -> Option<MarkerId> {
        self.markers.get(slot.position()).copied()
    }
}

pub(crate) fn validate_sizes(pool_size: u8, slot_count: u8) -> Result<(), RandomizerError> {
    if slot_count == 0 || slot_count > pool_size {
        return Err(RandomizerError::InvalidSizes {
            pool_size,
            slot_count,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn draw_keeps_requested_count() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let selection = MarkerSelection::draw(16, 8, &mut rng).expect("valid sizes");

        assert_eq!(selection.len(), 8);
    }

    #[test]
    fn draw_rejects_more_slots_than_markers() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let error = MarkerSelection::draw(4, 5, &mut rng).expect_err("pool too small");

        assert_eq!(
            error,
            RandomizerError::InvalidSizes {
                pool_size: 4,
                slot_count: 5
            }
        );
    }

    #[test]
    fn draw_rejects_zero_slots() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        assert!(MarkerSelection::draw(16, 0, &mut rng).is_err());
    }

    #[test]
    fn full_pool_draw_is_a_permutation() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let selection = MarkerSelection::draw(16, 16, &mut rng).expect("valid sizes");
        let mut ids: Vec<u8> = selection.markers().iter().map(MarkerId::get).collect();
        ids.sort_unstable();

        assert_eq!(ids, (0..16).collect::<Vec<u8>>());
    }

    #[test]
    fn from_markers_rejects_duplicates() {
        let error = MarkerSelection::from_markers(vec![MarkerId::new(1), MarkerId::new(1)], 16)
            .expect_err("duplicate marker");

        assert_eq!(
            error,
            RandomizerError::DuplicateMarker {
                marker: MarkerId::new(1)
            }
        );
    }

    #[test]
    fn from_markers_rejects_ids_outside_pool() {
        let error = MarkerSelection::from_markers(vec![MarkerId::new(16)], 16)
            .expect_err("marker outside pool");

        assert!(matches!(error, RandomizerError::MarkerOutOfPool { .. }));
    }

    #[test]
    fn marker_for_maps_slot_to_position() {
        let selection = MarkerSelection::from_markers(
            vec![MarkerId::new(9), MarkerId::new(3), MarkerId::new(12)],
            16,
        )
        .expect("valid markers");

        let slot = TargetSlot::new(2).expect("non-zero slot");
        assert_eq!(selection.marker_for(slot), Some(MarkerId::new(3)));
        let beyond = TargetSlot::new(4).expect("non-zero slot");
        assert_eq!(selection.marker_for(beyond), None);
    }
}
