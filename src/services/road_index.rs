//! Road <-> booth association
//!
//! A road has at most one active booth. Reassigning a road to a different
//! booth overwrites the old association (last writer wins) with a warning.

use crate::domain::types::{BoothId, RoadId};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

#[derive(Default)]
pub struct TollRoadAssociationIndex {
    booth_by_road: FxHashMap<RoadId, BoothId>,
    road_by_booth: FxHashMap<BoothId, RoadId>,
}

impl TollRoadAssociationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link `booth` to `road`, dropping any previous link of either side.
    /// Returns the booth that lost the road, if any.
    pub fn associate(&mut self, booth: BoothId, road: RoadId) -> Option<BoothId> {
        let mut displaced = None;
        if let Some(&existing) = self.booth_by_road.get(&road) {
            if existing == booth {
                return None;
            }
            warn!(
                road = %road,
                previous_booth = %existing,
                booth = %booth,
                "road_booth_association_overridden"
            );
            self.road_by_booth.remove(&existing);
            displaced = Some(existing);
        }

        if let Some(previous_road) = self.road_by_booth.insert(booth, road) {
            if previous_road != road {
                debug!(booth = %booth, from = %previous_road, to = %road, "booth_moved_road");
                self.booth_by_road.remove(&previous_road);
            }
        }
        self.booth_by_road.insert(road, booth);
        displaced
    }

    pub fn lookup_booth_for_road(&self, road: RoadId) -> Option<BoothId> {
        self.booth_by_road.get(&road).copied()
    }

    pub fn lookup_road_for_booth(&self, booth: BoothId) -> Option<RoadId> {
        self.road_by_booth.get(&booth).copied()
    }

    pub fn road_has_booth(&self, road: RoadId) -> bool {
        self.booth_by_road.contains_key(&road)
    }

    /// Remove the road's association. Returns the booth that owned it.
    pub fn disassociate(&mut self, road: RoadId) -> Option<BoothId> {
        let booth = self.booth_by_road.remove(&road)?;
        self.road_by_booth.remove(&booth);
        Some(booth)
    }

    pub fn len(&self) -> usize {
        self.booth_by_road.len()
    }

    pub fn is_empty(&self) -> bool {
        self.booth_by_road.is_empty()
    }

    pub fn clear(&mut self) {
        self.booth_by_road.clear();
        self.road_by_booth.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_associate_and_lookup() {
        let mut index = TollRoadAssociationIndex::new();
        index.associate(BoothId(1), RoadId(10));

        assert_eq!(index.lookup_booth_for_road(RoadId(10)), Some(BoothId(1)));
        assert_eq!(index.lookup_road_for_booth(BoothId(1)), Some(RoadId(10)));
        assert!(index.road_has_booth(RoadId(10)));
        assert!(!index.road_has_booth(RoadId(11)));
    }

    #[test]
    fn test_last_writer_wins() {
        let mut index = TollRoadAssociationIndex::new();
        assert_eq!(index.associate(BoothId(1), RoadId(10)), None);
        assert_eq!(index.associate(BoothId(2), RoadId(10)), Some(BoothId(1)));
        assert_eq!(index.associate(BoothId(2), RoadId(10)), None);

        assert_eq!(index.lookup_booth_for_road(RoadId(10)), Some(BoothId(2)));
        assert_eq!(index.lookup_road_for_booth(BoothId(1)), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_booth_moves_to_new_road() {
        let mut index = TollRoadAssociationIndex::new();
        index.associate(BoothId(1), RoadId(10));
        assert_eq!(index.associate(BoothId(1), RoadId(11)), None);

        assert!(!index.road_has_booth(RoadId(10)));
        assert_eq!(index.lookup_booth_for_road(RoadId(11)), Some(BoothId(1)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_disassociate() {
        let mut index = TollRoadAssociationIndex::new();
        index.associate(BoothId(1), RoadId(10));

        assert_eq!(index.disassociate(RoadId(10)), Some(BoothId(1)));
        assert_eq!(index.disassociate(RoadId(10)), None);
        assert!(index.is_empty());
        assert_eq!(index.lookup_road_for_booth(BoothId(1)), None);
    }
}
