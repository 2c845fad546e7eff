//! Booth lifecycle: spawn processing and retirement
//!
//! A booth reported by the world is processed exactly once: its road is
//! resolved and associated, a display name assigned and statistics created.
//! Booths whose road is not resolved yet stay pending and are retried on the
//! next tick.

use crate::domain::types::{BoothDescriptor, BoothId, RoadId, Tick};
use crate::error::TollError;
use crate::services::insight_store::TollBoothInsightStore;
use crate::services::road_index::TollRoadAssociationIndex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct TollBooth {
    pub id: BoothId,
    pub road: Option<RoadId>,
    pub name: String,
    pub processed: bool,
    pub processed_at: Option<Tick>,
}

impl TollBooth {
    fn pending(id: BoothId) -> Self {
        Self { id, road: None, name: String::new(), processed: false, processed_at: None }
    }
}

#[derive(Default)]
pub struct BoothRegistry {
    booths: FxHashMap<BoothId, TollBooth>,
    names_assigned: u32,
    displaced: Vec<BoothId>,
}

impl BoothRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-time setup of a spawned booth. `Ok(false)` if it was already processed.
    ///
    /// Taking over a road from another booth leaves that booth without a road;
    /// it is reported by `take_displaced`.
    pub fn process_once(
        &mut self,
        descriptor: &BoothDescriptor,
        now: Tick,
        index: &mut TollRoadAssociationIndex,
        insights: &TollBoothInsightStore,
    ) -> Result<bool, TollError> {
        if self.is_processed(descriptor.id) {
            return Ok(false);
        }
        let Some(road) = descriptor.road else {
            self.booths.entry(descriptor.id).or_insert_with(|| TollBooth::pending(descriptor.id));
            return Err(TollError::RoadUnresolved(descriptor.id));
        };

        if let Some(previous) = index.associate(descriptor.id, road) {
            if let Some(displaced) = self.booths.get_mut(&previous) {
                displaced.road = None;
            }
            insights.set_road(previous, None);
            self.displaced.push(previous);
        }

        let name = match descriptor.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                self.names_assigned += 1;
                format!("Toll Booth #{}", self.names_assigned)
            }
        };
        insights.register(descriptor.id, &name, Some(road));

        let booth = self.booths.entry(descriptor.id).or_insert_with(|| TollBooth::pending(descriptor.id));
        booth.road = Some(road);
        booth.name = name;
        booth.processed = true;
        booth.processed_at = Some(now);

        info!(booth = %descriptor.id, road = %road, name = %booth.name, tick = %now, "booth_registered");
        Ok(true)
    }

    /// Booths that lost their road since the last call
    pub fn take_displaced(&mut self) -> Vec<BoothId> {
        std::mem::take(&mut self.displaced)
    }

    /// Remove booths the world no longer reports. Their road association is dropped.
    pub fn retire_missing(
        &mut self,
        active: &[BoothDescriptor],
        index: &mut TollRoadAssociationIndex,
    ) -> Vec<TollBooth> {
        let live: FxHashSet<BoothId> = active.iter().map(|d| d.id).collect();
        let gone: Vec<BoothId> = self.booths.keys().filter(|id| !live.contains(id)).copied().collect();

        let mut retired = Vec::with_capacity(gone.len());
        for id in gone {
            if let Some(booth) = self.booths.remove(&id) {
                if let Some(road) = booth.road {
                    if index.lookup_booth_for_road(road) == Some(id) {
                        index.disassociate(road);
                    }
                }
                info!(booth = %id, name = %booth.name, "booth_retired");
                retired.push(booth);
            }
        }
        retired.sort_unstable_by_key(|b| b.id);
        retired
    }

    pub fn get(&self, booth: BoothId) -> Option<&TollBooth> {
        self.booths.get(&booth)
    }

    pub fn is_processed(&self, booth: BoothId) -> bool {
        self.booths.get(&booth).is_some_and(|b| b.processed)
    }

    pub fn len(&self) -> usize {
        self.booths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.booths.is_empty()
    }

    pub fn clear(&mut self) {
        self.booths.clear();
        self.displaced.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: u32, road: Option<u32>, name: Option<&str>) -> BoothDescriptor {
        BoothDescriptor { id: BoothId(id), road: road.map(RoadId), name: name.map(str::to_string) }
    }

    #[test]
    fn test_process_once() {
        let mut registry = BoothRegistry::new();
        let mut index = TollRoadAssociationIndex::new();
        let insights = TollBoothInsightStore::new();
        let d = descriptor(1, Some(10), None);

        assert!(registry.process_once(&d, Tick(0), &mut index, &insights).unwrap());
        assert!(!registry.process_once(&d, Tick(1), &mut index, &insights).unwrap());

        let booth = registry.get(BoothId(1)).unwrap();
        assert_eq!(booth.name, "Toll Booth #1");
        assert_eq!(booth.processed_at, Some(Tick(0)));
        assert_eq!(index.lookup_booth_for_road(RoadId(10)), Some(BoothId(1)));
        assert!(insights.contains(BoothId(1)));
    }

    #[test]
    fn test_unresolved_road_retried() {
        let mut registry = BoothRegistry::new();
        let mut index = TollRoadAssociationIndex::new();
        let insights = TollBoothInsightStore::new();

        let err = registry
            .process_once(&descriptor(1, None, None), Tick(0), &mut index, &insights)
            .unwrap_err();
        assert_eq!(err, TollError::RoadUnresolved(BoothId(1)));
        assert!(!registry.is_processed(BoothId(1)));

        assert!(registry
            .process_once(&descriptor(1, Some(10), None), Tick(1), &mut index, &insights)
            .unwrap());
        assert!(registry.is_processed(BoothId(1)));
    }

    #[test]
    fn test_world_name_kept_and_numbering() {
        let mut registry = BoothRegistry::new();
        let mut index = TollRoadAssociationIndex::new();
        let insights = TollBoothInsightStore::new();

        registry
            .process_once(&descriptor(1, Some(10), Some("Harbour Bridge")), Tick(0), &mut index, &insights)
            .unwrap();
        registry.process_once(&descriptor(2, Some(11), None), Tick(0), &mut index, &insights).unwrap();

        assert_eq!(registry.get(BoothId(1)).unwrap().name, "Harbour Bridge");
        assert_eq!(registry.get(BoothId(2)).unwrap().name, "Toll Booth #1");
    }

    #[test]
    fn test_retire_missing() {
        let mut registry = BoothRegistry::new();
        let mut index = TollRoadAssociationIndex::new();
        let insights = TollBoothInsightStore::new();
        let a = descriptor(1, Some(10), None);
        let b = descriptor(2, Some(11), None);
        registry.process_once(&a, Tick(0), &mut index, &insights).unwrap();
        registry.process_once(&b, Tick(0), &mut index, &insights).unwrap();

        let retired = registry.retire_missing(&[b], &mut index);
        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].id, BoothId(1));
        assert!(!index.road_has_booth(RoadId(10)));
        assert!(index.road_has_booth(RoadId(11)));
        assert_eq!(registry.len(), 1);
        // Statistics survive retirement
        assert!(insights.contains(BoothId(1)));
    }

    #[test]
    fn test_road_takeover_displaces_previous_booth() {
        let mut registry = BoothRegistry::new();
        let mut index = TollRoadAssociationIndex::new();
        let insights = TollBoothInsightStore::new();
        registry.process_once(&descriptor(1, Some(10), None), Tick(0), &mut index, &insights).unwrap();
        assert!(registry.take_displaced().is_empty());

        registry.process_once(&descriptor(2, Some(10), None), Tick(5), &mut index, &insights).unwrap();
        assert_eq!(registry.take_displaced(), vec![BoothId(1)]);
        assert!(registry.take_displaced().is_empty());

        assert_eq!(index.lookup_booth_for_road(RoadId(10)), Some(BoothId(2)));
        assert_eq!(registry.get(BoothId(1)).unwrap().road, None);
        assert!(registry.is_processed(BoothId(1)));
        assert_eq!(insights.ledger(BoothId(1)).unwrap().road, None);
        assert_eq!(insights.ledger(BoothId(2)).unwrap().road, Some(RoadId(10)));

        // Retiring the displaced booth leaves the new owner in place
        let retired = registry.retire_missing(&[descriptor(2, Some(10), None)], &mut index);
        assert_eq!(retired[0].id, BoothId(1));
        assert_eq!(index.lookup_booth_for_road(RoadId(10)), Some(BoothId(2)));
    }
}
