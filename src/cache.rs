use crate::model::{CategoryId, Indicator, IndicatorId, Month, Track};
use std::collections::HashMap;

/// Client-side copy of the indicator collection.
///
/// Optimistic edits land here first; a refetch replaces the whole
/// collection and bumps `generation`.
#[derive(Debug, Default, Clone)]
pub struct IndicatorCache {
    indicators: Vec<Indicator>,
    index: HashMap<IndicatorId, usize>,
    generation: u64,
}

impl IndicatorCache {
    pub fn new(indicators: Vec<Indicator>) -> Self {
        let mut cache = IndicatorCache::default();
        cache.replace(indicators);
        cache
    }

    /// Swaps in a freshly fetched collection.
    pub fn replace(&mut self, indicators: Vec<Indicator>) {
        self.index.clear();
        for (pos, ind) in indicators.iter().enumerate() {
            self.index.entry(ind.id).or_insert(pos);
        }
        self.indicators = indicators;
        self.generation += 1;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn all(&self) -> &[Indicator] {
        &self.indicators
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    pub fn get(&self, id: IndicatorId) -> Option<&Indicator> {
        self.index.get(&id).map(|&pos| &self.indicators[pos])
    }

    fn get_mut(&mut self, id: IndicatorId) -> Option<&mut Indicator> {
        let pos = *self.index.get(&id)?;
        self.indicators.get_mut(pos)
    }

    pub fn value(&self, id: IndicatorId, month: Month, track: Track) -> Option<f64> {
        self.get(id)?.value(month, track)
    }

    /// Writes one monthly value. Returns the previous value, or `None` as the
    /// outer option when the indicator is not cached.
    pub fn set_value(
        &mut self,
        id: IndicatorId,
        month: Month,
        track: Track,
        value: Option<f64>,
    ) -> Option<Option<f64>> {
        self.get_mut(id).map(|ind| ind.set_value(month, track, value))
    }

    pub fn set_categories(&mut self, id: IndicatorId, categories: Vec<CategoryId>) -> bool {
        match self.get_mut(id) {
            Some(ind) => {
                ind.categories = categories;
                true
            }
            None => false,
        }
    }

    pub fn upsert(&mut self, indicator: Indicator) {
        match self.get_mut(indicator.id) {
            Some(slot) => *slot = indicator,
            None => {
                self.index.insert(indicator.id, self.indicators.len());
                self.indicators.push(indicator);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_value_returns_previous() {
        let mut cache = IndicatorCache::new(vec![Indicator::new(1)]);
        assert_eq!(cache.set_value(1, Month::Mar, Track::Real, Some(85.0)), Some(None));
        assert_eq!(
            cache.set_value(1, Month::Mar, Track::Real, Some(90.0)),
            Some(Some(85.0))
        );
        assert_eq!(cache.value(1, Month::Mar, Track::Real), Some(90.0));
        assert_eq!(cache.set_value(2, Month::Mar, Track::Real, Some(1.0)), None);
    }

    #[test]
    fn replace_bumps_generation_and_reindexes() {
        let mut cache = IndicatorCache::new(vec![Indicator::new(1), Indicator::new(2)]);
        let first = cache.generation();
        cache.replace(vec![Indicator::new(2)]);
        assert!(cache.generation() > first);
        assert!(cache.get(1).is_none());
        assert_eq!(cache.get(2).map(|i| i.id), Some(2));
    }

    #[test]
    fn upsert_and_categories() {
        let mut cache = IndicatorCache::default();
        cache.upsert(Indicator::new(7));
        assert!(cache.set_categories(7, vec![3, 4]));
        assert!(!cache.set_categories(8, vec![3]));
        assert_eq!(cache.get(7).map(|i| i.categories.clone()), Some(vec![3, 4]));
        assert_eq!(cache.len(), 1);
    }
}
