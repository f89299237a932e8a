/*!
 * Trailing-output context carried between windows.
 *
 * The propagator remembers the last few translated lines so the next window's
 * prompt can show them as passive context. It never feeds anything back into
 * translation or the cache.
 */

use std::collections::VecDeque;

use super::window::TranslatedUnit;

/// Default number of trailing lines carried forward
pub const DEFAULT_CONTEXT_SIZE: usize = 3;

/// Bounded queue of the most recently translated lines
#[derive(Debug, Clone)]
pub struct ContextPropagator {
    size: usize,
    lines: VecDeque<String>,
}

impl ContextPropagator {
    /// Create an empty propagator holding at most `size` lines
    pub fn new(size: usize) -> Self {
        Self {
            size,
            lines: VecDeque::with_capacity(size),
        }
    }

    /// Create a propagator seeded from already translated output
    pub fn seeded(size: usize, results: &[TranslatedUnit]) -> Self {
        let mut propagator = Self::new(size);
        propagator.absorb(results);
        propagator
    }

    /// Record freshly translated output, dropping the oldest lines
    pub fn absorb(&mut self, results: &[TranslatedUnit]) {
        if self.size == 0 {
            return;
        }
        let skip = results.len().saturating_sub(self.size);
        for unit in &results[skip..] {
            if self.lines.len() == self.size {
                self.lines.pop_front();
            }
            self.lines.push_back(unit.translated_text.clone());
        }
    }

    /// Current context, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    /// Maximum number of lines kept
    pub fn size(&self) -> usize {
        self.size
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl Default for ContextPropagator {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_SIZE)
    }
}

/// Last `size` translations of `results`, oldest first
pub fn tail_of(results: &[TranslatedUnit], size: usize) -> Vec<String> {
    let skip = results.len().saturating_sub(size);
    results[skip..].iter().map(|r| r.translated_text.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translated(range: std::ops::RangeInclusive<u64>) -> Vec<TranslatedUnit> {
        range.map(|i| TranslatedUnit::new(i, format!("T{}", i))).collect()
    }

    #[test]
    fn test_absorb_shouldKeepOnlyNewestLines() {
        let mut propagator = ContextPropagator::new(3);
        propagator.absorb(&translated(1..=2));
        propagator.absorb(&translated(3..=4));

        assert_eq!(propagator.lines(), vec!["T2", "T3", "T4"]);
    }

    #[test]
    fn test_seeded_shouldUseTailOfResults() {
        let propagator = ContextPropagator::seeded(2, &translated(1..=10));
        assert_eq!(propagator.lines(), vec!["T9", "T10"]);
    }

    #[test]
    fn test_zeroSize_shouldCarryNothing() {
        let mut propagator = ContextPropagator::new(0);
        propagator.absorb(&translated(1..=3));
        assert!(propagator.lines().is_empty());
    }

    #[test]
    fn test_tailOf_shorterThanSize_shouldReturnAll() {
        assert_eq!(tail_of(&translated(1..=2), 3), vec!["T1", "T2"]);
        assert!(tail_of(&[], 3).is_empty());
    }
}
