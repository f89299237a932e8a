/*!
 * Units and fixed-size windows.
 *
 * A job's units are cut into consecutive windows of `window_size` units. The
 * last window may be shorter. Windows are the unit of checkpointing; the
 * split-retry protocol may halve them further but never reorders units.
 */

use serde::{Deserialize, Serialize};

use crate::providers::BatchItem;

/// One line of source text to translate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TranslationUnit {
    /// Stable identity, unique within a job
    pub id: u64,
    /// Source text
    pub text: String,
}

impl TranslationUnit {
    /// Create a new unit
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        Self { id, text: text.into() }
    }
}

impl From<&TranslationUnit> for BatchItem {
    fn from(unit: &TranslationUnit) -> Self {
        BatchItem::new(unit.id, unit.text.clone())
    }
}

/// One translated line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedUnit {
    /// Id of the source unit
    pub id: u64,
    /// Translation
    pub translated_text: String,
}

impl TranslatedUnit {
    /// Create a new translated unit
    pub fn new(id: u64, translated_text: impl Into<String>) -> Self {
        Self {
            id,
            translated_text: translated_text.into(),
        }
    }
}

/// A slice of a job sent through the split-retry protocol
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    /// Position of the top-level window in the job
    pub index: usize,
    /// Number of top-level windows in the job
    pub total_windows: usize,
    /// Units to translate, in order
    pub units: Vec<TranslationUnit>,
    /// Read-only prior output shown to the backend, never translated
    pub context_lines: Vec<String>,
}

impl Window {
    /// Number of units in the window
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the window holds no units
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Number of windows `unit_count` units fill
pub fn window_count(unit_count: usize, window_size: usize) -> usize {
    unit_count.div_ceil(window_size.max(1))
}

/// Cut units into consecutive windows
pub fn partition(units: &[TranslationUnit], window_size: usize, context_lines: usize) -> Vec<Window> {
    let window_size = window_size.max(1);
    let total_windows = window_count(units.len(), window_size);

    units
        .chunks(window_size)
        .enumerate()
        .map(|(index, chunk)| Window {
            index,
            total_windows,
            units: chunk.to_vec(),
            context_lines: Vec::with_capacity(context_lines),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(n: u64) -> Vec<TranslationUnit> {
        (1..=n).map(|i| TranslationUnit::new(i, format!("Line {}", i))).collect()
    }

    #[test]
    fn test_partition_shouldKeepOrderAndShortLastWindow() {
        let windows = partition(&units(45), 20, 3);

        assert_eq!(windows.len(), 3);
        assert_eq!(windows.iter().map(Window::len).collect::<Vec<_>>(), vec![20, 20, 5]);
        assert!(windows.iter().all(|w| w.total_windows == 3));
        assert_eq!(windows[2].index, 2);
        assert_eq!(windows[1].units[0].id, 21);
    }

    #[test]
    fn test_partition_empty_shouldYieldNoWindows() {
        assert!(partition(&[], 20, 3).is_empty());
        assert_eq!(window_count(0, 20), 0);
    }

    #[test]
    fn test_windowCount_zeroSize_shouldActAsOne() {
        assert_eq!(window_count(5, 0), 5);
    }
}
