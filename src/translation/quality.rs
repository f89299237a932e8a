/*!
 * Post-translation quality gate.
 *
 * After a top-level window is fully resolved, the scheduler hands the source
 * units and their translations to a `QualityGate`. A report containing any
 * high-severity issue makes the scheduler re-run the window's backend output
 * once.
 *
 * `LintChecker` is the built-in gate:
 * - High: empty output, leftover protocol artefacts, absurd length ratios
 * - Medium: long lines passed through untranslated
 * - Low: suspicious but plausible length ratios
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt::{self, Debug};

use super::prompts::{PASSIVE_CONTEXT_END, PASSIVE_CONTEXT_MARKER};
use super::window::{TranslatedUnit, TranslationUnit};

/// JSON object fragments that should never survive into a translation
static PROTOCOL_ARTEFACT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\{\s*"(id|text)"\s*:"#).unwrap());

/// Issue severity, ordered from least to most serious
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// What a quality issue is about
#[derive(Debug, Clone, PartialEq)]
pub enum IssueKind {
    /// Non-empty source came back empty
    EmptyTranslation,
    /// Wire-format or prompt markers leaked into the text
    ProtocolArtefact,
    /// Translation length is out of proportion with the source
    LengthRatio { ratio: f64 },
    /// Translation is the source text verbatim
    Untranslated,
}

/// A single finding for one unit
#[derive(Debug, Clone, PartialEq)]
pub struct QualityIssue {
    /// Unit id
    pub id: u64,
    /// How serious the finding is
    pub severity: Severity,
    /// What was found
    pub kind: IssueKind,
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::EmptyTranslation => write!(f, "unit {}: empty translation", self.id),
            IssueKind::ProtocolArtefact => write!(f, "unit {}: protocol artefact in output", self.id),
            IssueKind::LengthRatio { ratio } => write!(f, "unit {}: length ratio {:.2}", self.id, ratio),
            IssueKind::Untranslated => write!(f, "unit {}: left untranslated", self.id),
        }
    }
}

/// Findings for one window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualityReport {
    pub issues: Vec<QualityIssue>,
}

impl QualityReport {
    /// Whether any finding is high severity
    pub fn has_high_severity(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::High)
    }

    /// Number of findings at exactly `severity`
    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    /// Whether nothing was found
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Inspects a translated window and reports issues
pub trait QualityGate: Send + Sync + Debug {
    /// Check `translations` against `sources`; both are in window order
    fn check(&self, sources: &[TranslationUnit], translations: &[TranslatedUnit]) -> QualityReport;
}

/// Heuristic lint over length, artefacts and pass-through text
#[derive(Debug, Clone)]
pub struct LintChecker {
    /// Ratio bounds outside which a finding is high severity
    pub hard_ratio: (f64, f64),
    /// Ratio bounds outside which a finding is low severity
    pub soft_ratio: (f64, f64),
    /// Sources shorter than this skip the hard ratio check
    pub min_ratio_source_chars: usize,
    /// Sources shorter than this may legitimately pass through untranslated
    pub min_untranslated_chars: usize,
}

impl Default for LintChecker {
    fn default() -> Self {
        Self {
            hard_ratio: (0.2, 5.0),
            soft_ratio: (0.5, 2.0),
            min_ratio_source_chars: 10,
            min_untranslated_chars: 20,
        }
    }
}

impl LintChecker {
    /// Create a checker with default thresholds
    pub fn new() -> Self {
        Self::default()
    }

    fn check_unit(&self, source: &str, translation: &str, id: u64, issues: &mut Vec<QualityIssue>) {
        let source_chars = source.trim().chars().count();
        let translation_chars = translation.trim().chars().count();

        if source_chars == 0 {
            return;
        }

        if translation_chars == 0 {
            issues.push(QualityIssue { id, severity: Severity::High, kind: IssueKind::EmptyTranslation });
            return;
        }

        if PROTOCOL_ARTEFACT.is_match(translation)
            || translation.contains(PASSIVE_CONTEXT_MARKER)
            || translation.contains(PASSIVE_CONTEXT_END)
        {
            issues.push(QualityIssue { id, severity: Severity::High, kind: IssueKind::ProtocolArtefact });
        }

        let ratio = translation_chars as f64 / source_chars as f64;
        let outside = |(min, max): (f64, f64)| ratio < min || ratio > max;
        if source_chars >= self.min_ratio_source_chars && outside(self.hard_ratio) {
            issues.push(QualityIssue { id, severity: Severity::High, kind: IssueKind::LengthRatio { ratio } });
        } else if outside(self.soft_ratio) {
            issues.push(QualityIssue { id, severity: Severity::Low, kind: IssueKind::LengthRatio { ratio } });
        }

        if source_chars >= self.min_untranslated_chars && source.trim() == translation.trim() {
            issues.push(QualityIssue { id, severity: Severity::Medium, kind: IssueKind::Untranslated });
        }
    }
}

impl QualityGate for LintChecker {
    fn check(&self, sources: &[TranslationUnit], translations: &[TranslatedUnit]) -> QualityReport {
        let by_id: HashMap<u64, &str> = translations
            .iter()
            .map(|t| (t.id, t.translated_text.as_str()))
            .collect();

        let mut issues = Vec::new();
        for source in sources {
            let translation = by_id.get(&source.id).copied().unwrap_or_default();
            self.check_unit(&source.text, translation, source.id, &mut issues);
        }

        if !issues.is_empty() {
            debug!(
                "Quality lint: {} high, {} medium, {} low",
                issues.iter().filter(|i| i.severity == Severity::High).count(),
                issues.iter().filter(|i| i.severity == Severity::Medium).count(),
                issues.iter().filter(|i| i.severity == Severity::Low).count()
            );
        }

        QualityReport { issues }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lint(source: &str, translation: &str) -> QualityReport {
        LintChecker::new().check(&[TranslationUnit::new(1, source)], &[TranslatedUnit::new(1, translation)])
    }

    #[test]
    fn test_check_goodTranslation_shouldBeClean() {
        assert!(lint("Where are you going?", "Où est-ce que tu vas ?").is_clean());
    }

    #[test]
    fn test_check_emptyTranslation_shouldBeHigh() {
        let report = lint("Where are you going?", "  ");
        assert!(report.has_high_severity());
        assert_eq!(report.issues[0].kind, IssueKind::EmptyTranslation);
    }

    #[test]
    fn test_check_missingTranslation_shouldCountAsEmpty() {
        let report = LintChecker::new().check(&[TranslationUnit::new(9, "Hello there")], &[]);
        assert_eq!(report.issues[0].id, 9);
        assert!(report.has_high_severity());
    }

    #[test]
    fn test_check_leakedJson_shouldBeHigh() {
        let report = lint("Good night, sweetheart.", r#"{"id": 4, "text": "Bonne nuit, chérie."}"#);
        assert!(report.issues.iter().any(|i| i.kind == IssueKind::ProtocolArtefact));
    }

    #[test]
    fn test_check_leakedContextMarker_shouldBeHigh() {
        let report = lint("Good night.", "<<CONTEXT_ONLY>> Bonne nuit.");
        assert!(report.issues.iter().any(|i| i.kind == IssueKind::ProtocolArtefact));
    }

    #[test]
    fn test_check_absurdRatio_shouldBeHigh() {
        let report = lint("I will be back before dawn.", "Oui.");
        assert!(report.has_high_severity());
    }

    #[test]
    fn test_check_shortSourceRatio_shouldOnlyBeLow() {
        let report = lint("Hi", "Bonjour, comment ça va");
        assert!(!report.has_high_severity());
        assert_eq!(report.count(Severity::Low), 1);
    }

    #[test]
    fn test_check_untranslatedLongLine_shouldBeMedium() {
        let line = "This sentence was never translated.";
        let report = lint(line, line);
        assert_eq!(report.count(Severity::Medium), 1);
        assert!(!report.has_high_severity());
    }

    #[test]
    fn test_check_untranslatedShortLine_shouldPass() {
        assert!(lint("OK", "OK").is_clean());
    }

    #[test]
    fn test_severity_shouldBeOrdered() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }
}
