/*!
 * Prompt templates for batch translation.
 *
 * A system prompt is rendered from a template with three placeholders
 * (`{source_language}`, `{target_language}`, `{glossary}`) followed by an
 * optional passive context block holding prior output the backend must not
 * translate.
 */

use std::collections::BTreeMap;

use crate::language_utils::LanguagePair;

/// Opening marker of the passive context block
pub const PASSIVE_CONTEXT_MARKER: &str = "<<CONTEXT_ONLY>>";

/// Closing marker of the passive context block
pub const PASSIVE_CONTEXT_END: &str = "<<END_CONTEXT>>";

/// System prompt template for subtitle batch translation
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    /// The template string with placeholders
    template: String,
}

impl PromptTemplate {
    /// The default system prompt
    pub const DEFAULT: &'static str = r#"You are an expert subtitle translator working from {source_language} to {target_language}.

## Input
The user message is a JSON array of objects with an "id" and a "text" field.

## Output Requirements
- Return ONLY a JSON array with exactly one object per input object
- Keep every "id" unchanged and put the translation in "text"
- Do not merge, split, drop or reorder entries
- Do not include any text outside the JSON array

## Style
- Natural, idiomatic {target_language} that fits on screen
- Preserve formatting tags, [sound effects] and (parentheticals)
- Never translate character names unless the glossary says so

## Glossary
{glossary}"#;

    /// Create a new prompt template
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Raw template text
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Render the template for a language pair and glossary
    pub fn render(&self, pair: &LanguagePair, glossary: &BTreeMap<String, String>) -> String {
        self.template
            .replace("{source_language}", &pair.source_name())
            .replace("{target_language}", &pair.target_name())
            .replace("{glossary}", &render_glossary(glossary))
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

/// Builds the full system prompt for one backend request
#[derive(Debug, Clone)]
pub struct SystemPromptBuilder {
    base: String,
}

impl SystemPromptBuilder {
    /// Pre-render the parts that stay constant for a whole job
    pub fn new(template: &PromptTemplate, pair: &LanguagePair, glossary: &BTreeMap<String, String>) -> Self {
        Self {
            base: template.render(pair, glossary),
        }
    }

    /// System prompt with the given passive context appended
    pub fn build(&self, context_lines: &[String]) -> String {
        if context_lines.is_empty() {
            return self.base.clone();
        }

        let mut prompt = self.base.clone();
        prompt.push_str("\n\n## Passive context\n");
        prompt.push_str("The lines below were already translated and come right before this batch. ");
        prompt.push_str("Use them only to keep tone and terminology consistent. Do NOT translate or repeat them.\n");
        prompt.push_str(PASSIVE_CONTEXT_MARKER);
        prompt.push('\n');
        for line in context_lines {
            prompt.push_str(line);
            prompt.push('\n');
        }
        prompt.push_str(PASSIVE_CONTEXT_END);
        prompt
    }
}

fn render_glossary(glossary: &BTreeMap<String, String>) -> String {
    if glossary.is_empty() {
        return "(none)".to_string();
    }
    glossary
        .iter()
        .map(|(term, translation)| format!("- {} => {}", term, translation))
        .collect::<Vec<_>>()
        .join("\n")
}
