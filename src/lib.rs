use std::fmt;

use serde::{Deserialize, Serialize};

pub mod config;
pub mod dom;
pub mod llm;
pub mod locate;
pub mod matcher;
pub mod page;
pub mod protocol;
pub mod selector;
pub mod snapshot;
pub mod solver;

use dom::NodeId;

/// One interactive or labelled element of the page, as handed to the reasoning agent
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
	/// Locator that re-resolves to this element; the only durable handle
	pub selector: String,
	/// `role` attribute, or the lowercased tag name
	pub role: String,
	/// Accessible name if present, else the first 50 characters of the trimmed text
	pub label: String,
	pub aria_label: String,
	pub is_clickable: bool,
	pub is_input: bool,
	/// The element's `type` property (null for elements that have none)
	pub input_type: Option<String>,
	pub visible: bool,
}

/// How an option reacts to activation
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptionKind {
	Radio,
	Checkbox,
	GenericClickable,
}

/// A selectable candidate for a question
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OptionNode {
	pub node: NodeId,
	/// First non-empty of inner text, text content, form value; trimmed
	pub text: String,
	pub kind: OptionKind,
}

/// A located question paired with the options found around it.
///
/// Built fresh for every pass: the page may rewrite itself after each answer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QuestionGroup {
	pub question: NodeId,
	pub question_text: String,
	pub options: Vec<OptionNode>,
}

/// Which matching tier produced a hit
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
	Exact,
	Partial,
	Fuzzy,
	None,
}

impl fmt::Display for MatchTier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			MatchTier::Exact => "exact",
			MatchTier::Partial => "partial",
			MatchTier::Fuzzy => "fuzzy",
			MatchTier::None => "none",
		};
		f.write_str(s)
	}
}

/// Outcome of matching one answer against a question's options
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
	pub matched: bool,
	pub tier: MatchTier,
	pub option_index: Option<usize>,
}

impl MatchResult {
	pub fn hit(tier: MatchTier, option_index: usize) -> Self {
		Self {
			matched: true,
			tier,
			option_index: Some(option_index),
		}
	}

	pub fn miss() -> Self {
		Self {
			matched: false,
			tier: MatchTier::None,
			option_index: None,
		}
	}
}

/// Question text plus option texts, the shape sent to the answer provider
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, derive_new::new)]
pub struct QuizItem {
	pub question: String,
	pub options: Vec<String>,
}

impl fmt::Display for QuizItem {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "{}", self.question)?;
		if self.options.is_empty() {
			writeln!(f, "  (no options found)")?;
		}
		for (i, option) in self.options.iter().enumerate() {
			writeln!(f, "( ) {}. {}", i + 1, option)?;
		}
		Ok(())
	}
}

/// Truncate to at most `max` characters
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
	match s.char_indices().nth(max) {
		Some((idx, _)) => s[..idx].to_string(),
		None => s.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn quiz_item_display_numbers_options() {
		let item = QuizItem::new("Capital of France?".to_string(), vec!["Paris".to_string(), "Lyon".to_string()]);
		assert_eq!(item.to_string(), "Capital of France?\n( ) 1. Paris\n( ) 2. Lyon\n");
	}

	#[test]
	fn truncate_respects_char_boundaries() {
		assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
		assert_eq!(truncate_chars("short", 50), "short");
	}

	#[test]
	fn match_result_serializes_camel_case() {
		let v = serde_json::to_value(MatchResult::hit(MatchTier::Partial, 2)).unwrap();
		assert_eq!(v, serde_json::json!({"matched": true, "tier": "partial", "optionIndex": 2}));
	}
}
