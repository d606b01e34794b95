use color_eyre::Result;

use crate::{
	OptionKind, OptionNode, QuestionGroup, QuizItem,
	dom::{Document, NodeId},
};

/// How many matches a pattern needs before it wins
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Accept {
	AtLeastOne,
	/// More than one, fewer than twenty; rejects single stray matches and page chrome
	Plausible,
	/// Any count, zero included
	Any,
}

impl Accept {
	pub fn admits(self, count: usize) -> bool {
		match self {
			Accept::AtLeastOne => count >= 1,
			Accept::Plausible => count > 1 && count < 20,
			Accept::Any => true,
		}
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Pattern {
	pub css: &'static str,
	pub accept: Accept,
}

const fn at_least_one(css: &'static str) -> Pattern {
	Pattern { css, accept: Accept::AtLeastOne }
}

const fn plausible(css: &'static str) -> Pattern {
	Pattern { css, accept: Accept::Plausible }
}

pub const QUESTION_CASCADE: &[Pattern] = &[
	at_least_one(".question"),
	at_least_one(".quiz-question"),
	at_least_one("[data-question]"),
	at_least_one("h3"),
	at_least_one("h4"),
	at_least_one(".question-text"),
	at_least_one(".q-text"),
	at_least_one(".quiz-item"),
	at_least_one(r#"[role="group"]"#),
];

pub const OPTION_CASCADE: &[Pattern] = &[
	plausible(r#"input[type="radio"], input[type="checkbox"]"#),
	plausible("button.answer-option, button.option"),
	plausible(".answer-option, .option, .choice"),
	plausible(r#"[role="radio"], [role="checkbox"]"#),
	plausible("label"),
	plausible("li"),
	Pattern {
		css: "button, input, label, div[onclick]",
		accept: Accept::Any,
	},
];

/// Candidates for the `?`-suffix heuristic when no question pattern matches
const QUESTION_TEXT_CANDIDATES: &str = "p, div, h1, h2, h3, h4";

/// First pattern of `cascade` whose matches (within `scope`'s descendants, or the whole document) it accepts.
pub fn first_satisfying(doc: &Document, scope: Option<NodeId>, cascade: &[Pattern]) -> Result<Option<(Pattern, Vec<NodeId>)>> {
	for pattern in cascade {
		let found = match scope {
			Some(scope) => doc.query_within(scope, pattern.css)?,
			None => doc.query_all(pattern.css)?,
		};
		if pattern.accept.admits(found.len()) {
			return Ok(Some((*pattern, found)));
		}
	}
	Ok(None)
}

/// Question nodes in document order.
pub fn find_questions(doc: &Document) -> Result<Vec<NodeId>> {
	if let Some((pattern, found)) = first_satisfying(doc, None, QUESTION_CASCADE)? {
		tracing::debug!("Found {} questions using selector: {}", found.len(), pattern.css);
		return Ok(found);
	}

	let found: Vec<NodeId> = doc
		.query_all(QUESTION_TEXT_CANDIDATES)?
		.into_iter()
		.filter(|&node| {
			let text = doc.text_content(node);
			let text = text.trim();
			let len = text.chars().count();
			text.ends_with('?') && len > 10 && len < 500
		})
		.collect();
	if !found.is_empty() {
		tracing::debug!("Found {} questions by pattern matching", found.len());
	}
	Ok(found)
}

/// Option nodes for `question`, searched within its parent element.
pub fn find_options(doc: &Document, question: NodeId) -> Result<Vec<NodeId>> {
	let Some(container) = doc.parent_element(question) else {
		return Ok(Vec::new());
	};
	Ok(match first_satisfying(doc, Some(container), OPTION_CASCADE)? {
		Some((pattern, found)) => {
			tracing::debug!("Found {} options using: {}", found.len(), pattern.css);
			found
		}
		None => Vec::new(),
	})
}

/// First non-empty of inner text, text content and form value, trimmed.
pub fn option_text(doc: &Document, node: NodeId) -> String {
	let inner = doc.inner_text(node);
	if !inner.is_empty() {
		return inner.trim().to_string();
	}
	let content = doc.text_content(node);
	if !content.is_empty() {
		return content.trim().to_string();
	}
	doc.value(node).unwrap_or_default().trim().to_string()
}

pub fn option_kind(doc: &Document, node: NodeId) -> OptionKind {
	if doc.tag(node) != "input" {
		return OptionKind::GenericClickable;
	}
	match doc.input_type(node).as_deref() {
		Some("radio") => OptionKind::Radio,
		Some("checkbox") => OptionKind::Checkbox,
		_ => OptionKind::GenericClickable,
	}
}

pub fn option_nodes(doc: &Document, nodes: &[NodeId]) -> Vec<OptionNode> {
	nodes
		.iter()
		.map(|&node| OptionNode {
			node,
			text: option_text(doc, node),
			kind: option_kind(doc, node),
		})
		.collect()
}

/// Every question with its options, located afresh.
pub fn question_groups(doc: &Document) -> Result<Vec<QuestionGroup>> {
	find_questions(doc)?
		.into_iter()
		.map(|question| {
			let options = find_options(doc, question)?;
			Ok(QuestionGroup {
				question,
				question_text: doc.text_content(question).trim().to_string(),
				options: option_nodes(doc, &options),
			})
		})
		.collect()
}

/// Question and option texts, as handed to an answer provider.
pub fn quiz_items(doc: &Document) -> Result<Vec<QuizItem>> {
	Ok(question_groups(doc)?
		.into_iter()
		.map(|group| QuizItem::new(group.question_text, group.options.into_iter().map(|o| o.text).collect()))
		.collect())
}
