use color_eyre::Result;

use crate::{
	MatchResult, MatchTier, OptionNode,
	dom::{Document, DomEvent, NodeId},
};

/// Answer words this short are too common to carry signal
const MIN_FUZZY_WORD_CHARS: usize = 3;

/// Pick the option best matching `answer`: exact, then substring either way, then word overlap.
///
/// Within a tier the first qualifying option wins, even if a later one would overlap more. An answer without a word
/// long enough to count needs zero overlapping words, so it falls through to the first option.
pub fn score<S: AsRef<str>>(option_texts: &[S], answer: &str) -> MatchResult {
	let answer = answer.to_lowercase();
	let texts: Vec<String> = option_texts.iter().map(|t| t.as_ref().trim().to_lowercase()).collect();

	if let Some(i) = texts.iter().position(|t| *t == answer) {
		return MatchResult::hit(MatchTier::Exact, i);
	}
	if let Some(i) = texts.iter().position(|t| t.contains(answer.as_str()) || answer.contains(t.as_str())) {
		return MatchResult::hit(MatchTier::Partial, i);
	}

	let words: Vec<&str> = answer.split_whitespace().filter(|w| w.chars().count() >= MIN_FUZZY_WORD_CHARS).collect();
	let threshold = words.len().div_ceil(2);
	match texts.iter().position(|t| words.iter().filter(|w| t.contains(**w)).count() >= threshold) {
		Some(i) => MatchResult::hit(MatchTier::Fuzzy, i),
		None => MatchResult::miss(),
	}
}

/// Score `options` against `answer` and activate the winner. A miss has no side effect.
pub fn select_answer(doc: &mut Document, options: &[OptionNode], answer: &str) -> Result<MatchResult> {
	let texts: Vec<&str> = options.iter().map(|o| o.text.as_str()).collect();
	let result = score(&texts, answer);
	if let Some(i) = result.option_index {
		tracing::debug!("{} match for \"{}\": clicking \"{}\"", result.tier, answer, options[i].text);
		activate(doc, options[i].node)?;
	}
	Ok(result)
}

/// Click the node both natively and through a dispatched event; checkable inputs are additionally forced on and
/// announce a `change`.
pub fn activate(doc: &mut Document, node: NodeId) -> Result<()> {
	doc.click(node)?;
	doc.dispatch(node, DomEvent::Click)?;
	if doc.is_checkable(node) {
		doc.set_checked(node, true)?;
		doc.dispatch(node, DomEvent::Change)?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{dom::Interaction, locate};

	#[test]
	fn exact_wins_over_partial() {
		let result = score(&["Paris", "Paris, France", "The capital of France is Paris"], "Paris");
		assert_eq!(result, MatchResult::hit(MatchTier::Exact, 0));
	}

	#[test]
	fn exact_is_case_insensitive_and_skips_earlier_partials() {
		let result = score(&["Paris, France", "paris"], "PARIS");
		assert_eq!(result, MatchResult::hit(MatchTier::Exact, 1));
	}

	#[test]
	fn partial_either_direction() {
		assert_eq!(score(&["London (UK)"], "London"), MatchResult::hit(MatchTier::Partial, 0));
		assert_eq!(score(&["Berlin", "Rome"], "The answer is Rome"), MatchResult::hit(MatchTier::Partial, 1));
	}

	#[test]
	fn fuzzy_threshold_rounds_up() {
		// 1 of 3 words present, 2 required
		assert_eq!(score(&["Blue whale lives in ocean"], "large ocean mammal"), MatchResult::miss());
		assert_eq!(
			score(&["Blue whale", "The largest ocean mammal"], "large ocean animal"),
			MatchResult::hit(MatchTier::Fuzzy, 1)
		);
	}

	#[test]
	fn fuzzy_ties_go_to_first_option() {
		// the second option overlaps on all three words, the first on two
		let result = score(&["green apple", "green apple pie"], "apple pie green");
		assert_eq!(result, MatchResult::hit(MatchTier::Fuzzy, 0));
	}

	#[test]
	fn short_words_do_not_count() {
		assert_eq!(score(&["be or", "ocean liner"], "to be an ocean whale"), MatchResult::hit(MatchTier::Fuzzy, 1));
	}

	#[test]
	fn answer_without_long_words_takes_first_option() {
		assert_eq!(score(&["xyz", "Lyon"], "a"), MatchResult::hit(MatchTier::Fuzzy, 0));
		assert_eq!(score(&["Paris", "Lyon"], "it is"), MatchResult::hit(MatchTier::Fuzzy, 0));
	}

	#[test]
	fn empty_option_text_is_contained_in_any_answer() {
		assert_eq!(score(&["", "Lyon"], "Paris"), MatchResult::hit(MatchTier::Partial, 0));
		assert_eq!(score(&["Lyon", "  "], "Paris"), MatchResult::hit(MatchTier::Partial, 1));
	}

	#[test]
	fn blank_answer_hits_the_first_option() {
		assert_eq!(score(&["anything", "Lyon"], ""), MatchResult::hit(MatchTier::Partial, 0));
		// an empty option still wins the exact tier first
		assert_eq!(score(&["Lyon", ""], ""), MatchResult::hit(MatchTier::Exact, 1));
		assert_eq!(score(&["Lyon", "Paris"], "   "), MatchResult::hit(MatchTier::Fuzzy, 0));
	}

	#[test]
	fn no_options_no_match() {
		assert_eq!(score::<&str>(&[], "Paris"), MatchResult::miss());
		assert_eq!(score::<&str>(&[], ""), MatchResult::miss());
	}

	#[test]
	fn radio_activation_sequence() {
		let mut doc = Document::parse(
			"https://quiz.test/",
			r#"<html><body><div><h3>Capital?</h3><label><input type="radio" name="q">Paris</label><label><input type="radio" name="q">Lyon</label></div></body></html>"#,
		);
		let question = locate::find_questions(&doc).unwrap()[0];
		let nodes = locate::find_options(&doc, question).unwrap();
		let mut options = locate::option_nodes(&doc, &nodes);
		options[0].text = "Lyon".to_string();
		options[1].text = "Paris".to_string();

		let result = select_answer(&mut doc, &options, "paris").unwrap();
		assert_eq!(result, MatchResult::hit(MatchTier::Exact, 1));
		assert!(doc.is_checked(nodes[1]));
		assert!(!doc.is_checked(nodes[0]));

		let ops: Vec<&str> = doc
			.journal()
			.iter()
			.map(|op| match op {
				Interaction::Activate { .. } => "activate",
				Interaction::Dispatch { event: DomEvent::Click, .. } => "click",
				Interaction::SetChecked { .. } => "checked",
				Interaction::Dispatch { event: DomEvent::Change, .. } => "change",
				_ => "other",
			})
			.collect();
		assert_eq!(ops, vec!["activate", "click", "checked", "change"]);
	}

	#[test]
	fn checkbox_ends_checked_despite_double_click() {
		let mut doc = Document::parse("https://quiz.test/", r#"<html><body><input type="checkbox" id="c"></body></html>"#);
		let c = doc.element_by_id("c").unwrap();
		activate(&mut doc, c).unwrap();
		assert!(doc.is_checked(c));
	}

	#[test]
	fn miss_has_no_side_effect() {
		let mut doc = Document::parse("https://quiz.test/", "<html><body><button>Yes</button><button>No</button></body></html>");
		let nodes = doc.query_all("button").unwrap();
		let options = locate::option_nodes(&doc, &nodes);
		let result = select_answer(&mut doc, &options, "Maybe").unwrap();
		assert!(!result.matched);
		assert!(doc.journal().is_empty());
	}

	#[test]
	fn generic_clickable_gets_two_clicks_only() {
		let mut doc = Document::parse("https://quiz.test/", "<html><body><button>Yes</button></body></html>");
		let button = doc.query_first("button").unwrap().unwrap();
		activate(&mut doc, button).unwrap();
		assert_eq!(doc.journal().len(), 2);
	}
}
