use std::time::Duration;

use color_eyre::{Result, eyre::eyre};
use serde::{Deserialize, Serialize};
use v_utils::xdg_state_dir;

use crate::{
	MatchResult, QuizItem,
	config::AppConfig,
	dom::Document,
	llm::AnswerProvider,
	locate::{find_options, find_questions, option_nodes, quiz_items},
	matcher::select_answer,
	page::PageBackend,
	selector::{resolve, structural_path},
};

pub const SUBMIT_SELECTOR: &str = r#"button[type="submit"], .submit-btn, input[type="submit"]"#;

/// When the next question may be looked at, after one has been answered
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SettlePolicy {
	Immediate,
	/// Plain timeout. Slow pages may not have rendered the next question yet.
	Fixed(Duration),
}

impl SettlePolicy {
	pub fn from_config(config: &AppConfig) -> Self {
		match config.settle_delay() {
			Duration::ZERO => SettlePolicy::Immediate,
			delay => SettlePolicy::Fixed(delay),
		}
	}

	pub async fn settle(&self) {
		if let SettlePolicy::Fixed(delay) = self {
			tokio::time::sleep(*delay).await;
		}
	}
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveReport {
	/// Questions iterated, answered or not
	pub questions_answered: usize,
	/// Questions where an option was actually selected
	pub matched: usize,
	pub submitted: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AutoSolveOutcome {
	NoQuestions,
	Solved(SolveReport),
}

/// Answer every question on the page with the index-aligned entry of `answers`.
///
/// Surplus answers are ignored; questions without an answer, or with a `None` one, are skipped. A question whose
/// options match nothing is logged and the pass moves on.
///
/// Every question after the first is re-found on a fresh capture by the structural path it had in the first one, so
/// pages that swap in content while settling are followed.
pub async fn solve_quiz<B: PageBackend>(page: &mut B, answers: &[Option<String>], config: &AppConfig) -> Result<SolveReport> {
	let mut doc = capture(page, config).await?;
	let questions = find_questions(&doc)?;
	let paths: Vec<String> = questions.iter().filter_map(|&q| structural_path(&doc, q)).collect();
	tracing::info!("Found {} questions", paths.len());
	if answers.len() != paths.len() {
		tracing::warn!("Got {} answers for {} questions", answers.len(), paths.len());
	}

	let settle = SettlePolicy::from_config(config);
	let mut report = SolveReport {
		questions_answered: paths.len(),
		..Default::default()
	};

	for (i, path) in paths.iter().enumerate() {
		let answer = match answers.get(i) {
			Some(Some(answer)) => answer,
			Some(None) => {
				tracing::info!("Q{}: left unanswered", i + 1);
				continue;
			}
			None => {
				tracing::warn!("Q{}: no answer supplied, skipping", i + 1);
				continue;
			}
		};
		if i > 0 {
			doc = capture(page, config).await?;
		}
		let Some(question) = resolve(&doc, path)? else {
			tracing::warn!("Q{}: question at {} is gone, skipping", i + 1, path);
			continue;
		};

		let options = option_nodes(&doc, &find_options(&doc, question)?);
		let result = select_answer(&mut doc, &options, answer)?;
		if result.matched {
			report.matched += 1;
			tracing::info!("Q{}: Selected \"{}\" ({} match)", i + 1, answer, result.tier);
		} else {
			tracing::warn!("Q{}: Could not find \"{}\" among {} options", i + 1, answer, options.len());
		}
		page.apply(&doc.take_journal()).await?;

		settle.settle().await;
	}

	if config.submit_after_solve {
		let mut doc = page.capture().await?;
		if let Some(submit) = doc.query_first(SUBMIT_SELECTOR)? {
			doc.click(submit)?;
			page.apply(&doc.take_journal()).await?;
			report.submitted = true;
			tracing::info!("Quiz submitted");
		}
	}

	Ok(report)
}

/// Question and option texts, without touching the page.
pub async fn analyze_quiz<B: PageBackend>(page: &B) -> Result<Vec<QuizItem>> {
	let doc = page.capture().await?;
	quiz_items(&doc)
}

/// Match `answer` against the options of question `index`. `None` when there is no such question.
pub async fn click_answer<B: PageBackend>(page: &mut B, index: usize, answer: &str) -> Result<Option<MatchResult>> {
	let mut doc = page.capture().await?;
	let Some(&question) = find_questions(&doc)?.get(index) else {
		return Ok(None);
	};
	let options = option_nodes(&doc, &find_options(&doc, question)?);
	let result = select_answer(&mut doc, &options, answer)?;
	page.apply(&doc.take_journal()).await?;
	Ok(Some(result))
}

/// Extract the quiz, wait for every answer, then solve. No option is touched before all answers are in.
pub async fn auto_solve_quiz<B: PageBackend, P: AnswerProvider>(page: &mut B, provider: &P, config: &AppConfig) -> Result<AutoSolveOutcome> {
	let items = analyze_quiz(page).await?;
	if items.is_empty() {
		return Ok(AutoSolveOutcome::NoQuestions);
	}
	tracing::info!("Found {} questions, asking for answers", items.len());
	let answers = provider.answers(&items).await?;
	tracing::debug!("Got answers: {:?}", answers);
	Ok(AutoSolveOutcome::Solved(solve_quiz(page, &answers, config).await?))
}

async fn capture<B: PageBackend>(page: &B, config: &AppConfig) -> Result<Document> {
	let doc = page.capture().await?;
	if let Err(e) = persist_html(&doc, config) {
		tracing::warn!("{e}");
	}
	Ok(doc)
}

fn persist_html(doc: &Document, config: &AppConfig) -> Result<()> {
	if !config.persist_html {
		return Ok(());
	}
	let dir = xdg_state_dir!("persist_htmls");

	let label = doc.url().replace("https://", "").replace("http://", "");
	let safe_label: String = label.chars().map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect();
	let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S%.3f");
	let path = dir.join(format!("{timestamp}_{safe_label}.html"));

	std::fs::write(&path, doc.outer_html()).map_err(|e| eyre!("Failed to write HTML file: {}", e))?;
	tracing::debug!("Saved page HTML to: {}", path.display());
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		MatchTier,
		dom::{Capture, Interaction, LiveFacts, Viewport},
		llm::StaticAnswers,
		page::StaticPage,
	};

	const QUIZ: &str = r#"<html><body>
		<div><h3>Capital of France?</h3><button class="option">Paris</button><button class="option">Lyon</button></div>
		<div><h3>2 + 2?</h3><button class="option">3</button><button class="option">4</button></div>
		<div><h3>Largest ocean?</h3><button class="option">Atlantic</button><button class="option">Pacific Ocean</button></div>
	</body></html>"#;

	fn page(html: &str) -> StaticPage {
		StaticPage::new(Document::parse("https://quiz.test/", html))
	}

	fn config() -> AppConfig {
		AppConfig {
			submit_after_solve: false,
			..Default::default()
		}
	}

	fn answers(a: &[&str]) -> Vec<Option<String>> {
		a.iter().map(|s| Some(s.to_string())).collect()
	}

	fn activations(page: &StaticPage) -> Vec<&str> {
		page.applied()
			.iter()
			.filter_map(|op| match op {
				Interaction::Activate { path } => Some(path.as_str()),
				_ => None,
			})
			.collect()
	}

	#[tokio::test(start_paused = true)]
	async fn fewer_answers_than_questions() {
		let mut page = page(QUIZ);
		let start = tokio::time::Instant::now();
		let report = solve_quiz(&mut page, &answers(&["Paris", "4"]), &config()).await.unwrap();

		assert_eq!(report.questions_answered, 3);
		assert_eq!(report.matched, 2);
		assert_eq!(activations(&page), vec!["/html/body/div[1]/button[1]", "/html/body/div[2]/button[2]"]);
		// one settle per answered question
		assert!(start.elapsed() >= Duration::from_millis(3000));
	}

	#[tokio::test(start_paused = true)]
	async fn surplus_answers_are_ignored() {
		let mut page = page(QUIZ);
		let report = solve_quiz(&mut page, &answers(&["Paris", "4", "pacific", "extra"]), &config()).await.unwrap();
		assert_eq!(report.questions_answered, 3);
		assert_eq!(report.matched, 3);
		assert_eq!(activations(&page).len(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn no_match_does_not_stop_the_pass() {
		let mut page = page(QUIZ);
		let report = solve_quiz(&mut page, &answers(&["Berlin", "4", "Pacific"]), &config()).await.unwrap();
		assert_eq!(report.questions_answered, 3);
		assert_eq!(report.matched, 2);
		assert_eq!(activations(&page), vec!["/html/body/div[2]/button[2]", "/html/body/div[3]/button[2]"]);
	}

	#[tokio::test(start_paused = true)]
	async fn unanswered_questions_are_skipped() {
		let mut page = page(QUIZ);
		let report = solve_quiz(&mut page, &[Some("Paris".to_string()), None, Some("pacific".to_string())], &config()).await.unwrap();
		assert_eq!(report.questions_answered, 3);
		assert_eq!(report.matched, 2);
		assert_eq!(activations(&page), vec!["/html/body/div[1]/button[1]", "/html/body/div[3]/button[2]"]);
	}

	#[tokio::test]
	async fn submits_when_enabled() {
		let html = r#"<html><body><form><div><h3>Pick?</h3><label><input type="radio" name="q" value="yes">Yes</label><label><input type="radio" name="q" value="no">No</label></div>
			<button type="submit">Send</button></form></body></html>"#;
		let mut page = page(html);
		let config = AppConfig {
			settle_delay_ms: 0,
			..Default::default()
		};
		let report = solve_quiz(&mut page, &answers(&["no"]), &config).await.unwrap();
		assert!(report.submitted);
		assert_eq!(activations(&page).last().copied(), Some("/html/body/form[1]/button[1]"));

		let radios = page.document().query_all("input").unwrap();
		assert!(page.document().is_checked(radios[1]));
	}

	#[tokio::test]
	async fn misaligned_capture_fails_without_touching_the_page() {
		let tags = ["html", "head", "body", "p", "div", "h3", "button", "button"];
		let capture = Capture {
			url: "https://quiz.test/".to_string(),
			title: String::new(),
			html: r#"<html><head></head><body><p><div><h3>Pick one?</h3><button class="option">A</button><button class="option">B</button></div></p></body></html>"#.to_string(),
			facts: tags.iter().map(|t| LiveFacts { tag: t.to_string(), ..Default::default() }).collect(),
			viewport: Viewport::default(),
		};
		let mut page = StaticPage::new(Document::from_capture(capture));
		assert!(solve_quiz(&mut page, &answers(&["A"]), &config()).await.is_err());
		assert!(page.applied().is_empty());
	}

	#[tokio::test]
	async fn click_answer_out_of_range() {
		let mut page = page(QUIZ);
		assert_eq!(click_answer(&mut page, 3, "Paris").await.unwrap(), None);
		let hit = click_answer(&mut page, 2, "pacific").await.unwrap().unwrap();
		assert_eq!(hit, MatchResult::hit(MatchTier::Partial, 1));
	}

	#[tokio::test(start_paused = true)]
	async fn auto_solve_composes_extraction_and_answers() {
		let mut page = page(QUIZ);
		let provider = StaticAnswers::new(answers(&["Lyon", "3", "Atlantic"]));
		let outcome = auto_solve_quiz(&mut page, &provider, &config()).await.unwrap();
		let AutoSolveOutcome::Solved(report) = outcome else {
			panic!("expected a solve, got {outcome:?}");
		};
		assert_eq!(report.matched, 3);

		let mut empty = self::page("<html><body><p>Welcome</p></body></html>");
		assert_eq!(auto_solve_quiz(&mut empty, &provider, &config()).await.unwrap(), AutoSolveOutcome::NoQuestions);
	}

	#[test]
	fn settle_policy_from_config() {
		assert_eq!(SettlePolicy::from_config(&AppConfig::default()), SettlePolicy::Fixed(Duration::from_millis(1500)));
		let immediate = AppConfig {
			settle_delay_ms: 0,
			..Default::default()
		};
		assert_eq!(SettlePolicy::from_config(&immediate), SettlePolicy::Immediate);
	}
}
