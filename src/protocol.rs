use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
	config::AppConfig,
	dom::DomEvent,
	llm::AnswerProvider,
	page::PageBackend,
	selector::resolve,
	snapshot,
	solver::{self, AutoSolveOutcome},
};

pub const ACTIONS: &[&str] = &[
	"readPage",
	"click",
	"type",
	"extract",
	"scroll",
	"screenshot",
	"findByText",
	"getLinks",
	"getForms",
	"getAccessibilityTree",
	"analyzeQuiz",
	"solveQuiz",
	"autoSolveQuiz",
	"clickAnswer",
];

const DEFAULT_SCROLL_AMOUNT: i64 = 500;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
	Up,
	Down,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
	ReadPage,
	Click {
		selector: String,
	},
	Type {
		selector: String,
		text: String,
	},
	Extract {
		selector: String,
	},
	Scroll {
		direction: ScrollDirection,
		/// Pixels (default: 500)
		#[serde(default)]
		amount: Option<i64>,
	},
	/// Viewport metadata only; pixels are captured elsewhere
	Screenshot,
	FindByText {
		text: String,
	},
	GetLinks,
	GetForms,
	GetAccessibilityTree,
	AnalyzeQuiz,
	/// Answers stay raw JSON so that a bad entry fails like any other quiz error
	SolveQuiz {
		#[serde(default)]
		answers: Value,
	},
	AutoSolveQuiz,
	#[serde(rename_all = "camelCase")]
	ClickAnswer {
		question_index: usize,
		answer: String,
	},
}

impl Request {
	pub fn from_message(message: Value) -> Result<Self> {
		let Value::Object(mut map) = message else {
			bail!("Message must be a JSON object");
		};
		if let Some(Value::Object(params)) = map.remove("params") {
			for (key, value) in params {
				map.entry(key).or_insert(value);
			}
		}
		let action = map.get("action").and_then(Value::as_str).ok_or_else(|| eyre!("Message has no action"))?.to_string();
		if !ACTIONS.contains(&action.as_str()) {
			bail!("Unknown action: {action}");
		}
		serde_json::from_value(Value::Object(map)).map_err(|e| eyre!("Invalid {action} request: {e}"))
	}
}

/// Serves protocol messages against one page.
#[derive(Debug, derive_new::new)]
pub struct Agent<B, P> {
	page: B,
	provider: P,
	config: AppConfig,
}

impl<B: PageBackend, P: AnswerProvider> Agent<B, P> {
	pub fn page(&self) -> &B {
		&self.page
	}

	/// The dispatch boundary: always produces a response.
	pub async fn handle(&mut self, message: Value) -> Value {
		let response = match Request::from_message(message) {
			Ok(request) => self.dispatch(request).await,
			Err(e) => Err(e),
		};
		response.unwrap_or_else(|e| {
			tracing::warn!("Request failed: {e}");
			json!({ "error": e.to_string() })
		})
	}

	pub async fn dispatch(&mut self, request: Request) -> Result<Value> {
		tracing::debug!("Handling {:?}", request);
		match request {
			Request::ReadPage => {
				let doc = self.page.capture().await?;
				Ok(serde_json::to_value(snapshot::read_page(&doc))?)
			}
			Request::Click { selector } => {
				let mut doc = self.page.capture().await?;
				let Some(node) = resolve(&doc, &selector)? else {
					return Ok(json!({ "error": format!("Element not found: {selector}") }));
				};
				doc.click(node)?;
				self.page.apply(&doc.take_journal()).await?;
				Ok(json!({ "success": true, "clicked": selector }))
			}
			Request::Type { selector, text } => {
				let mut doc = self.page.capture().await?;
				let Some(node) = resolve(&doc, &selector)? else {
					return Ok(json!({ "error": format!("Element not found: {selector}") }));
				};
				doc.focus(node)?;
				doc.set_value(node, &text)?;
				doc.dispatch(node, DomEvent::Input)?;
				doc.dispatch(node, DomEvent::Change)?;
				self.page.apply(&doc.take_journal()).await?;
				Ok(json!({ "success": true, "typed": text }))
			}
			Request::Extract { selector } => {
				let doc = self.page.capture().await?;
				Ok(serde_json::to_value(snapshot::extract(&doc, &selector)?)?)
			}
			Request::Scroll { direction, amount } => {
				let amount = amount.unwrap_or(DEFAULT_SCROLL_AMOUNT);
				let dy = match direction {
					ScrollDirection::Down => amount,
					ScrollDirection::Up => -amount,
				};
				let mut doc = self.page.capture().await?;
				doc.scroll_by(dy)?;
				self.page.apply(&doc.take_journal()).await?;
				Ok(json!({ "success": true, "scrolled": direction }))
			}
			Request::Screenshot => {
				let doc = self.page.capture().await?;
				Ok(serde_json::to_value(snapshot::viewport(&doc))?)
			}
			Request::FindByText { text } => {
				let doc = self.page.capture().await?;
				Ok(serde_json::to_value(snapshot::find_by_text(&doc, &text))?)
			}
			Request::GetLinks => {
				let doc = self.page.capture().await?;
				Ok(serde_json::to_value(snapshot::links(&doc)?)?)
			}
			Request::GetForms => {
				let doc = self.page.capture().await?;
				Ok(serde_json::to_value(snapshot::forms(&doc)?)?)
			}
			Request::GetAccessibilityTree => {
				let doc = self.page.capture().await?;
				Ok(serde_json::to_value(snapshot::build_snapshot(&doc))?)
			}
			Request::AnalyzeQuiz => Ok(match solver::analyze_quiz(&self.page).await {
				Ok(quiz_data) => json!({ "success": true, "quizData": quiz_data }),
				Err(e) => quiz_failure(e),
			}),
			Request::SolveQuiz { answers } => {
				let solved = match answer_list(&answers) {
					Ok(answers) => solver::solve_quiz(&mut self.page, &answers, &self.config).await,
					Err(e) => Err(e),
				};
				Ok(match solved {
					Ok(report) => json!({ "success": true, "questionsAnswered": report.questions_answered }),
					Err(e) => quiz_failure(e),
				})
			}
			Request::AutoSolveQuiz => Ok(match solver::auto_solve_quiz(&mut self.page, &self.provider, &self.config).await {
				Ok(AutoSolveOutcome::Solved(report)) => json!({ "success": true, "questionsAnswered": report.questions_answered }),
				Ok(AutoSolveOutcome::NoQuestions) => json!({ "success": false, "error": "No questions found on page" }),
				Err(e) => quiz_failure(e),
			}),
			Request::ClickAnswer { question_index, answer } => Ok(match solver::click_answer(&mut self.page, question_index, &answer).await {
				Ok(Some(result)) => json!({ "success": result.matched }),
				Ok(None) => json!({ "success": false, "error": "Question not found" }),
				Err(e) => quiz_failure(e),
			}),
		}
	}
}

/// Every entry must be a string; nothing is touched otherwise.
fn answer_list(answers: &Value) -> Result<Vec<Option<String>>> {
	let Value::Array(items) = answers else {
		bail!("answers must be an array of strings, got {answers}");
	};
	items
		.iter()
		.enumerate()
		.map(|(i, item)| match item {
			Value::String(s) => Ok(Some(s.clone())),
			other => Err(eyre!("Answer {} is not a string: {other}", i + 1)),
		})
		.collect()
}

fn quiz_failure(e: color_eyre::Report) -> Value {
	tracing::warn!("Quiz action failed: {e}");
	json!({ "success": false, "error": e.to_string() })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn params_are_merged() {
		let request = Request::from_message(json!({ "action": "click", "params": { "selector": "#go" } })).unwrap();
		assert_eq!(request, Request::Click { selector: "#go".to_string() });

		let request = Request::from_message(json!({ "action": "clickAnswer", "questionIndex": 1, "answer": "Paris" })).unwrap();
		assert_eq!(
			request,
			Request::ClickAnswer {
				question_index: 1,
				answer: "Paris".to_string()
			}
		);
	}

	#[test]
	fn answers_must_all_be_strings() {
		assert_eq!(answer_list(&json!(["a", "b"])).unwrap(), vec![Some("a".to_string()), Some("b".to_string())]);
		assert_eq!(answer_list(&json!(["a", null])).unwrap_err().to_string(), "Answer 2 is not a string: null");
		assert!(answer_list(&json!([4])).is_err());
		assert!(answer_list(&Value::Null).is_err());
	}

	#[test]
	fn scroll_amount_is_optional() {
		let request = Request::from_message(json!({ "action": "scroll", "params": { "direction": "up" } })).unwrap();
		assert_eq!(
			request,
			Request::Scroll {
				direction: ScrollDirection::Up,
				amount: None
			}
		);
	}

	#[test]
	fn unknown_action() {
		let err = Request::from_message(json!({ "action": "dance" })).unwrap_err();
		assert_eq!(err.to_string(), "Unknown action: dance");
	}

	#[test]
	fn malformed_known_action() {
		let err = Request::from_message(json!({ "action": "type", "params": { "selector": "#q" } })).unwrap_err();
		assert!(err.to_string().starts_with("Invalid type request"));
		assert!(Request::from_message(json!(["readPage"])).is_err());
		assert!(Request::from_message(json!({ "params": {} })).is_err());
	}

	#[test]
	fn every_action_name_decodes() {
		let params = json!({
			"selector": "a", "text": "t", "direction": "down", "answers": [], "questionIndex": 0, "answer": "x"
		});
		for action in ACTIONS {
			let request = Request::from_message(json!({ "action": action, "params": params.clone() }));
			assert!(request.is_ok(), "{action}: {request:?}");
		}
	}
}
