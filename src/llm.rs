use ask_llm::{Client as LlmClient, Conversation, Model, Role};
use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use regex::Regex;
use serde_json::Value;

use crate::QuizItem;

/// Supplies one answer per quiz question, index-aligned. `None` leaves that question unanswered.
#[allow(async_fn_in_trait)]
pub trait AnswerProvider {
	async fn answers(&self, quiz: &[QuizItem]) -> Result<Vec<Option<String>>>;
}

/// Answers known up front
#[derive(Clone, Debug, Default, derive_new::new)]
pub struct StaticAnswers {
	answers: Vec<Option<String>>,
}

impl AnswerProvider for StaticAnswers {
	async fn answers(&self, _quiz: &[QuizItem]) -> Result<Vec<Option<String>>> {
		Ok(self.answers.clone())
	}
}

/// Asks the language model for the whole quiz in one round trip. No retries.
#[derive(Clone, Copy, Debug, Default)]
pub struct LlmAnswerProvider;

impl AnswerProvider for LlmAnswerProvider {
	async fn answers(&self, quiz: &[QuizItem]) -> Result<Vec<Option<String>>> {
		let quiz_json = serde_json::to_string_pretty(quiz)?;
		let prompt = format!(
			r#"You are a quiz solver. Analyze these quiz questions and provide the correct answer for each.

Quiz Questions:
{quiz_json}

Provide your response as a JSON array of correct answers, one for each question. Example: ["answer1", "answer2", "answer3"]
IMPORTANT: Return ONLY the JSON array, no other text."#
		);

		let mut conv = Conversation::new();
		conv.add(Role::User, prompt);

		let client = LlmClient::new().model(Model::Medium).max_tokens(1024);
		let response = client.conversation(&conv).await?;

		tracing::debug!("LLM raw response: {}", response.text);
		parse_answers(&response.text)
	}
}

/// Parse a reply expected to be a JSON array of answers, tolerating prose around it.
pub fn parse_answers(raw: &str) -> Result<Vec<Option<String>>> {
	let raw = raw.trim();
	let value: Value = match serde_json::from_str(raw) {
		Ok(value) => value,
		Err(_) => {
			let span = Regex::new(r"(?s)\[.*\]")?.find(raw).ok_or_else(|| eyre!("Could not parse AI response: '{raw}'"))?;
			serde_json::from_str(span.as_str()).map_err(|e| eyre!("Could not parse AI response: {e} - raw: '{raw}'"))?
		}
	};
	let Value::Array(items) = value else {
		bail!("Could not parse AI response: expected a JSON array - raw: '{raw}'");
	};

	items
		.into_iter()
		.map(|item| match item {
			Value::String(s) => Ok(Some(s)),
			Value::Number(n) => Ok(Some(n.to_string())),
			Value::Bool(b) => Ok(Some(b.to_string())),
			Value::Null => Ok(None),
			other => Err(eyre!("Could not parse AI response: unsupported answer {other}")),
		})
		.collect()
}
