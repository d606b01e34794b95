use std::path::PathBuf;

use chromiumoxide::browser::{Browser, BrowserConfig};
use clap::{Parser, Subcommand};
use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use futures::StreamExt;
use page_pilot::{
	config::{AppConfig, SettingsFlags},
	dom::{Document, Viewport},
	llm::{AnswerProvider, LlmAnswerProvider, parse_answers},
	page::{ChromePage, PageBackend, StaticPage},
	protocol::Agent,
	solver,
};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;
use v_utils::{elog, log};

#[derive(Debug, Parser)]
#[command(name = "page_pilot")]
#[command(about = "Inspect web pages and answer the quizzes on them", long_about = None)]
struct Args {
	/// Page to open in the browser
	#[arg(short, long, required_unless_present = "html", conflicts_with = "html")]
	url: Option<String>,

	/// Work on a local HTML file instead of a browser tab
	#[arg(long)]
	html: Option<PathBuf>,

	#[command(flatten)]
	settings: SettingsFlags,

	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Read JSON requests from stdin, one per line, and answer each on stdout
	Serve,
	/// Handle a single JSON request
	Call { message: String },
	/// Answer the page's quiz, asking the language model unless answers are given
	Solve {
		/// JSON array of answers, index-aligned with the questions
		#[arg(short, long)]
		answers: Option<String>,
	},
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	// stdout carries protocol responses
	tracing_subscriber::fmt()
		.with_writer(std::io::stderr)
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();
	let args = Args::parse();

	let config = AppConfig::try_build(args.settings)?;

	match (args.url, args.html) {
		(_, Some(path)) => {
			let html = std::fs::read_to_string(&path).map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;
			let url = std::fs::canonicalize(&path)
				.ok()
				.and_then(|p| url::Url::from_file_path(p).ok())
				.map(|u| u.to_string())
				.unwrap_or_default();
			let viewport = Viewport {
				width: config.viewport_width,
				height: config.viewport_height,
				..Default::default()
			};
			let page = StaticPage::new(Document::parse(url, &html).with_viewport(viewport));
			run(page, config, args.command).await
		}
		(Some(url), None) => {
			let browser_config = if config.visible {
				BrowserConfig::builder()
					.with_head()
					.build()
					.map_err(|e| eyre!("Failed to build browser config: {}", e))?
			} else {
				BrowserConfig::builder().build().map_err(|e| eyre!("Failed to build browser config: {}", e))?
			};

			let (mut browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| eyre!("Failed to launch browser: {}", e))?;
			let handle = tokio::spawn(async move { while let Some(_event) = handler.next().await {} });

			let tab = browser.new_page("about:blank").await.map_err(|e| eyre!("Failed to create new page: {}", e))?;
			let page = ChromePage::new(tab);
			page.goto(&url).await?;
			tracing::info!("Opened {url}");

			let result = run(page, config, args.command).await;

			browser.close().await.map_err(|e| eyre!("Failed to close browser: {}", e))?;
			drop(browser);
			handle.abort();
			result
		}
		(None, None) => bail!("Either --url or --html is required"),
	}
}

async fn run<B: PageBackend>(page: B, config: AppConfig, command: Command) -> Result<()> {
	match command {
		Command::Serve => serve(Agent::new(page, LlmAnswerProvider, config)).await,
		Command::Call { message } => {
			let message: Value = serde_json::from_str(&message).map_err(|e| eyre!("Failed to parse request: {}", e))?;
			let mut agent = Agent::new(page, LlmAnswerProvider, config);
			println!("{}", agent.handle(message).await);
			Ok(())
		}
		Command::Solve { answers } => solve(page, config, answers).await,
	}
}

async fn serve<B: PageBackend, P: AnswerProvider>(mut agent: Agent<B, P>) -> Result<()> {
	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	let mut stdout = tokio::io::stdout();
	while let Some(line) = lines.next_line().await? {
		if line.trim().is_empty() {
			continue;
		}
		let response = match serde_json::from_str::<Value>(&line) {
			Ok(message) => agent.handle(message).await,
			Err(e) => json!({ "error": format!("Invalid JSON: {e}") }),
		};
		stdout.write_all(format!("{response}\n").as_bytes()).await?;
		stdout.flush().await?;
	}
	Ok(())
}

async fn solve<B: PageBackend>(mut page: B, config: AppConfig, answers: Option<String>) -> Result<()> {
	let items = solver::analyze_quiz(&page).await?;
	if items.is_empty() {
		elog!("No questions found on page");
		return Ok(());
	}
	for (i, item) in items.iter().enumerate() {
		println!("Q{}: {}", i + 1, item);
	}

	let answers = match answers {
		Some(raw) => parse_answers(&raw)?,
		None => {
			log!("Asking LLM for {} answers...", items.len());
			LlmAnswerProvider.answers(&items).await?
		}
	};

	let report = solver::solve_quiz(&mut page, &answers, &config).await?;
	log!("Matched {}/{} questions{}", report.matched, report.questions_answered, if report.submitted { ", submitted" } else { "" });
	Ok(())
}
