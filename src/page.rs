use chromiumoxide::Page;
use color_eyre::{
	Result,
	eyre::{bail, eyre},
};

use crate::dom::{Capture, Document, Interaction};

#[allow(async_fn_in_trait)]
pub trait PageBackend {
	/// Current state of the page
	async fn capture(&self) -> Result<Document>;
	/// Replay interactions in order. Fails on the first target that no longer resolves.
	async fn apply(&mut self, ops: &[Interaction]) -> Result<()>;
}

/// Serializes the live document together with what only the browser knows about each element.
const CAPTURE_JS: &str = r#"
	(function() {
		const facts = Array.from(document.querySelectorAll('*')).map(el => {
			const style = window.getComputedStyle(el);
			return {
				tag: el.localName,
				visible: el.offsetParent !== null && style.display !== 'none' && style.visibility !== 'hidden',
				hasClickHandler: el.onclick !== null && el.onclick !== undefined,
				innerText: typeof el.innerText === 'string' ? el.innerText : '',
				value: typeof el.value === 'string' ? el.value : null,
				checked: typeof el.checked === 'boolean' ? el.checked : null
			};
		});
		return JSON.stringify({
			url: window.location.href,
			title: document.title,
			html: document.documentElement.outerHTML,
			facts: facts,
			viewport: {
				width: window.innerWidth,
				height: window.innerHeight,
				scrollX: Math.round(window.scrollX),
				scrollY: Math.round(window.scrollY)
			}
		});
	})()
"#;

/// Called with the serialized interaction list.
const APPLY_JS: &str = r#"
	(function(ops) {
		const resolve = path => document.evaluate(path, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
		const click = () => new MouseEvent('click', {bubbles: true, cancelable: true});
		for (const op of ops) {
			if (op.op === 'scrollBy') {
				window.scrollBy({top: op.dy, behavior: 'smooth'});
				continue;
			}
			const el = resolve(op.path);
			if (!el) {
				return JSON.stringify({error: `Element not found: ${op.path}`});
			}
			switch (op.op) {
				case 'activate':
					if (typeof el.click === 'function') el.click(); else el.dispatchEvent(click());
					break;
				case 'dispatch':
					el.dispatchEvent(op.event === 'click' ? click() : new Event(op.event, {bubbles: true}));
					break;
				case 'focus':
					el.focus();
					break;
				case 'setValue':
					el.value = op.value;
					break;
				case 'setChecked':
					el.checked = op.checked;
					break;
			}
		}
		return JSON.stringify({applied: ops.length});
	})
"#;

/// A live browser tab
#[derive(Clone, Debug, derive_new::new)]
pub struct ChromePage {
	page: Page,
}

impl ChromePage {
	pub async fn goto(&self, url: &str) -> Result<()> {
		self.page.goto(url).await.map_err(|e| eyre!("Failed to navigate to {url}: {}", e))?;
		self.page.wait_for_navigation().await.map_err(|e| eyre!("Failed to wait for navigation: {}", e))?;
		Ok(())
	}

	async fn evaluate_json(&self, script: String, what: &str) -> Result<serde_json::Value> {
		let result = self.page.evaluate(script).await.map_err(|e| eyre!("Failed to {what}: {}", e))?;
		let json_str = result.value().and_then(|v| v.as_str()).ok_or_else(|| eyre!("Failed to {what}: browser returned null"))?;
		serde_json::from_str(json_str).map_err(|e| eyre!("Failed to parse {what} result: {}", e))
	}
}

impl PageBackend for ChromePage {
	async fn capture(&self) -> Result<Document> {
		let value = self.evaluate_json(CAPTURE_JS.to_string(), "capture page").await?;
		let capture: Capture = serde_json::from_value(value).map_err(|e| eyre!("Malformed page capture: {}", e))?;
		tracing::debug!("Captured {} ({} elements)", capture.url, capture.facts.len());
		Ok(Document::from_capture(capture))
	}

	async fn apply(&mut self, ops: &[Interaction]) -> Result<()> {
		if ops.is_empty() {
			return Ok(());
		}
		let script = format!("{APPLY_JS}({})", serde_json::to_string(ops)?);
		let value = self.evaluate_json(script, "apply interactions").await?;
		if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
			bail!("{error}");
		}
		Ok(())
	}
}

/// An in-memory page: captures are copies of the held document, applied interactions are replayed onto it.
#[derive(Clone, Debug)]
pub struct StaticPage {
	document: Document,
	applied: Vec<Interaction>,
}

impl StaticPage {
	pub fn new(document: Document) -> Self {
		Self { document, applied: Vec::new() }
	}

	pub fn document(&self) -> &Document {
		&self.document
	}

	/// Every interaction applied so far, in order
	pub fn applied(&self) -> &[Interaction] {
		&self.applied
	}
}

impl PageBackend for StaticPage {
	async fn capture(&self) -> Result<Document> {
		Ok(self.document.clone())
	}

	async fn apply(&mut self, ops: &[Interaction]) -> Result<()> {
		for op in ops {
			self.document.replay(op)?;
			self.applied.push(op.clone());
		}
		Ok(())
	}
}
