use std::collections::HashMap;

use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
pub use ego_tree::NodeId;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};

use crate::selector;

/// Tags the user agent never renders
const NOT_RENDERED: &[&str] = &["head", "script", "style", "template", "noscript", "title", "meta", "link", "base"];

/// Browser-computed facts for one element, in `querySelectorAll('*')` order
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveFacts {
	/// `localName`, checked against the re-parsed element at the same position
	#[serde(default)]
	pub tag: String,
	pub visible: bool,
	pub has_click_handler: bool,
	#[serde(default)]
	pub inner_text: String,
	#[serde(default)]
	pub value: Option<String>,
	#[serde(default)]
	pub checked: Option<bool>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
	pub width: u32,
	pub height: u32,
	pub scroll_x: i64,
	pub scroll_y: i64,
}

/// A serialized live page, as produced by the browser-side capture script
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capture {
	pub url: String,
	pub title: String,
	pub html: String,
	pub facts: Vec<LiveFacts>,
	pub viewport: Viewport,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DomEvent {
	/// Bubbling, cancelable mouse click
	Click,
	Input,
	Change,
}

/// One side effect performed on the page, addressed by absolute structural path
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Interaction {
	/// Native activation (`el.click()`)
	Activate { path: String },
	Dispatch { path: String, event: DomEvent },
	Focus { path: String },
	SetValue { path: String, value: String },
	SetChecked { path: String, checked: bool },
	ScrollBy { dy: i64 },
}

#[derive(Clone, Debug, Default)]
struct ControlState {
	value: Option<String>,
	checked: Option<bool>,
}

#[derive(Clone, Debug)]
pub struct Document {
	url: String,
	title: Option<String>,
	html: Html,
	facts: HashMap<NodeId, LiveFacts>,
	state: HashMap<NodeId, ControlState>,
	focused: Option<NodeId>,
	viewport: Viewport,
	journal: Vec<Interaction>,
	/// Re-parsed tree does not line up with the live one, so structural paths would address the wrong elements
	misaligned: bool,
}

impl Document {
	/// Parse static markup. Visibility and handlers are approximated from attributes and inline styles.
	pub fn parse(url: impl Into<String>, html: &str) -> Self {
		Self {
			url: url.into(),
			title: None,
			html: Html::parse_document(html),
			facts: HashMap::new(),
			state: HashMap::new(),
			focused: None,
			viewport: Viewport::default(),
			journal: Vec::new(),
			misaligned: false,
		}
	}

	/// Rebuild a live page from its capture.
	///
	/// Facts are aligned to elements by document order. If the re-parsed tree disagrees with the browser's (element
	/// count or tag at any position), facts are dropped for static approximations and the document becomes read-only:
	/// any element-addressed side effect is an error.
	pub fn from_capture(capture: Capture) -> Self {
		let mut doc = Self::parse(capture.url, &capture.html);
		doc.title = Some(capture.title);
		doc.viewport = capture.viewport;

		let elements = doc.elements();
		let aligned = elements.len() == capture.facts.len()
			&& elements.iter().zip(&capture.facts).all(|(&node, facts)| facts.tag.is_empty() || facts.tag.eq_ignore_ascii_case(&doc.tag(node)));
		if aligned {
			doc.facts = elements.into_iter().zip(capture.facts).collect();
		} else {
			tracing::warn!(
				"Capture misaligned ({} live elements, {} re-parsed), falling back to static approximations and refusing interactions",
				capture.facts.len(),
				elements.len()
			);
			doc.misaligned = true;
		}
		doc
	}

	/// Whether element-addressed side effects can be replayed on the page this came from
	pub fn is_aligned(&self) -> bool {
		!self.misaligned
	}

	pub fn with_viewport(mut self, viewport: Viewport) -> Self {
		self.viewport = viewport;
		self
	}

	pub fn url(&self) -> &str {
		&self.url
	}

	/// `document.title`: the capture's title, else the whitespace-collapsed `<title>` text
	pub fn title(&self) -> String {
		if let Some(title) = &self.title {
			return title.clone();
		}
		self.query_first("title")
			.ok()
			.flatten()
			.map(|node| collapse_whitespace(&self.text_content(node)))
			.unwrap_or_default()
	}

	pub fn viewport(&self) -> Viewport {
		self.viewport
	}

	/// Serialized markup of the whole document
	pub fn outer_html(&self) -> String {
		self.html.html()
	}

	pub fn element(&self, node: NodeId) -> Option<ElementRef<'_>> {
		self.html.tree.get(node).and_then(ElementRef::wrap)
	}

	/// The `<html>` element
	pub fn root(&self) -> NodeId {
		self.html.root_element().id()
	}

	/// `document.body`: the first `body` child of the root element
	pub fn body(&self) -> Option<NodeId> {
		self.child_elements(self.root()).into_iter().find(|&child| self.tag(child) == "body")
	}

	/// Every element in document order, excluding template contents
	pub fn elements(&self) -> Vec<NodeId> {
		self.html
			.tree
			.root()
			.descendants()
			.filter_map(ElementRef::wrap)
			.filter(|el| !el.ancestors().filter_map(ElementRef::wrap).any(|a| a.value().name() == "template"))
			.map(|el| el.id())
			.collect()
	}

	/// Lowercased tag name, empty for non-elements
	pub fn tag(&self, node: NodeId) -> String {
		self.element(node).map(|el| el.value().name().to_ascii_lowercase()).unwrap_or_default()
	}

	pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
		self.element(node).and_then(|el| el.value().attr(name))
	}

	/// Non-empty `id` attribute
	pub fn id_attr(&self, node: NodeId) -> Option<&str> {
		self.attr(node, "id").filter(|id| !id.is_empty())
	}

	/// First element carrying `id`, in document order
	pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
		self.elements().into_iter().find(|&node| self.attr(node, "id") == Some(id))
	}

	pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
		self.html.tree.get(node)?.parent().filter(|p| p.value().is_element()).map(|p| p.id())
	}

	pub fn child_elements(&self, node: NodeId) -> Vec<NodeId> {
		self.element(node).map(|el| el.child_elements().map(|c| c.id()).collect()).unwrap_or_default()
	}

	/// `textContent`: every descendant text node, concatenated
	pub fn text_content(&self, node: NodeId) -> String {
		self.element(node).map(|el| el.text().collect()).unwrap_or_default()
	}

	/// Content of the first direct text child, as XPath's `text()` yields in a string context
	pub fn first_text_child(&self, node: NodeId) -> Option<&str> {
		let el = self.element(node)?;
		el.children().find_map(|child| match child.value() {
			Node::Text(text) => Some(&**text),
			_ => None,
		})
	}

	/// `innerText`: the live value when captured, else rendered text with whitespace collapsed
	pub fn inner_text(&self, node: NodeId) -> String {
		if let Some(facts) = self.facts.get(&node) {
			return facts.inner_text.clone();
		}
		if !self.is_rendered(node) {
			return self.text_content(node);
		}
		let mut out = String::new();
		self.collect_rendered_text(node, &mut out);
		collapse_whitespace(&out)
	}

	pub fn inner_html(&self, node: NodeId) -> String {
		self.element(node).map(|el| el.inner_html()).unwrap_or_default()
	}

	/// The element's `value` property, for elements that have one
	pub fn value(&self, node: NodeId) -> Option<String> {
		if let Some(value) = self.state.get(&node).and_then(|s| s.value.clone()) {
			return Some(value);
		}
		if let Some(value) = self.facts.get(&node).and_then(|f| f.value.clone()) {
			return Some(value);
		}
		let tag = self.tag(node);
		match tag.as_str() {
			"input" => {
				let default = match self.input_type(node).as_deref() {
					Some("checkbox") | Some("radio") => "on",
					_ => "",
				};
				Some(self.attr(node, "value").unwrap_or(default).to_string())
			}
			"textarea" => Some(self.text_content(node)),
			"select" => {
				let options = self.query_within(node, "option").unwrap_or_default();
				let selected = options.iter().copied().find(|&o| self.attr(o, "selected").is_some()).or_else(|| options.first().copied());
				Some(selected.and_then(|o| self.value(o)).unwrap_or_default())
			}
			"option" => Some(self.attr(node, "value").map(str::to_string).unwrap_or_else(|| collapse_whitespace(&self.text_content(node)))),
			"button" | "data" | "output" => Some(self.attr(node, "value").unwrap_or("").to_string()),
			_ => None,
		}
	}

	/// The element's `type` property (`None` where the element has no such property)
	pub fn input_type(&self, node: NodeId) -> Option<String> {
		let tag = self.tag(node);
		let declared = self.attr(node, "type").map(|t| t.trim().to_ascii_lowercase());
		match tag.as_str() {
			"input" => Some(declared.filter(|t| !t.is_empty()).unwrap_or_else(|| "text".to_string())),
			"button" => Some(match declared.as_deref() {
				Some("reset") => "reset".to_string(),
				Some("button") => "button".to_string(),
				_ => "submit".to_string(),
			}),
			"select" => Some(if self.attr(node, "multiple").is_some() { "select-multiple" } else { "select-one" }.to_string()),
			"textarea" => Some("textarea".to_string()),
			"a" | "link" | "script" | "style" | "source" | "embed" | "object" | "ol" => Some(self.attr(node, "type").unwrap_or("").to_string()),
			_ => None,
		}
	}

	/// Whether the element is a checkbox or radio input
	pub fn is_checkable(&self, node: NodeId) -> bool {
		self.tag(node) == "input" && matches!(self.input_type(node).as_deref(), Some("checkbox") | Some("radio"))
	}

	pub fn is_checked(&self, node: NodeId) -> bool {
		if let Some(checked) = self.state.get(&node).and_then(|s| s.checked) {
			return checked;
		}
		if let Some(checked) = self.facts.get(&node).and_then(|f| f.checked) {
			return checked;
		}
		self.is_checkable(node) && self.attr(node, "checked").is_some()
	}

	/// `el.onclick !== null`: the live answer when captured, else an inline `onclick` attribute
	pub fn has_click_handler(&self, node: NodeId) -> bool {
		match self.facts.get(&node) {
			Some(facts) => facts.has_click_handler,
			None => self.attr(node, "onclick").is_some(),
		}
	}

	/// Has an offset parent and is neither `display:none` nor `visibility:hidden`
	pub fn is_visible(&self, node: NodeId) -> bool {
		match self.facts.get(&node) {
			Some(facts) => facts.visible,
			None => self.static_visible(node),
		}
	}

	pub fn focused(&self) -> Option<NodeId> {
		self.focused
	}

	/// Elements matching `css` anywhere in the document, in document order
	pub fn query_all(&self, css: &str) -> Result<Vec<NodeId>> {
		let selector = parse_css(css)?;
		Ok(self.elements().into_iter().filter(|&node| self.element(node).is_some_and(|el| selector.matches(&el))).collect())
	}

	/// Descendants of `scope` matching `css`, in document order
	pub fn query_within(&self, scope: NodeId, css: &str) -> Result<Vec<NodeId>> {
		let selector = parse_css(css)?;
		let el = self.element(scope).ok_or_else(|| eyre!("Scope node is not an element"))?;
		Ok(el.select(&selector).map(|m| m.id()).collect())
	}

	pub fn query_first(&self, css: &str) -> Result<Option<NodeId>> {
		Ok(self.query_all(css)?.into_iter().next())
	}

	// --- side effects ---

	/// Native activation, as `el.click()`
	pub fn click(&mut self, node: NodeId) -> Result<()> {
		let path = self.path_of(node)?;
		self.record(Interaction::Activate { path })
	}

	pub fn dispatch(&mut self, node: NodeId, event: DomEvent) -> Result<()> {
		let path = self.path_of(node)?;
		self.record(Interaction::Dispatch { path, event })
	}

	pub fn focus(&mut self, node: NodeId) -> Result<()> {
		let path = self.path_of(node)?;
		self.record(Interaction::Focus { path })
	}

	pub fn set_value(&mut self, node: NodeId, value: &str) -> Result<()> {
		let path = self.path_of(node)?;
		self.record(Interaction::SetValue { path, value: value.to_string() })
	}

	pub fn set_checked(&mut self, node: NodeId, checked: bool) -> Result<()> {
		let path = self.path_of(node)?;
		self.record(Interaction::SetChecked { path, checked })
	}

	pub fn scroll_by(&mut self, dy: i64) -> Result<()> {
		self.record(Interaction::ScrollBy { dy })
	}

	/// Interactions performed since the last `take_journal`
	pub fn journal(&self) -> &[Interaction] {
		&self.journal
	}

	pub fn take_journal(&mut self) -> Vec<Interaction> {
		std::mem::take(&mut self.journal)
	}

	/// Apply an interaction recorded elsewhere, without journaling it again
	pub fn replay(&mut self, op: &Interaction) -> Result<()> {
		self.perform(op)
	}

	fn record(&mut self, op: Interaction) -> Result<()> {
		self.perform(&op)?;
		self.journal.push(op);
		Ok(())
	}

	fn perform(&mut self, op: &Interaction) -> Result<()> {
		match op {
			Interaction::Activate { path } => {
				let node = self.node_at(path)?;
				self.activation_behavior(node);
			}
			Interaction::Dispatch { path, event } => {
				let node = self.node_at(path)?;
				if *event == DomEvent::Click {
					self.activation_behavior(node);
				}
			}
			Interaction::Focus { path } => {
				self.focused = Some(self.node_at(path)?);
			}
			Interaction::SetValue { path, value } => {
				let node = self.node_at(path)?;
				self.state.entry(node).or_default().value = Some(value.clone());
			}
			Interaction::SetChecked { path, checked } => {
				let node = self.node_at(path)?;
				self.write_checked(node, *checked);
			}
			Interaction::ScrollBy { dy } => {
				self.viewport.scroll_y = (self.viewport.scroll_y + dy).max(0);
			}
		}
		Ok(())
	}

	fn path_of(&self, node: NodeId) -> Result<String> {
		if self.misaligned {
			bail!("Page markup does not survive re-parsing, refusing to address elements by path");
		}
		selector::structural_path(self, node).ok_or_else(|| eyre!("Node is not an element in this document"))
	}

	fn node_at(&self, path: &str) -> Result<NodeId> {
		selector::resolve(self, path)?.ok_or_else(|| eyre!("Element not found: {path}"))
	}

	/// What a click does by default: checkboxes toggle, radios check, labels forward to their control
	fn activation_behavior(&mut self, node: NodeId) {
		match self.tag(node).as_str() {
			"input" => match self.input_type(node).as_deref() {
				Some("checkbox") => {
					let checked = self.is_checked(node);
					self.write_checked(node, !checked);
				}
				Some("radio") => self.write_checked(node, true),
				_ => {}
			},
			"label" =>
				if let Some(control) = self.labelled_control(node) {
					self.activation_behavior(control);
				},
			_ => {}
		}
	}

	fn write_checked(&mut self, node: NodeId, checked: bool) {
		if checked && self.is_checkable(node) && self.input_type(node).as_deref() == Some("radio") {
			for other in self.radio_group(node) {
				if other != node {
					self.state.entry(other).or_default().checked = Some(false);
				}
			}
		}
		self.state.entry(node).or_default().checked = Some(checked);
	}

	/// Radios sharing `node`'s name within the same form owner
	fn radio_group(&self, node: NodeId) -> Vec<NodeId> {
		let Some(name) = self.attr(node, "name").filter(|n| !n.is_empty()) else {
			return vec![node];
		};
		let owner = self.form_owner(node);
		self.query_all("input[name]")
			.unwrap_or_default()
			.into_iter()
			.filter(|&other| self.attr(other, "name") == Some(name) && self.input_type(other).as_deref() == Some("radio") && self.form_owner(other) == owner)
			.collect()
	}

	fn form_owner(&self, node: NodeId) -> Option<NodeId> {
		let el = self.element(node)?;
		el.ancestors().filter_map(ElementRef::wrap).find(|a| a.value().name() == "form").map(|a| a.id())
	}

	/// The control a `label` activates: its `for` target, else its first labelable descendant
	fn labelled_control(&self, label: NodeId) -> Option<NodeId> {
		if let Some(target) = self.attr(label, "for") {
			return self.element_by_id(target);
		}
		self.query_within(label, "input, button, select, textarea").ok()?.into_iter().next()
	}

	fn inline_style(&self, node: NodeId, property: &str) -> Option<String> {
		let style = self.attr(node, "style")?;
		style.split(';').rev().find_map(|decl| {
			let (name, value) = decl.split_once(':')?;
			if name.trim().eq_ignore_ascii_case(property) {
				Some(value.trim().trim_end_matches("!important").trim().to_ascii_lowercase())
			} else {
				None
			}
		})
	}

	/// Whether the element itself produces a box (`display:none` equivalents excluded)
	fn generates_box(&self, node: NodeId) -> bool {
		let tag = self.tag(node);
		if NOT_RENDERED.contains(&tag.as_str()) || self.attr(node, "hidden").is_some() {
			return false;
		}
		if tag == "input" && self.input_type(node).as_deref() == Some("hidden") {
			return false;
		}
		self.inline_style(node, "display").as_deref() != Some("none")
	}

	fn is_rendered(&self, node: NodeId) -> bool {
		std::iter::successors(Some(node), |&n| self.parent_element(n)).all(|n| self.generates_box(n))
	}

	fn static_visible(&self, node: NodeId) -> bool {
		let tag = self.tag(node);
		// no offset parent for the root, the body, or fixed-position boxes
		if tag == "html" || tag == "body" || self.inline_style(node, "position").as_deref() == Some("fixed") {
			return false;
		}
		if !self.is_rendered(node) {
			return false;
		}
		let visibility = std::iter::successors(Some(node), |&n| self.parent_element(n)).find_map(|n| self.inline_style(n, "visibility"));
		!matches!(visibility.as_deref(), Some("hidden") | Some("collapse"))
	}

	fn collect_rendered_text(&self, node: NodeId, out: &mut String) {
		let Some(el) = self.element(node) else { return };
		for child in el.children() {
			match child.value() {
				Node::Text(text) => out.push_str(text),
				Node::Element(e) if e.name() == "br" => out.push('\n'),
				Node::Element(_) =>
					if self.generates_box(child.id()) {
						out.push(' ');
						self.collect_rendered_text(child.id(), out);
						out.push(' ');
					},
				_ => {}
			}
		}
	}
}

fn parse_css(css: &str) -> Result<Selector> {
	match Selector::parse(css) {
		Ok(selector) => Ok(selector),
		Err(e) => bail!("Invalid selector '{css}': {e}"),
	}
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
	s.split_whitespace().collect::<Vec<_>>().join(" ")
}
