use std::collections::BTreeMap;

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
	ElementDescriptor,
	dom::{Document, NodeId, Viewport},
	selector::{generate_selector, resolve_all},
	truncate_chars,
};

const LABEL_MAX_CHARS: usize = 50;
const PAGE_HTML_MAX_CHARS: usize = 10_000;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDump {
	pub url: String,
	pub title: String,
	pub text: String,
	/// Body markup, first 10 000 characters
	pub html: String,
	pub accessibility_tree: Vec<ElementDescriptor>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Extracted {
	pub text: String,
	pub html: String,
	pub attributes: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TextMatch {
	pub selector: String,
	pub text: String,
	/// Uppercase, as `Element.tagName` reports it
	pub tag: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Link {
	pub href: String,
	pub text: String,
	pub selector: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FormField {
	pub name: String,
	#[serde(rename = "type")]
	pub field_type: Option<String>,
	pub id: String,
	pub selector: String,
	/// Absent for `select`, which has no placeholder
	#[serde(skip_serializing_if = "Option::is_none")]
	pub placeholder: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Form {
	pub action: String,
	pub method: String,
	pub fields: Vec<FormField>,
}

/// Every interactive or labelled element, in document order.
///
/// An element qualifies when it is clickable (button, anchor, click handler, `tabindex`), a text-entry control, or
/// carries an `aria-label`.
pub fn build_snapshot(doc: &Document) -> Vec<ElementDescriptor> {
	doc.elements().into_iter().filter_map(|node| describe(doc, node)).collect()
}

fn describe(doc: &Document, node: NodeId) -> Option<ElementDescriptor> {
	let tag = doc.tag(node);
	let aria_label = doc.attr(node, "aria-label").unwrap_or_default().to_string();
	let is_clickable = matches!(tag.as_str(), "button" | "a") || doc.has_click_handler(node) || doc.attr(node, "tabindex").is_some();
	let is_input = matches!(tag.as_str(), "input" | "textarea");
	if !(is_clickable || is_input || !aria_label.is_empty()) {
		return None;
	}

	let role = doc.attr(node, "role").filter(|r| !r.is_empty()).map(str::to_string).unwrap_or_else(|| tag.clone());
	let label = if aria_label.is_empty() {
		truncate_chars(doc.text_content(node).trim(), LABEL_MAX_CHARS)
	} else {
		aria_label.clone()
	};

	Some(ElementDescriptor {
		selector: generate_selector(doc, node),
		role,
		label,
		aria_label,
		is_clickable,
		is_input,
		input_type: doc.input_type(node),
		visible: doc.is_visible(node),
	})
}

pub fn read_page(doc: &Document) -> PageDump {
	let (text, html) = match doc.body() {
		Some(body) => (doc.inner_text(body), truncate_chars(&doc.inner_html(body), PAGE_HTML_MAX_CHARS)),
		None => (String::new(), String::new()),
	};
	PageDump {
		url: doc.url().to_string(),
		title: doc.title(),
		text,
		html,
		accessibility_tree: build_snapshot(doc),
	}
}

pub fn extract(doc: &Document, selector: &str) -> Result<Vec<Extracted>> {
	let nodes = resolve_all(doc, selector)?;
	Ok(nodes
		.into_iter()
		.map(|node| Extracted {
			text: doc.text_content(node).trim().to_string(),
			html: doc.inner_html(node),
			attributes: doc
				.element(node)
				.map(|el| el.value().attrs().map(|(k, v)| (k.to_string(), v.to_string())).collect())
				.unwrap_or_default(),
		})
		.collect())
}

/// Elements whose first direct text node contains `needle` (case-sensitive).
pub fn find_by_text(doc: &Document, needle: &str) -> Vec<TextMatch> {
	doc.elements()
		.into_iter()
		.filter(|&node| doc.first_text_child(node).unwrap_or_default().contains(needle))
		.map(|node| TextMatch {
			selector: generate_selector(doc, node),
			text: doc.text_content(node).trim().to_string(),
			tag: doc.tag(node).to_ascii_uppercase(),
		})
		.collect()
}

pub fn links(doc: &Document) -> Result<Vec<Link>> {
	let base = Url::parse(doc.url()).ok();
	Ok(doc
		.query_all("a")?
		.into_iter()
		.map(|node| Link {
			href: doc.attr(node, "href").map(|href| absolutize(base.as_ref(), href)).unwrap_or_default(),
			text: doc.text_content(node).trim().to_string(),
			selector: generate_selector(doc, node),
		})
		.collect())
}

pub fn forms(doc: &Document) -> Result<Vec<Form>> {
	let base = Url::parse(doc.url()).ok();
	let mut out = Vec::new();
	for form in doc.query_all("form")? {
		let action = match doc.attr(form, "action").filter(|a| !a.trim().is_empty()) {
			Some(action) => absolutize(base.as_ref(), action),
			None => doc.url().to_string(),
		};
		let method = doc
			.attr(form, "method")
			.map(|m| m.trim().to_ascii_lowercase())
			.filter(|m| matches!(m.as_str(), "get" | "post" | "dialog"))
			.unwrap_or_else(|| "get".to_string());

		let fields = doc
			.query_within(form, "input, textarea, select")?
			.into_iter()
			.map(|field| FormField {
				name: doc.attr(field, "name").unwrap_or_default().to_string(),
				field_type: doc.input_type(field),
				id: doc.attr(field, "id").unwrap_or_default().to_string(),
				selector: generate_selector(doc, field),
				placeholder: (doc.tag(field) != "select").then(|| doc.attr(field, "placeholder").unwrap_or_default().to_string()),
			})
			.collect();

		out.push(Form { action, method, fields });
	}
	Ok(out)
}

pub fn viewport(doc: &Document) -> Viewport {
	doc.viewport()
}

fn absolutize(base: Option<&Url>, href: &str) -> String {
	let href = href.trim();
	match base.map(|b| b.join(href)) {
		Some(Ok(url)) => url.to_string(),
		_ => href.to_string(),
	}
}
