use color_eyre::{
	Result,
	eyre::{bail, eyre},
};

use crate::dom::{Document, NodeId};

const ID_ANCHOR_PREFIX: &str = r#"//*[@id=""#;
const ID_ANCHOR_SUFFIX: &str = r#""]"#;

/// Locator for `node`: its id, else tag plus the first two classes, else its positional path.
pub fn generate_selector(doc: &Document, node: NodeId) -> String {
	if let Some(id) = doc.id_attr(node) {
		return format!("#{id}");
	}
	if let Some(class) = doc.attr(node, "class") {
		let classes: Vec<&str> = class.split_whitespace().take(2).collect();
		if !classes.is_empty() {
			return format!("{}.{}", doc.tag(node), classes.join("."));
		}
	}
	positional_path(doc, node, true)
}

/// Root-anchored positional path, ignoring ids. Unlike `generate_selector` this is unique.
pub fn structural_path(doc: &Document, node: NodeId) -> Option<String> {
	doc.element(node)?;
	Some(positional_path(doc, node, false))
}

fn positional_path(doc: &Document, node: NodeId, anchor_on_ids: bool) -> String {
	if let Some(id) = doc.id_attr(node).filter(|_| anchor_on_ids) {
		return format!("{ID_ANCHOR_PREFIX}{id}{ID_ANCHOR_SUFFIX}");
	}
	if Some(node) == doc.body() {
		return "/html/body".to_string();
	}
	let tag = doc.tag(node);
	let Some(parent) = doc.parent_element(node) else {
		return format!("/{tag}");
	};
	let index = doc
		.child_elements(parent)
		.into_iter()
		.filter(|&sibling| doc.tag(sibling) == tag)
		.position(|sibling| sibling == node)
		.map_or(1, |i| i + 1);
	format!("{}/{tag}[{index}]", positional_path(doc, parent, anchor_on_ids))
}

/// First node `selector` resolves to, in document order.
pub fn resolve(doc: &Document, selector: &str) -> Result<Option<NodeId>> {
	Ok(resolve_all(doc, selector)?.into_iter().next())
}

/// Every node `selector` resolves to, in document order.
pub fn resolve_all(doc: &Document, selector: &str) -> Result<Vec<NodeId>> {
	let selector = selector.trim();
	if selector.starts_with('/') { resolve_path(doc, selector) } else { doc.query_all(selector) }
}

#[derive(Debug, PartialEq)]
struct Step<'a> {
	tag: &'a str,
	index: Option<usize>,
}

fn parse_step(step: &str) -> Result<Step<'_>> {
	let (tag, index) = match step.split_once('[') {
		Some((tag, rest)) => {
			let n = rest.strip_suffix(']').ok_or_else(|| eyre!("Unterminated predicate in path step '{step}'"))?;
			let n: usize = n.trim().parse().map_err(|e| eyre!("Unsupported predicate in path step '{step}': {e}"))?;
			(tag, Some(n))
		}
		None => (step, None),
	};
	if tag.is_empty() || !(tag == "*" || tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')) {
		bail!("Unsupported path step '{step}'");
	}
	Ok(Step { tag, index })
}

fn resolve_path(doc: &Document, path: &str) -> Result<Vec<NodeId>> {
	// `None` stands for the document node itself
	let (mut context, rest): (Vec<Option<NodeId>>, &str) = match path.strip_prefix(ID_ANCHOR_PREFIX) {
		Some(anchored) => {
			let end = anchored.find(ID_ANCHOR_SUFFIX).ok_or_else(|| eyre!("Unterminated id anchor in '{path}'"))?;
			let id = &anchored[..end];
			let anchors = doc.elements().into_iter().filter(|&n| doc.attr(n, "id") == Some(id)).map(Some).collect();
			(anchors, &anchored[end + ID_ANCHOR_SUFFIX.len()..])
		}
		None => (vec![None], path),
	};

	if rest.is_empty() {
		return Ok(context.into_iter().flatten().collect());
	}
	let Some(rest) = rest.strip_prefix('/') else {
		bail!("Unsupported path selector '{path}'");
	};

	for raw in rest.split('/') {
		let step = parse_step(raw).map_err(|e| eyre!("Failed to parse path selector '{path}': {e}"))?;
		let mut next = Vec::new();
		for parent in &context {
			let children = match parent {
				Some(parent) => doc.child_elements(*parent),
				None => vec![doc.root()],
			};
			let same_tag = children.into_iter().filter(|&c| step.tag == "*" || doc.tag(c) == step.tag);
			match step.index {
				Some(n) => next.extend(same_tag.skip(n.saturating_sub(1)).take(usize::from(n > 0))),
				None => next.extend(same_tag),
			}
		}
		context = next.into_iter().map(Some).collect();
	}

	let mut nodes: Vec<NodeId> = context.into_iter().flatten().collect();
	let order = doc.elements();
	nodes.sort_by_key(|n| order.iter().position(|o| o == n));
	nodes.dedup();
	Ok(nodes)
}
