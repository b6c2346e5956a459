use serde_json::Value;

use scribe_core::error::{Result, ScribeError};
use scribe_core::types::{default_goal, default_title, Context, NodeDocument, PlanDocument};

use super::xml::{parse_tree, Element};
use super::{looks_like_xml, strip_code_fences};

/// Decodes a planner's raw output into a [`PlanDocument`].
///
/// JSON follows the document schema (with the `chapters`/`targetAgent`
/// aliases). XML uses a `<plan>` or `<chronicle>` root holding `<node>` or
/// `<chapter>` elements, directly or inside a `<nodes>`/`<chapters>` wrapper.
pub struct DocumentParser;

impl DocumentParser {
    pub fn parse(raw: &str) -> Result<PlanDocument> {
        let text = strip_code_fences(raw);
        if text.is_empty() {
            return Err(ScribeError::Parse("empty plan document".into()));
        }
        if looks_like_xml(&text) {
            Self::parse_xml(&text)
        } else {
            Self::parse_json(&text)
        }
    }

    pub fn parse_json(text: &str) -> Result<PlanDocument> {
        serde_json::from_str(text).map_err(|e| ScribeError::Parse(format!("invalid plan JSON: {}", e)))
    }

    pub fn parse_xml(text: &str) -> Result<PlanDocument> {
        let root = parse_tree(text).map_err(ScribeError::Parse)?;
        if root.name != "plan" && root.name != "chronicle" {
            return Err(ScribeError::Parse(format!(
                "expected <plan> or <chronicle> root, found <{}>",
                root.name
            )));
        }

        let title = root
            .child_text(&["title"])
            .filter(|t| !t.is_empty())
            .unwrap_or_else(default_title);
        let goal = root
            .child_text(&["goal"])
            .filter(|g| !g.is_empty())
            .unwrap_or_else(default_goal);

        let nodes = node_elements(&root)
            .map(node_from_xml)
            .collect::<Result<Vec<_>>>()?;

        Ok(PlanDocument {
            title,
            goal,
            status: None,
            nodes,
        })
    }
}

fn node_elements(root: &Element) -> impl Iterator<Item = &Element> {
    let direct = root
        .children
        .iter()
        .filter(|c| c.name == "chapter" || c.name == "node");
    let wrapped = root
        .children
        .iter()
        .filter(|c| c.name == "chapters" || c.name == "nodes")
        .flat_map(|w| {
            w.children
                .iter()
                .filter(|c| c.name == "chapter" || c.name == "node")
        });
    direct.chain(wrapped)
}

fn node_from_xml(el: &Element) -> Result<NodeDocument> {
    let id = el
        .attr("id")
        .map(str::to_string)
        .or_else(|| el.child_text(&["id"]))
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ScribeError::Parse(format!("<{}> without an id", el.name)))?;

    let executor_name = el
        .child_text(&["executorName", "targetAgent"])
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            ScribeError::Parse(format!("node '{}' missing <executorName>", id))
        })?;

    let goal = el
        .child_text(&["goal"])
        .filter(|g| !g.is_empty())
        .unwrap_or_else(default_goal);

    let context = el.child("context").map(context_from_xml).unwrap_or_default();

    let dependencies = el
        .child("dependencies")
        .map(|deps| {
            deps.children_named("dependency")
                .map(|d| d.text.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(NodeDocument {
        id,
        executor_name,
        goal,
        context,
        dependencies,
        status: None,
    })
}

/// `<context>` with child elements becomes a map of their texts; plain text
/// becomes `{"text": ...}`.
fn context_from_xml(el: &Element) -> Context {
    let mut context = Context::new();
    if el.children.is_empty() {
        let text = el.text.trim();
        if !text.is_empty() {
            context.insert("text".into(), Value::String(text.to_string()));
        }
        return context;
    }
    for child in &el.children {
        let key = child.attr("name").unwrap_or(&child.name).to_string();
        context.insert(key, Value::String(child.text.trim().to_string()));
    }
    context
}
