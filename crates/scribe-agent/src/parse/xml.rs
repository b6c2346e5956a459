use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Minimal element tree built from a quick-xml event stream.
#[derive(Debug, Clone, Default)]
pub(crate) struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self, String> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| format!("bad attribute on <{}>: {}", name, e))?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| format!("bad attribute value on <{}>: {}", name, e))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            ..Default::default()
        })
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text of the first child matching any of `names`.
    pub fn child_text(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .find_map(|n| self.child(n))
            .map(|c| c.text.trim().to_string())
    }
}

/// Parse a complete document into its root element.
pub(crate) fn parse_tree(raw: &str) -> Result<Element, String> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(Element::open(&e)?),
            Ok(Event::Empty(e)) => {
                let element = Element::open(&e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let element = stack.pop().ok_or("unexpected closing tag")?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                match stack.last_mut() {
                    Some(top) => top.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err("text outside the root element".into()),
                }
            }
            Ok(Event::CData(c)) => {
                let bytes = c.into_inner();
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&bytes));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "malformed XML at position {}: {}",
                    reader.error_position(),
                    e
                ))
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unclosed element <{}>", open.name));
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), String> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        Ok(())
    } else if root.is_none() {
        *root = Some(element);
        Ok(())
    } else {
        Err("more than one root element".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_tree_with_attributes_and_text() {
        let root = parse_tree(r#"<plan><node id="c1"><goal>a &amp; b</goal></node><empty/></plan>"#)
            .unwrap();
        assert_eq!(root.name, "plan");
        let node = root.child("node").unwrap();
        assert_eq!(node.attr("id"), Some("c1"));
        assert_eq!(node.child_text(&["goal"]).as_deref(), Some("a & b"));
        assert!(root.child("empty").is_some());
    }

    #[test]
    fn test_cdata_is_text() {
        let root = parse_tree("<r><![CDATA[x < y]]></r>").unwrap();
        assert_eq!(root.text, "x < y");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(parse_tree("<plan><node></plan>").is_err());
        assert!(parse_tree("<plan>").is_err());
        assert!(parse_tree("").is_err());
        assert!(parse_tree("<a/><b/>").is_err());
    }
}
