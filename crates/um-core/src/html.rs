//! Parsed-HTML document
//!
//! [`HtmlDocument`] implements [`Document`] over a static HTML snapshot so
//! rules can run outside a browser. Edits go straight into the parsed tree:
//! removed elements are detached and class/style edits rewrite the element's
//! attributes, so later selectors and guards see the edited page.

use ego_tree::NodeId;
use html5ever::{LocalName, Namespace, QualName};
use scraper::node::Element;
use scraper::{ElementRef, Html, Node, StrTendril};

use crate::dom::{append_declaration, parse_selector, Document, DomError};

pub struct HtmlDocument {
    html: Html,
}

impl HtmlDocument {
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    /// Whether the node, or one of its ancestors, has been removed.
    pub fn is_removed(&self, id: NodeId) -> bool {
        let root = self.html.tree.root().id();
        match self.html.tree.get(id) {
            Some(node) => id != root && node.ancestors().last().map(|a| a.id()) != Some(root),
            None => true,
        }
    }

    /// Current class list in attribute order.
    pub fn classes(&self, id: NodeId) -> Result<Vec<String>, DomError> {
        let element = self.element(id)?;
        Ok(element
            .value()
            .attr("class")
            .unwrap_or_default()
            .split_ascii_whitespace()
            .map(str::to_string)
            .collect())
    }

    /// Current inline style.
    pub fn style(&self, id: NodeId) -> Result<String, DomError> {
        let element = self.element(id)?;
        Ok(element.value().attr("style").unwrap_or_default().to_string())
    }

    /// Number of attached elements matching `selector`.
    pub fn count(&self, selector: &str) -> Result<usize, DomError> {
        let selector = parse_selector(selector)?;
        Ok(self.html.select(&selector).filter(|e| !self.is_removed(e.id())).count())
    }

    /// Serialize the edited document.
    pub fn to_html(&self) -> String {
        self.html.html()
    }

    fn element(&self, id: NodeId) -> Result<ElementRef<'_>, DomError> {
        if self.is_removed(id) {
            return Err(DomError::StaleHandle);
        }
        self.html
            .tree
            .get(id)
            .and_then(ElementRef::wrap)
            .ok_or(DomError::StaleHandle)
    }

    /// Replace one attribute; an empty value drops it.
    fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.element(id)?;
        let mut node = self.html.tree.get_mut(id).ok_or(DomError::StaleHandle)?;
        let Node::Element(element) = node.value() else {
            return Err(DomError::StaleHandle);
        };

        let mut attrs: Vec<(QualName, StrTendril)> = element
            .attrs
            .iter()
            .filter(|(qualname, _)| &*qualname.local != name)
            .map(|(qualname, value)| (qualname.clone(), value.clone()))
            .collect();
        if !value.is_empty() {
            let qualname = QualName::new(None, Namespace::from(""), LocalName::from(name));
            attrs.push((qualname, StrTendril::from_slice(value)));
        }
        // Attribute lookup binary-searches, so keep them sorted.
        attrs.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        // A fresh element drops the cached id and class lists.
        let mut fresh = Element::new(element.name.clone(), Vec::new());
        fresh.attrs = attrs.into_iter().collect();
        *element = fresh;
        Ok(())
    }

    fn set_classes(&mut self, id: NodeId, classes: &[String]) -> Result<(), DomError> {
        self.set_attribute(id, "class", &classes.join(" "))
    }
}

impl Document for HtmlDocument {
    type Handle = NodeId;

    fn query_selector(&self, selector: &str) -> Result<Option<NodeId>, DomError> {
        let selector = parse_selector(selector)?;
        Ok(self
            .html
            .select(&selector)
            .map(|element| element.id())
            .find(|id| !self.is_removed(*id)))
    }

    fn remove(&mut self, target: &NodeId) -> Result<(), DomError> {
        self.element(*target)?;
        let mut node = self.html.tree.get_mut(*target).ok_or(DomError::StaleHandle)?;
        node.detach();
        Ok(())
    }

    fn add_classes(&mut self, target: &NodeId, classes: &[&str]) -> Result<(), DomError> {
        let mut current = self.classes(*target)?;
        for class in classes {
            if !current.iter().any(|c| c == class) {
                current.push(class.to_string());
            }
        }
        self.set_classes(*target, &current)
    }

    fn remove_classes(&mut self, target: &NodeId, classes: &[&str]) -> Result<(), DomError> {
        let mut current = self.classes(*target)?;
        current.retain(|c| !classes.contains(&c.as_str()));
        self.set_classes(*target, &current)
    }

    fn clear_classes(&mut self, target: &NodeId) -> Result<(), DomError> {
        self.set_classes(*target, &[])
    }

    fn append_style(&mut self, target: &NodeId, declaration: &str) -> Result<(), DomError> {
        let style = append_declaration(&self.style(*target)?, declaration);
        self.set_attribute(*target, "style", &style)
    }

    fn clear_style(&mut self, target: &NodeId) -> Result<(), DomError> {
        self.set_attribute(*target, "style", "")
    }
}
