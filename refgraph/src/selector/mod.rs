// Field selectors - dotted path parsing and the selection tree used during expansion

use crate::error::{RefGraphError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Selector entry meaning "every field, untrimmed".
pub const WILDCARD: &str = "*";

fn path_regex() -> &'static Regex {
    static PATH_RE: OnceLock<Regex> = OnceLock::new();
    PATH_RE.get_or_init(|| {
        Regex::new(r"^(\*|[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*(\.\*)?)$")
            .expect("selector path pattern is valid")
    })
}

/// An ordered list of dotted field paths, e.g. `["author.name", "tags"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    paths: Vec<String>,
}

impl FieldSelector {
    /// Parse and validate selector paths. Blank entries are ignored.
    pub fn parse<I, S>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = Vec::new();
        for path in paths {
            let path = path.as_ref().trim();
            if path.is_empty() {
                continue;
            }
            if !path_regex().is_match(path) {
                return Err(RefGraphError::InvalidSelector {
                    path: path.to_string(),
                    reason: "expected '*' or identifiers joined by '.', with '*' only as the last segment"
                        .into(),
                });
            }
            parsed.push(path.to_string());
        }
        Ok(FieldSelector { paths: parsed })
    }

    pub fn empty() -> Self {
        FieldSelector::default()
    }

    pub fn wildcard() -> Self {
        FieldSelector {
            paths: vec![WILDCARD.to_string()],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn is_wildcard(&self) -> bool {
        self.paths.iter().any(|p| p == WILDCARD)
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Unique first path segments, in first-seen order.
    pub fn top_level_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for path in &self.paths {
            let head = path.split('.').next().unwrap_or(path);
            if !fields.contains(&head) {
                fields.push(head);
            }
        }
        fields
    }

    /// Sub-paths below `field`, with the leading segment stripped.
    pub fn child_selector(&self, field: &str) -> FieldSelector {
        let paths = self
            .paths
            .iter()
            .filter_map(|path| match path.split_once('.') {
                Some((head, rest)) if head == field => Some(rest.to_string()),
                _ => None,
            })
            .collect();
        FieldSelector { paths }
    }

    /// Build the selection tree once; children are looked up from it during recursion.
    pub fn tree(&self) -> SelectionTree {
        SelectionTree::from_paths(&self.paths)
    }
}

/// Selector grouped by top-level field, each field mapped to its own sub-tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionTree {
    wildcard: bool,
    fields: Vec<String>,
    children: HashMap<String, SelectionTree>,
}

impl SelectionTree {
    pub fn from_paths(paths: &[String]) -> Self {
        let mut tree = SelectionTree::default();
        for path in paths {
            tree.insert_path(path);
        }
        tree
    }

    fn insert_path(&mut self, path: &str) {
        if path == WILDCARD {
            self.wildcard = true;
            return;
        }
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        if !self.children.contains_key(head) {
            self.fields.push(head.to_string());
        }
        let child = self.children.entry(head.to_string()).or_default();
        if let Some(rest) = rest {
            child.insert_path(rest);
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.wildcard && self.fields.is_empty()
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    pub fn top_level_fields(&self) -> &[String] {
        &self.fields
    }

    pub fn contains(&self, field: &str) -> bool {
        self.children.contains_key(field)
    }

    /// The sub-selection declared for `field`; `None` when nothing is nested under it.
    pub fn child(&self, field: &str) -> Option<&SelectionTree> {
        self.children.get(field).filter(|c| !c.is_empty())
    }

    /// Reference hops needed by the deepest path (`a.b.c` needs two).
    pub fn hops(&self) -> u32 {
        self.children
            .values()
            .filter(|c| !c.is_empty())
            .map(|c| 1 + c.hops())
            .max()
            .unwrap_or(0)
    }

    /// Render back to dotted paths.
    pub fn to_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        if self.wildcard {
            paths.push(WILDCARD.to_string());
        }
        for field in &self.fields {
            match self.child(field) {
                Some(child) => {
                    for sub in child.to_paths() {
                        paths.push(format!("{field}.{sub}"));
                    }
                }
                None => paths.push(field.clone()),
            }
        }
        paths
    }
}

impl From<&FieldSelector> for SelectionTree {
    fn from(selector: &FieldSelector) -> Self {
        selector.tree()
    }
}
