use crate::error::{ExtractError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tree_sitter::{Node, Parser, Tree};

/// Source language of a component repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLanguage {
    Go,
    Rust,
}

impl SourceLanguage {
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some("go") => Some(SourceLanguage::Go),
            Some("rs") => Some(SourceLanguage::Rust),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceLanguage::Go => "go",
            SourceLanguage::Rust => "rust",
        }
    }

    pub fn tree_sitter_language(self) -> tree_sitter::Language {
        match self {
            SourceLanguage::Go => tree_sitter_go::LANGUAGE.into(),
            SourceLanguage::Rust => tree_sitter_rust::LANGUAGE.into(),
        }
    }

    pub fn parser(self) -> Result<Parser> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.tree_sitter_language())
            .map_err(|e| ExtractError::tree_sitter(format!("Failed to set language: {e}")))?;
        Ok(parser)
    }
}

/// A parsed file with its source kept alongside the tree.
pub struct ParsedFile {
    pub path: std::path::PathBuf,
    pub source: String,
    pub tree: Tree,
}

impl ParsedFile {
    pub fn parse(parser: &mut Parser, path: &Path, source: String) -> Result<Self> {
        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| ExtractError::parse(path, "Failed to parse source code"))?;
        Ok(Self {
            path: path.to_path_buf(),
            source,
            tree,
        })
    }

    pub fn read(parser: &mut Parser, path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::parse(parser, path, source)
    }

    pub fn text(&self, node: Node<'_>) -> &str {
        node_text(&self.source, node)
    }
}

pub fn node_text<'a>(source: &'a str, node: Node<'_>) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

/// Named children of `node`, collected so the cursor borrow ends here.
pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Depth-first visit of every node under `root`.
pub fn visit<'t>(root: Node<'t>, f: &mut impl FnMut(Node<'t>)) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        f(node);
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
}
