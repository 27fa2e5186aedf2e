use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

/// One path segment: a directory with children, or a file leaf carrying the
/// full relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Node {
    File { path: String },
    Dir { children: BTreeMap<String, Node> },
}

/// Selected files arranged by path segment. Built once per selection and
/// read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileTree {
    roots: BTreeMap<String, Node>,
}

impl FileTree {
    /// Build from `/`-separated relative paths. Empty segments are ignored. A
    /// path that names an existing directory, or a file that later gains
    /// children, keeps the first shape seen.
    pub fn build<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut roots = BTreeMap::new();
        for path in paths {
            let path = path.as_ref();
            let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
            insert(&mut roots, &parts, path);
        }
        Self { roots }
    }

    pub fn roots(&self) -> &BTreeMap<String, Node> {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Full paths of every file leaf, in tree order.
    pub fn files(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect(&self.roots, &mut out);
        out
    }

    /// Indented listing; directories end with `/`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        render_level(&self.roots, 0, &mut out);
        out
    }
}

fn insert(level: &mut BTreeMap<String, Node>, parts: &[&str], full_path: &str) {
    let Some((head, rest)) = parts.split_first() else {
        return;
    };
    if rest.is_empty() {
        level.entry(head.to_string()).or_insert_with(|| Node::File {
            path: full_path.to_string(),
        });
        return;
    }
    let node = level.entry(head.to_string()).or_insert_with(|| Node::Dir {
        children: BTreeMap::new(),
    });
    if let Node::Dir { children } = node {
        insert(children, rest, full_path);
    }
}

fn collect<'a>(level: &'a BTreeMap<String, Node>, out: &mut Vec<&'a str>) {
    for node in level.values() {
        match node {
            Node::File { path } => out.push(path),
            Node::Dir { children } => collect(children, out),
        }
    }
}

fn render_level(level: &BTreeMap<String, Node>, depth: usize, out: &mut String) {
    for (name, node) in level {
        let indent = "  ".repeat(depth);
        match node {
            Node::File { .. } => {
                let _ = writeln!(out, "{indent}{name}");
            }
            Node::Dir { children } => {
                let _ = writeln!(out, "{indent}{name}/");
                render_level(children, depth + 1, out);
            }
        }
    }
}
