// pybundle-core/src/analyzer/imports.rs
//! Extracts imported top-level module names from Python source.
use std::path::Path;

use pybundle_common::error::{BundleError, Result};
use rustpython_parser::ast::{self, ExceptHandler, Stmt};
use rustpython_parser::Parse;

/// One imported top-level name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedName {
    /// First dotted segment, lower-cased.
    pub name: String,
    /// Came from a `from . import x` / `from .x import y` statement.
    pub relative: bool,
}

/// Parses `source` and returns every imported top-level name in statement
/// order, including imports nested in functions, classes and control flow.
pub fn imported_names(source: &str, path: &Path) -> Result<Vec<ImportedName>> {
    let path_str = path.to_string_lossy();
    let suite = ast::Suite::parse(source, &path_str)
        .map_err(|e| BundleError::Syntax(path_str.to_string(), e.to_string()))?;
    let mut out = Vec::new();
    walk(&suite, &mut out);
    Ok(out)
}

fn top_segment(dotted: &str) -> String {
    dotted.split('.').next().unwrap_or_default().to_lowercase()
}

fn walk(body: &[Stmt], out: &mut Vec<ImportedName>) {
    for stmt in body {
        match stmt {
            Stmt::Import(node) => {
                for alias in &node.names {
                    out.push(ImportedName {
                        name: top_segment(alias.name.as_str()),
                        relative: false,
                    });
                }
            }
            Stmt::ImportFrom(node) => {
                let relative = node.level.map(|l| l.to_u32() > 0).unwrap_or(false);
                match &node.module {
                    Some(module) => out.push(ImportedName {
                        name: top_segment(module.as_str()),
                        relative,
                    }),
                    // `from . import a, b` names sibling modules directly.
                    None => out.extend(node.names.iter().map(|alias| ImportedName {
                        name: top_segment(alias.name.as_str()),
                        relative: true,
                    })),
                }
            }
            Stmt::FunctionDef(node) => walk(&node.body, out),
            Stmt::AsyncFunctionDef(node) => walk(&node.body, out),
            Stmt::ClassDef(node) => walk(&node.body, out),
            Stmt::For(node) => {
                walk(&node.body, out);
                walk(&node.orelse, out);
            }
            Stmt::AsyncFor(node) => {
                walk(&node.body, out);
                walk(&node.orelse, out);
            }
            Stmt::While(node) => {
                walk(&node.body, out);
                walk(&node.orelse, out);
            }
            Stmt::If(node) => {
                walk(&node.body, out);
                walk(&node.orelse, out);
            }
            Stmt::With(node) => walk(&node.body, out),
            Stmt::AsyncWith(node) => walk(&node.body, out),
            Stmt::Match(node) => {
                for case in &node.cases {
                    walk(&case.body, out);
                }
            }
            Stmt::Try(node) => {
                walk(&node.body, out);
                walk_handlers(&node.handlers, out);
                walk(&node.orelse, out);
                walk(&node.finalbody, out);
            }
            Stmt::TryStar(node) => {
                walk(&node.body, out);
                walk_handlers(&node.handlers, out);
                walk(&node.orelse, out);
                walk(&node.finalbody, out);
            }
            _ => {}
        }
    }
}

fn walk_handlers(handlers: &[ExceptHandler], out: &mut Vec<ImportedName>) {
    for handler in handlers {
        let ExceptHandler::ExceptHandler(h) = handler;
        walk(&h.body, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(src: &str) -> Vec<String> {
        imported_names(src, Path::new("t.py"))
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect()
    }

    #[test]
    fn collects_nested_and_dotted_imports() {
        let src = r#"
import os, PIL.Image
from matplotlib import pyplot as plt

def main():
    import requests
    try:
        import ujson as json
    except ImportError:
        import simplejson
    finally:
        pass

class App:
    def run(self):
        if True:
            from yaml import safe_load
"#;
        assert_eq!(
            names(src),
            vec!["os", "pil", "matplotlib", "requests", "ujson", "simplejson", "yaml"]
        );
    }

    #[test]
    fn marks_relative_imports() {
        let parsed = imported_names("from . import helpers\nfrom .core import x\n", Path::new("t.py"))
            .unwrap();
        assert_eq!(
            parsed,
            vec![
                ImportedName {
                    name: "helpers".to_string(),
                    relative: true
                },
                ImportedName {
                    name: "core".to_string(),
                    relative: true
                },
            ]
        );
    }

    #[test]
    fn syntax_errors_are_reported() {
        let err = imported_names("def broken(:\n", Path::new("bad.py")).unwrap_err();
        assert!(matches!(err, BundleError::Syntax(ref p, _) if p == "bad.py"));
    }
}
