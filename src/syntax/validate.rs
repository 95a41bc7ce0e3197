//! Tree walking and structural validation

use crate::finding::{Finding, FindingKind, Severity};

use super::ast::{CommandNode, Node, NodeKind};

/// Pre-order traversal. Returning false from the visitor skips that
/// node's children.
pub fn walk<'a, F>(node: &'a Node, visitor: &mut F)
where
    F: FnMut(&'a Node) -> bool,
{
    if !visitor(node) {
        return;
    }
    for child in node.children() {
        walk(child, visitor);
    }
}

/// Every node of the given kind, in pre-order
pub fn find(root: &Node, kind: NodeKind) -> Vec<&Node> {
    let mut found = Vec::new();
    walk(root, &mut |node| {
        if node.kind() == kind {
            found.push(node);
        }
        true
    });
    found
}

/// Every simple command, including those nested in substitutions
pub fn commands(root: &Node) -> Vec<&CommandNode> {
    find(root, NodeKind::Command)
        .into_iter()
        .filter_map(|node| match node {
            Node::Command(cmd) => Some(cmd),
            _ => None,
        })
        .collect()
}

/// Run every node's local checks. Strict mode also flags backticks.
pub fn validate_tree(root: &Node, strict: bool) -> Vec<Finding> {
    let mut findings = Vec::new();
    walk(root, &mut |node| {
        findings.extend(node.validate());
        if strict {
            if let Node::Subshell(sub) = node {
                if sub.backtick {
                    findings.push(
                        Finding::new(
                            FindingKind::Deprecated,
                            Severity::Warning,
                            "Backticks for command substitution are deprecated",
                        )
                        .at(sub.position)
                        .with_suggestion("Use $(...) instead of `...`"),
                    );
                }
            }
        }
        true
    });
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;

    #[test]
    fn test_walk_visits_every_node_once() {
        let ast = parse("a | b; c && d").unwrap();
        let mut kinds = Vec::new();
        walk(&ast.root, &mut |node| {
            kinds.push(node.kind());
            true
        });
        assert_eq!(
            kinds,
            vec![
                NodeKind::List,
                NodeKind::Pipeline,
                NodeKind::Command,
                NodeKind::Command,
                NodeKind::And,
                NodeKind::Command,
                NodeKind::Command,
            ]
        );
    }

    #[test]
    fn test_find_nested_commands() {
        let ast = parse("echo $(rm -rf x) `ls`").unwrap();
        let names: Vec<&str> = commands(&ast.root).iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "rm", "ls"]);
    }

    #[test]
    fn test_validate_tree_collects_from_children() {
        let ast = parse("echo ${1abc} > ").unwrap();
        let messages: Vec<String> = validate_tree(&ast.root, false)
            .into_iter()
            .map(|f| f.message)
            .collect();
        assert_eq!(
            messages,
            vec!["Invalid variable name: 1abc", "Missing redirect target"]
        );
    }

    #[test]
    fn test_strict_mode_flags_backticks() {
        let ast = parse("echo `date`").unwrap();
        assert!(validate_tree(&ast.root, false).is_empty());
        let strict = validate_tree(&ast.root, true);
        assert_eq!(strict.len(), 1);
        assert_eq!(strict[0].kind, FindingKind::Deprecated);
        assert_eq!(strict[0].severity, Severity::Warning);
    }
}
