//! Plain-text rendering of the parameter tree and the run status.

use crate::orchestrator::{OutputStatus, Status};
use crate::param::{Constraint, Field, Group, Node, NodeRef, ParamError, ParamPath, ParamTree};
use crate::params::models_for;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Render the whole tree.
pub(crate) fn render_tree(tree: &ParamTree) -> TextSummary {
    let mut lines = Vec::new();
    push_group(tree, tree.root(), &ParamPath::root(), 0, &mut lines);
    TextSummary { lines }
}

/// Render the node at `path`: a group with its fields, or one field with its
/// documentation.
pub(crate) fn render_node(tree: &ParamTree, path: &ParamPath) -> Result<TextSummary, ParamError> {
    let mut lines = Vec::new();
    match tree.get(path)? {
        NodeRef::Group(group) => {
            if !path.is_root() {
                lines.push(format!("{} [{}]", group.title(), path));
            }
            let depth = usize::from(!path.is_root());
            push_group(tree, group, path, depth, &mut lines);
        }
        NodeRef::Field(field) => {
            lines.push(field_line(field, path));
            lines.push(format!("  type: {}, default: {}", field.value_type(), field.default_value()));
            if let Some(constraint) = constraint_text(tree, field) {
                lines.push(format!("  allowed: {constraint}"));
            }
            lines.extend(field.doc().lines().map(|l| format!("  {}", l.trim())));
        }
    }
    Ok(TextSummary { lines })
}

fn push_group(
    tree: &ParamTree,
    group: &Group,
    path: &ParamPath,
    depth: usize,
    lines: &mut Vec<String>,
) {
    let indent = "  ".repeat(depth);
    for child in group.children() {
        let child_path = path.child(child.key());
        match child {
            Node::Group(g) => {
                lines.push(format!("{indent}{} [{}]", g.title(), child_path));
                push_group(tree, g, &child_path, depth + 1, lines);
            }
            Node::Field(f) => {
                let mut line = format!("{indent}{}", field_line(f, &child_path));
                if let Some(constraint) = constraint_text(tree, f) {
                    line.push_str(&format!("  {constraint}"));
                }
                lines.push(line);
            }
        }
    }
}

fn field_line(field: &Field, path: &ParamPath) -> String {
    match field.value_label() {
        Some(label) => format!("{} ({path}) = {} ({label})", field.label(), field.value()),
        None => format!("{} ({path}) = {}", field.label(), field.value()),
    }
}

fn constraint_text(tree: &ParamTree, field: &Field) -> Option<String> {
    match field.constraint() {
        Constraint::None => None,
        Constraint::Range(range) => Some(range.to_string()),
        Constraint::Choices(choices) => {
            // Model choices are narrowed to the selected alphabet.
            let offered: Option<&[&str]> = (field.key() == "ml_model")
                .then(|| tree.find_by_name("ncodes"))
                .flatten()
                .and_then(|p| tree.value(&p).ok())
                .map(models_for);
            let items: Vec<String> = choices
                .iter()
                .filter(|c| {
                    offered.map_or(true, |o| c.value.as_str().is_some_and(|v| o.contains(&v)))
                })
                .map(|c| format!("{} {}", c.value, c.label))
                .collect();
            Some(format!("{{{}}}", items.join(" | ")))
        }
    }
}

/// One line describing the run state.
pub(crate) fn render_status(status: &Status) -> String {
    match status {
        Status::Running { job, input } => format!("running job {job} on {}", input.display()),
        Status::Idle { input, output } => {
            let input = match input {
                Some(p) => p.display().to_string(),
                None => "no input".into(),
            };
            let output = match output {
                OutputStatus::None => "no result".to_string(),
                OutputStatus::Complete { .. } => "tree ready".to_string(),
                OutputStatus::Outdated { .. } => {
                    "tree ready (outdated: parameters changed since the run)".to_string()
                }
                OutputStatus::Failed { reason } => format!("failed: {reason}"),
            };
            format!("idle, {input}, {output}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::fasttree_params;
    use std::path::PathBuf;

    #[test]
    fn tree_lists_groups_and_fields() {
        let tree = fasttree_params().unwrap();
        let lines = render_tree(&tree).lines;
        assert_eq!(lines[0], "Sequence [sequence]");
        assert_eq!(
            lines[1],
            "  Type (sequence.ncodes) = 4 (Nucleotide)  {4 Nucleotide | 20 Protein}"
        );
        assert!(lines
            .iter()
            .any(|l| l == "  CAT number (model.ncat) = 20  [1, inf)"));
    }

    #[test]
    fn model_choices_follow_alphabet() {
        let mut tree = fasttree_params().unwrap();
        let lines = render_tree(&tree).lines;
        assert!(lines
            .iter()
            .any(|l| l.starts_with("  ML model") && l.ends_with("{jc JC | gtr GTR}")));

        tree.set_value(&ParamPath::from(["sequence", "ncodes"]), 20)
            .unwrap();
        let lines = render_tree(&tree).lines;
        assert!(lines
            .iter()
            .any(|l| l.ends_with("{jtt JTT | wag WAG | lg LG}")));
    }

    #[test]
    fn field_view_includes_doc() {
        let tree = fasttree_params().unwrap();
        let lines = render_node(&tree, &ParamPath::from(["model", "ncat"]))
            .unwrap()
            .lines;
        assert_eq!(lines[0], "CAT number (model.ncat) = 20");
        assert_eq!(lines[1], "  type: integer, default: 20");
        assert_eq!(lines[2], "  allowed: [1, inf)");
        assert_eq!(lines[3], "  The number of rate categories of sites.");
        assert!(render_node(&tree, &ParamPath::from(["nope"])).is_err());
    }

    #[test]
    fn status_lines() {
        let status = Status::Idle {
            input: Some(PathBuf::from("a.fasta")),
            output: OutputStatus::Failed {
                reason: "exit status: 1".into(),
            },
        };
        assert_eq!(render_status(&status), "idle, a.fasta, failed: exit status: 1");
    }
}
