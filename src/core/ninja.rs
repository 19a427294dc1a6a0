//! Ninja serialization of the build graph.
//!
//! Emission order equals insertion order: global variables, then rules, then
//! edges. Nothing is timestamped, so the same graph always produces the same
//! bytes.

use crate::core::graph::{BuildEdge, Generator, Rule};

const HEADER: &str = "# Generated by tilegen. Do not edit.\n";

/// Render the whole graph.
pub fn to_ninja(gen: &Generator) -> String {
    let mut out = String::with_capacity(64 * (gen.edges().len() + gen.rules().len() + 1));
    out.push_str(HEADER);
    out.push('\n');

    if !gen.vars().is_empty() {
        for (name, value) in gen.vars() {
            binding(&mut out, "", name, &escape_value(value));
        }
        out.push('\n');
    }

    for rule in gen.rules() {
        write_rule(&mut out, rule);
    }

    for edge in gen.edges() {
        write_edge(&mut out, edge);
    }

    out
}

/// One `name = value` line, indented by `indent`.
fn binding(out: &mut String, indent: &str, name: &str, value: &str) {
    out.push_str(&format!("{indent}{name} = {value}\n"));
}

fn write_rule(out: &mut String, rule: &Rule) {
    out.push_str(&format!("rule {}\n", rule.name));
    binding(out, "  ", "command", &rule.command);
    binding(out, "  ", "description", &rule.description);
    if let Some((depfile, deps)) = &rule.depfile {
        binding(out, "  ", "depfile", depfile);
        binding(out, "  ", "deps", deps);
    }
    if rule.restat {
        binding(out, "  ", "restat", "1");
    }
    out.push('\n');
}

fn write_edge(out: &mut String, edge: &BuildEdge) {
    out.push_str("build");
    for o in edge.outputs() {
        out.push(' ');
        out.push_str(&escape_path(o.as_str()));
    }
    out.push_str(": ");
    out.push_str(edge.rule());
    for i in edge.ins() {
        out.push(' ');
        out.push_str(&escape_path(i.as_str()));
    }
    if !edge.dependencies().is_empty() {
        out.push_str(" |");
        for d in edge.dependencies() {
            out.push(' ');
            out.push_str(&escape_path(d.as_str()));
        }
    }
    out.push('\n');
    for (name, value) in edge.vars() {
        binding(out, "  ", name, &escape_value(value));
    }
    out.push('\n');
}

/// Escape a path for use in a `build` line.
fn escape_path(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '$' => escaped.push_str("$$"),
            ' ' => escaped.push_str("$ "),
            ':' => escaped.push_str("$:"),
            '\n' => escaped.push_str("$\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Escape a literal variable value.
fn escape_value(value: &str) -> String {
    value.replace('$', "$$").replace('\n', " ")
}
