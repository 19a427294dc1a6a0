//! Build graph: rules, edges and global variables.
//!
//! The [`Generator`] accumulates everything that ends up in the build
//! description. Product builders never touch it directly; they return a
//! [`Fragment`] which the caller merges. Merging checks the graph invariants
//! (known rule, unique outputs, no self-references) and is all-or-nothing.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use thiserror::Error;

use crate::core::path::{BuildPath, FilePath};

/// Errors raised while constructing the graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("rule `{name}` is already defined")]
    DuplicateRule { name: String },

    #[error("edge producing `{output}` uses unknown rule `{rule}`")]
    UnknownRule { rule: String, output: String },

    #[error("edge using rule `{rule}` declares no outputs")]
    NoOutputs { rule: String },

    #[error("output `{path}` is produced twice (by rules `{first}` and `{second}`)")]
    OutputCollision {
        path: String,
        first: String,
        second: String,
    },

    #[error("edge producing `{path}` lists it as its own input")]
    SelfReference { path: String },

    #[error("`{output}` depends on `{path}`, which is neither built nor present in the source tree")]
    DanglingInput { path: String, output: String },

    #[error("dependency cycle through `{path}`")]
    Cycle { path: String },
}

/// A named command template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub name: String,
    pub command: String,
    pub description: String,
    /// Re-examine outputs after the command ran instead of assuming they
    /// were all updated.
    pub restat: bool,
    /// Compiler-generated dependency file and its format.
    pub depfile: Option<(String, String)>,
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Rule {
            name: name.into(),
            command: command.into(),
            description: description.into(),
            restat: false,
            depfile: None,
        }
    }

    pub fn restat(mut self) -> Self {
        self.restat = true;
        self
    }

    /// Let the executor read header dependencies from `path` (format `deps`).
    pub fn depfile(mut self, path: impl Into<String>, deps: impl Into<String>) -> Self {
        self.depfile = Some((path.into(), deps.into()));
        self
    }
}

/// One instantiation of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildEdge {
    rule: String,
    outs: Vec<BuildPath>,
    ins: Vec<FilePath>,
    deps: Vec<FilePath>,
    vars: Vec<(String, String)>,
}

impl BuildEdge {
    pub fn new(rule: impl Into<String>) -> Self {
        BuildEdge {
            rule: rule.into(),
            outs: Vec::new(),
            ins: Vec::new(),
            deps: Vec::new(),
            vars: Vec::new(),
        }
    }

    pub fn out(mut self, path: BuildPath) -> Self {
        self.outs.push(path);
        self
    }

    pub fn outs(mut self, paths: impl IntoIterator<Item = BuildPath>) -> Self {
        self.outs.extend(paths);
        self
    }

    /// Add a direct input. Order is kept; it is the order of `$in`.
    pub fn input(mut self, path: impl Into<FilePath>) -> Self {
        self.ins.push(path.into());
        self
    }

    pub fn inputs<P: Into<FilePath>>(mut self, paths: impl IntoIterator<Item = P>) -> Self {
        self.ins.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Add an extra dependency. It affects staleness but not the command
    /// line. Duplicates are dropped.
    pub fn dep(mut self, path: impl Into<FilePath>) -> Self {
        let path = path.into();
        if !self.deps.contains(&path) {
            self.deps.push(path);
        }
        self
    }

    pub fn deps<P: Into<FilePath>>(mut self, paths: impl IntoIterator<Item = P>) -> Self {
        for path in paths {
            self = self.dep(path);
        }
        self
    }

    /// Set an edge-local variable, replacing an earlier value.
    pub fn var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.vars.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.vars.push((name, value)),
        }
        self
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn outputs(&self) -> &[BuildPath] {
        &self.outs
    }

    pub fn ins(&self) -> &[FilePath] {
        &self.ins
    }

    pub fn dependencies(&self) -> &[FilePath] {
        &self.deps
    }

    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    pub fn get_var(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn primary(&self) -> String {
        self.outs
            .first()
            .map(|p| p.to_string())
            .unwrap_or_default()
    }

    /// Inputs and dependencies together.
    fn all_inputs(&self) -> impl Iterator<Item = &FilePath> {
        self.ins.iter().chain(self.deps.iter())
    }
}

/// The result of a product builder: new edges plus the product's path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub output: BuildPath,
    pub edges: Vec<BuildEdge>,
}

impl Fragment {
    pub fn new(output: BuildPath, edges: Vec<BuildEdge>) -> Self {
        Fragment { output, edges }
    }

    /// A fragment consisting of one edge.
    pub fn single(output: BuildPath, edge: BuildEdge) -> Self {
        Fragment {
            output,
            edges: vec![edge],
        }
    }

    /// Take over the edges of `other` and return its output.
    pub fn absorb(&mut self, other: Fragment) -> BuildPath {
        self.edges.extend(other.edges);
        other.output
    }

    /// Every output declared by this fragment.
    pub fn outputs(&self) -> impl Iterator<Item = &BuildPath> {
        self.edges.iter().flat_map(|e| e.outs.iter())
    }
}

/// Accumulates rules, edges and variables in insertion order.
#[derive(Debug, Default, Serialize)]
pub struct Generator {
    vars: Vec<(String, String)>,
    rules: Vec<Rule>,
    edges: Vec<BuildEdge>,
    #[serde(skip)]
    rule_index: HashMap<String, usize>,
    #[serde(skip)]
    producers: HashMap<BuildPath, usize>,
}

impl Generator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule. Redefinition is an error and leaves the graph as it was.
    pub fn add_rule(&mut self, rule: Rule) -> Result<(), GraphError> {
        if self.rule_index.contains_key(&rule.name) {
            return Err(GraphError::DuplicateRule { name: rule.name });
        }
        self.rule_index.insert(rule.name.clone(), self.rules.len());
        self.rules.push(rule);
        Ok(())
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rule_index.get(name).map(|&i| &self.rules[i])
    }

    /// Set a global variable. Setting it again replaces the value in place.
    pub fn add_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.vars.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.vars.push((name, value)),
        }
    }

    /// Append one edge after checking it against the graph.
    pub fn add_edge(&mut self, edge: BuildEdge) -> Result<(), GraphError> {
        self.check_edge(&edge)?;
        self.commit(edge);
        Ok(())
    }

    /// Merge a fragment. Either every edge is added or none is.
    pub fn merge(&mut self, fragment: Fragment) -> Result<BuildPath, GraphError> {
        let Fragment { output, edges } = fragment;

        let mut pending: HashMap<&BuildPath, &str> = HashMap::new();
        for edge in &edges {
            self.check_edge(edge)?;
            for out in &edge.outs {
                if let Some(first) = pending.insert(out, &edge.rule) {
                    return Err(GraphError::OutputCollision {
                        path: out.to_string(),
                        first: first.to_string(),
                        second: edge.rule.clone(),
                    });
                }
            }
        }

        for edge in edges {
            self.commit(edge);
        }
        Ok(output)
    }

    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn edges(&self) -> &[BuildEdge] {
        &self.edges
    }

    /// The edge producing `path`, if any.
    pub fn producer(&self, path: &BuildPath) -> Option<&BuildEdge> {
        self.producers.get(path).map(|&i| &self.edges[i])
    }

    pub fn is_output(&self, path: &BuildPath) -> bool {
        self.producers.contains_key(path)
    }

    /// Check that every input is either produced by an edge or exists below
    /// `root`, and that the graph is acyclic.
    pub fn validate(&self, root: &Path) -> Result<(), GraphError> {
        let mut checked: HashSet<&FilePath> = HashSet::new();
        for edge in &self.edges {
            for input in edge.all_inputs() {
                if !checked.insert(input) {
                    continue;
                }
                let present = match input {
                    FilePath::Build(p) => self.producers.contains_key(p),
                    FilePath::Source(p) => p.on_disk(root).exists(),
                };
                if !present {
                    return Err(GraphError::DanglingInput {
                        path: input.to_string(),
                        output: edge.primary(),
                    });
                }
            }
        }
        self.check_acyclic()
    }

    /// Reject dependency cycles between edges.
    pub fn check_acyclic(&self) -> Result<(), GraphError> {
        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(self.edges.len(), 0);
        let nodes: Vec<NodeIndex> = (0..self.edges.len()).map(|i| graph.add_node(i)).collect();

        for (consumer, edge) in self.edges.iter().enumerate() {
            for input in edge.all_inputs() {
                if let FilePath::Build(p) = input {
                    if let Some(&producer) = self.producers.get(p) {
                        graph.update_edge(nodes[producer], nodes[consumer], ());
                    }
                }
            }
        }

        toposort(&graph, None).map(|_| ()).map_err(|cycle| GraphError::Cycle {
            path: self.edges[graph[cycle.node_id()]].primary(),
        })
    }

    fn check_edge(&self, edge: &BuildEdge) -> Result<(), GraphError> {
        if edge.outs.is_empty() {
            return Err(GraphError::NoOutputs {
                rule: edge.rule.clone(),
            });
        }
        if !self.rule_index.contains_key(&edge.rule) {
            return Err(GraphError::UnknownRule {
                rule: edge.rule.clone(),
                output: edge.primary(),
            });
        }

        let mut own: HashSet<&BuildPath> = HashSet::new();
        for out in &edge.outs {
            if let Some(&i) = self.producers.get(out) {
                return Err(GraphError::OutputCollision {
                    path: out.to_string(),
                    first: self.edges[i].rule.clone(),
                    second: edge.rule.clone(),
                });
            }
            if !own.insert(out) {
                return Err(GraphError::OutputCollision {
                    path: out.to_string(),
                    first: edge.rule.clone(),
                    second: edge.rule.clone(),
                });
            }
        }

        for input in edge.all_inputs() {
            if let FilePath::Build(p) = input {
                if own.contains(p) {
                    return Err(GraphError::SelfReference {
                        path: p.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn commit(&mut self, edge: BuildEdge) {
        let index = self.edges.len();
        for out in &edge.outs {
            self.producers.insert(out.clone(), index);
        }
        self.edges.push(edge);
    }
}
