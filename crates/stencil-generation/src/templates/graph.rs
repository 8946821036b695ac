//! Inheritance graph
//!
//! Tracks parent/child links between template ids. The graph is a forest:
//! every mutation is checked first with [`InheritanceGraph::check_insert`],
//! which rejects cycles and chains deeper than the configured maximum without
//! touching the graph.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::{CompositionError, Result};

/// Default maximum inheritance depth
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// One template in the inheritance graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InheritanceNode {
    pub id: String,
    pub parent: Option<String>,
    /// Ids that declare this node as their parent, including forward references
    pub children: BTreeSet<String>,
    /// Number of `extends` hops to the root; a missing parent counts as one hop
    pub depth: usize,
}

#[derive(Debug, Clone)]
pub struct InheritanceGraph {
    nodes: HashMap<String, InheritanceNode>,
    max_depth: usize,
}

impl InheritanceGraph {
    pub fn new(max_depth: usize) -> Self {
        Self {
            nodes: HashMap::new(),
            max_depth,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn node(&self, id: &str) -> Option<&InheritanceNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check that linking `id` to `parent` keeps the graph acyclic and
    /// within the depth limit, for `id` and all of its descendants
    pub fn check_insert(&self, id: &str, parent: Option<&str>) -> Result<()> {
        let depth = self.depth_with(id, parent)?;

        let mut queue: VecDeque<(String, usize)> = self
            .children_of(id)
            .into_iter()
            .map(|child| (child, depth + 1))
            .collect();
        let mut seen = HashSet::new();
        while let Some((child, child_depth)) = queue.pop_front() {
            if !seen.insert(child.clone()) {
                continue;
            }
            if child_depth > self.max_depth {
                return Err(CompositionError::InheritanceTooDeep {
                    id: child,
                    depth: child_depth,
                    max_depth: self.max_depth,
                });
            }
            for grandchild in self.children_of(&child) {
                queue.push_back((grandchild, child_depth + 1));
            }
        }

        Ok(())
    }

    /// Link `id` to `parent`, updating child sets and subtree depths
    ///
    /// Callers must have run [`check_insert`](Self::check_insert) first.
    pub fn insert(&mut self, id: &str, parent: Option<&str>) {
        let previous_parent = self.nodes.get(id).and_then(|node| node.parent.clone());
        if previous_parent.as_deref() != parent {
            if let Some(old) = previous_parent.and_then(|old| self.nodes.get_mut(&old)) {
                old.children.remove(id);
            }
        }

        let children: BTreeSet<String> = self.children_of(id).into_iter().collect();
        let depth = match parent {
            None => 0,
            Some(parent_id) => match self.nodes.get_mut(parent_id) {
                Some(parent_node) => {
                    parent_node.children.insert(id.to_string());
                    parent_node.depth + 1
                }
                None => 1,
            },
        };

        self.nodes.insert(
            id.to_string(),
            InheritanceNode {
                id: id.to_string(),
                parent: parent.map(str::to_string),
                children,
                depth,
            },
        );
        self.refresh_depths(id);
    }

    /// Ids of every transitive descendant of `id`, breadth-first
    pub fn descendants(&self, id: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<String> = self.children_of(id).into_iter().collect();

        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            queue.extend(self.children_of(&current));
            result.push(current);
        }
        result
    }

    /// `id` followed by its descendants; the region a change to `id` affects
    pub fn lineage(&self, id: &str) -> Vec<String> {
        let mut lineage = vec![id.to_string()];
        lineage.extend(self.descendants(id));
        lineage
    }

    /// Ids on the chain from `id` up to its root, leaf first
    pub fn ancestors(&self, id: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.nodes.get(id).and_then(|node| node.parent.clone());
        while let Some(parent) = current {
            if !seen.insert(parent.clone()) {
                break;
            }
            current = self.nodes.get(&parent).and_then(|node| node.parent.clone());
            chain.push(parent);
        }
        chain
    }

    /// Ids whose declared parent is `id`, sorted
    fn children_of(&self, id: &str) -> Vec<String> {
        let mut children: Vec<String> = self
            .nodes
            .values()
            .filter(|node| node.parent.as_deref() == Some(id))
            .map(|node| node.id.clone())
            .collect();
        children.sort();
        children
    }

    /// Depth of `id` if it were linked to `parent`; walks the chain marking
    /// ids in progress and fails on revisiting one
    fn depth_with(&self, id: &str, parent: Option<&str>) -> Result<usize> {
        let mut path = vec![id.to_string()];
        let mut in_progress: HashSet<&str> = HashSet::from([id]);
        let mut current = parent;
        let mut depth = 0;

        while let Some(next) = current {
            depth += 1;
            path.push(next.to_string());
            if !in_progress.insert(next) {
                return Err(CompositionError::CircularInheritance { path });
            }
            if depth > self.max_depth {
                return Err(CompositionError::InheritanceTooDeep {
                    id: id.to_string(),
                    depth,
                    max_depth: self.max_depth,
                });
            }
            current = self.nodes.get(next).and_then(|node| node.parent.as_deref());
        }

        Ok(depth)
    }

    fn refresh_depths(&mut self, id: &str) {
        let Some(base) = self.nodes.get(id).map(|node| node.depth) else {
            return;
        };
        let mut queue: VecDeque<(String, usize)> = self
            .children_of(id)
            .into_iter()
            .map(|child| (child, base + 1))
            .collect();
        let mut seen = HashSet::new();
        while let Some((child, depth)) = queue.pop_front() {
            if !seen.insert(child.clone()) {
                continue;
            }
            let grandchildren = self.children_of(&child);
            if let Some(node) = self.nodes.get_mut(&child) {
                node.depth = depth;
                node.children = grandchildren.iter().cloned().collect();
            }
            queue.extend(grandchildren.into_iter().map(|g| (g, depth + 1)));
        }
    }
}

impl Default for InheritanceGraph {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(graph: &mut InheritanceGraph, id: &str, parent: Option<&str>) -> Result<()> {
        graph.check_insert(id, parent)?;
        graph.insert(id, parent);
        Ok(())
    }

    #[test]
    fn test_depths_and_children() {
        let mut graph = InheritanceGraph::default();
        link(&mut graph, "base", None).unwrap();
        link(&mut graph, "page", Some("base")).unwrap();
        link(&mut graph, "login", Some("page")).unwrap();

        assert_eq!(graph.node("base").unwrap().depth, 0);
        assert_eq!(graph.node("login").unwrap().depth, 2);
        assert!(graph.node("base").unwrap().children.contains("page"));
        assert_eq!(graph.ancestors("login"), vec!["page", "base"]);
    }

    #[test]
    fn test_forward_reference_attaches_later() {
        let mut graph = InheritanceGraph::default();
        link(&mut graph, "child", Some("parent")).unwrap();
        assert_eq!(graph.node("child").unwrap().depth, 1);

        link(&mut graph, "root", None).unwrap();
        link(&mut graph, "parent", Some("root")).unwrap();
        assert!(graph.node("parent").unwrap().children.contains("child"));
        assert_eq!(graph.node("child").unwrap().depth, 2);
    }

    #[test]
    fn test_cycle_reports_path() {
        let mut graph = InheritanceGraph::default();
        link(&mut graph, "a", Some("b")).unwrap();
        link(&mut graph, "b", Some("c")).unwrap();

        match graph.check_insert("c", Some("a")) {
            Err(CompositionError::CircularInheritance { path }) => {
                assert_eq!(path, vec!["c", "a", "b", "c"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(!graph.contains("c"));
    }

    #[test]
    fn test_depth_limit() {
        let mut graph = InheritanceGraph::new(2);
        link(&mut graph, "t0", None).unwrap();
        link(&mut graph, "t1", Some("t0")).unwrap();
        link(&mut graph, "t2", Some("t1")).unwrap();
        assert!(matches!(
            graph.check_insert("t3", Some("t2")),
            Err(CompositionError::InheritanceTooDeep { depth: 3, .. })
        ));
    }

    #[test]
    fn test_depth_limit_counts_descendants() {
        let mut graph = InheritanceGraph::new(2);
        link(&mut graph, "b", Some("a")).unwrap();
        link(&mut graph, "c", Some("b")).unwrap();
        link(&mut graph, "x", None).unwrap();
        link(&mut graph, "y", Some("x")).unwrap();
        // linking a under y would put c at depth 4
        assert!(matches!(
            graph.check_insert("a", Some("y")),
            Err(CompositionError::InheritanceTooDeep { .. })
        ));
    }

    #[test]
    fn test_descendants_breadth_first() {
        let mut graph = InheritanceGraph::default();
        link(&mut graph, "root", None).unwrap();
        link(&mut graph, "b", Some("root")).unwrap();
        link(&mut graph, "a", Some("root")).unwrap();
        link(&mut graph, "a1", Some("a")).unwrap();

        assert_eq!(graph.descendants("root"), vec!["a", "b", "a1"]);
        assert_eq!(graph.lineage("a"), vec!["a", "a1"]);
    }

    #[test]
    fn test_reparenting_moves_child() {
        let mut graph = InheritanceGraph::default();
        link(&mut graph, "p1", None).unwrap();
        link(&mut graph, "p2", None).unwrap();
        link(&mut graph, "c", Some("p1")).unwrap();
        link(&mut graph, "c", Some("p2")).unwrap();

        assert!(!graph.node("p1").unwrap().children.contains("c"));
        assert!(graph.node("p2").unwrap().children.contains("c"));
    }
}
