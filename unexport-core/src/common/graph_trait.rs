//! Breadth-first closure over any package graph.

use std::collections::{BTreeSet, VecDeque};

/// A directed graph whose nodes can be walked breadth-first.
///
/// Implementors only supply adjacency; the closure walk is shared by the
/// import graph (who imports whom) and its reverse (who is imported by whom).
pub trait GraphTraversal {
    type Node: Clone + Ord;

    /// Outgoing edges of `node`, empty when the node is unknown.
    fn neighbors(&self, node: &Self::Node) -> Vec<Self::Node>;

    fn contains_node(&self, node: &Self::Node) -> bool;

    /// Every node reachable from `roots`, the roots included.
    ///
    /// Roots absent from the graph are skipped. Each node and edge is visited
    /// at most once, however many roots are given.
    fn closure_from<I>(&self, roots: I) -> BTreeSet<Self::Node>
    where
        I: IntoIterator<Item = Self::Node>,
    {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();

        for root in roots {
            if self.contains_node(&root) && visited.insert(root.clone()) {
                queue.push_back(root);
            }
        }

        while let Some(node) = queue.pop_front() {
            for next in self.neighbors(&node) {
                if visited.insert(next.clone()) {
                    queue.push_back(next);
                }
            }
        }

        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    /// Package path → paths it points at.
    #[derive(Default)]
    struct Edges(BTreeMap<String, Vec<String>>);

    impl Edges {
        fn edge(mut self, from: &str, to: &str) -> Self {
            self.0.entry(to.to_string()).or_default();
            self.0.entry(from.to_string()).or_default().push(to.to_string());
            self
        }

        fn node(mut self, name: &str) -> Self {
            self.0.entry(name.to_string()).or_default();
            self
        }
    }

    impl GraphTraversal for Edges {
        type Node = String;

        fn neighbors(&self, node: &String) -> Vec<String> {
            self.0.get(node).cloned().unwrap_or_default()
        }

        fn contains_node(&self, node: &String) -> bool {
            self.0.contains_key(node)
        }
    }

    fn names(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_closure_includes_root() {
        let graph = Edges::default().node("m/a");
        let closure = graph.closure_from(["m/a".to_string()]);
        assert_eq!(names(&closure), vec!["m/a"]);
    }

    #[test]
    fn test_closure_follows_chain() {
        let graph = Edges::default().edge("m/a", "m/b").edge("m/b", "m/c").node("m/d");
        let closure = graph.closure_from(["m/a".to_string()]);
        assert_eq!(names(&closure), vec!["m/a", "m/b", "m/c"]);
    }

    #[test]
    fn test_closure_terminates_on_cycle() {
        let graph = Edges::default().edge("m/a", "m/b").edge("m/b", "m/a");
        let closure = graph.closure_from(["m/b".to_string()]);
        assert_eq!(names(&closure), vec!["m/a", "m/b"]);
    }

    #[test]
    fn test_closure_multiple_roots_and_missing() {
        let graph = Edges::default().edge("m/a", "m/b").edge("m/c", "m/d");
        let closure = graph.closure_from(["m/a".to_string(), "m/c".to_string(), "m/x".to_string()]);
        assert_eq!(names(&closure), vec!["m/a", "m/b", "m/c", "m/d"]);
    }

    #[test]
    fn test_empty_roots() {
        let graph = Edges::default().node("m/a");
        assert!(graph.closure_from(Vec::<String>::new()).is_empty());
    }
}
