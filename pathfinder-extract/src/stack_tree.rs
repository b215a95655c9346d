// SPDX-License-Identifier: Apache-2.0

//! Per-thread call-stack tree used by the POSIX Update-Mechanism Extractor
//! (spec §4.5): a forest of function names, each node carrying the Update
//! Mechanisms attached while walking the thread's event stream.

use crate::um::UpdateMechanism;
use std::collections::HashMap;

struct StackTreeNode {
    function: Option<String>,
    parent: Option<usize>,
    children: Vec<usize>,
    ums: Vec<UpdateMechanism>,
}

/// An index-addressed forest (spec §9 "Stack tree and UM group ownership").
/// Index 0 is always the synthetic, function-less root.
#[derive(Default)]
pub struct StackTree {
    nodes: Vec<StackTreeNode>,
}

impl StackTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![StackTreeNode { function: None, parent: None, children: Vec::new(), ums: Vec::new() }],
        }
    }

    pub fn root(&self) -> usize {
        0
    }

    /// Descends from the root along `prefix` (outer-frame-first function
    /// names), creating missing children, and returns the path including
    /// the root (`path[0] == root()`, `path[i]` is the node for `prefix[i-1]`).
    pub fn ensure_path(&mut self, prefix: &[String]) -> Vec<usize> {
        let mut path = vec![self.root()];
        let mut cur = self.root();
        for name in prefix {
            let existing = self.nodes[cur].children.iter().copied().find(|&c| self.nodes[c].function.as_deref() == Some(name.as_str()));
            let next = match existing {
                Some(c) => c,
                None => {
                    let idx = self.nodes.len();
                    self.nodes.push(StackTreeNode {
                        function: Some(name.clone()),
                        parent: Some(cur),
                        children: Vec::new(),
                        ums: Vec::new(),
                    });
                    self.nodes[cur].children.push(idx);
                    idx
                }
            };
            path.push(next);
            cur = next;
        }
        path
    }

    pub fn attach(&mut self, node: usize, um: UpdateMechanism) {
        self.nodes[node].ums.push(um);
    }

    pub fn function_of(&self, node: usize) -> Option<&str> {
        self.nodes[node].function.as_deref()
    }

    pub fn depth(&self, node: usize) -> usize {
        let mut d = 0;
        let mut cur = node;
        while let Some(p) = self.nodes[cur].parent {
            d += 1;
            cur = p;
        }
        d
    }

    /// Deletes every non-root node with no attached UMs, reparenting its
    /// children to its nearest surviving ancestor (spec §4.5 "Compaction").
    pub fn compact(&mut self) {
        let n = self.nodes.len();
        let mut keep = vec![true; n];
        for i in 1..n {
            keep[i] = !self.nodes[i].ums.is_empty();
        }

        let mut surviving_ancestor = vec![0usize; n];
        for i in 1..n {
            let mut p = self.nodes[i].parent;
            while let Some(pi) = p {
                if pi == 0 || keep[pi] {
                    surviving_ancestor[i] = pi;
                    break;
                }
                p = self.nodes[pi].parent;
            }
        }

        for node in &mut self.nodes {
            node.children.clear();
        }
        for i in 1..n {
            if keep[i] {
                let parent = surviving_ancestor[i];
                self.nodes[i].parent = Some(parent);
                self.nodes[parent].children.push(i);
            }
        }
    }

    fn collect_subtree_ums(&self, node: usize, out: &mut Vec<UpdateMechanism>) {
        out.extend(self.nodes[node].ums.iter().cloned());
        for &c in &self.nodes[node].children {
            self.collect_subtree_ums(c, out);
        }
    }

    /// Gathers, per function name, the UMs attached at every node bearing
    /// that name and every descendant of such a node, processing shallower
    /// occurrences first (spec §4.6 "Grouping per function"). A function
    /// recurring at multiple depths contributes each occurrence's subtree
    /// independently; downstream grouping (C6) treats equivalent UMs as
    /// interchangeable regardless of duplication here.
    pub fn gather_by_function(&self) -> HashMap<String, Vec<UpdateMechanism>> {
        let mut order: Vec<usize> = (1..self.nodes.len()).collect();
        order.sort_by_key(|&n| self.depth(n));

        let mut bags: HashMap<String, Vec<UpdateMechanism>> = HashMap::new();
        for n in order {
            let Some(func) = self.nodes[n].function.clone() else { continue };
            let mut ums = Vec::new();
            self.collect_subtree_ums(n, &mut ums);
            bags.entry(func).or_default().extend(ums);
        }
        bags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_path_creates_and_reuses_nodes() {
        let mut tree = StackTree::new();
        let p1 = tree.ensure_path(&["main".into(), "handler".into()]);
        let p2 = tree.ensure_path(&["main".into(), "handler".into()]);
        assert_eq!(p1, p2);
        assert_eq!(tree.function_of(p1[2]), Some("handler"));
    }

    #[test]
    fn compact_removes_empty_nodes_and_reparents_children() {
        let mut tree = StackTree::new();
        let path = tree.ensure_path(&["outer".into(), "empty".into(), "leaf".into()]);
        tree.attach(path[3], vec![0, 1]);
        tree.compact();
        // "empty" had no UMs and is dropped; "leaf" reparents to "outer".
        let outer = path[1];
        let leaf = path[3];
        assert_eq!(tree.depth(leaf), 2);
        assert_eq!(tree.depth(outer), 1);
    }

    #[test]
    fn gather_by_function_includes_descendant_ums() {
        let mut tree = StackTree::new();
        let path = tree.ensure_path(&["a".into(), "b".into()]);
        tree.attach(path[2], vec![5, 6]);
        let bags = tree.gather_by_function();
        assert_eq!(bags["a"], vec![vec![5, 6]]);
        assert_eq!(bags["b"], vec![vec![5, 6]]);
    }
}
