//! Comment threads stored as an arena: comments live in one `Vec`, and the
//! parent/child links are indices into it.

use std::collections::HashMap;

use crate::models::Comment;

#[derive(Debug, Default)]
pub struct CommentTree {
    nodes: Vec<Comment>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
}

impl CommentTree {
    /// Builds the tree from a flat list. Siblings are ordered by time, then id.
    /// A comment whose parent is not in the list is treated as a root.
    pub fn build(mut comments: Vec<Comment>) -> Self {
        comments.sort_by(|a, b| a.time.cmp(&b.time).then(a.id.cmp(&b.id)));

        let index: HashMap<i64, usize> = comments.iter().enumerate().map(|(i, c)| (c.id, i)).collect();

        let mut children = vec![Vec::new(); comments.len()];
        let mut roots = Vec::new();

        for (i, comment) in comments.iter().enumerate() {
            match comment.parent_id.and_then(|p| index.get(&p).copied()) {
                Some(parent) if parent != i => {
                    children[parent].push(i);
                }
                _ => roots.push(i),
            }
        }

        Self { nodes: comments, children, roots }
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn children_of(&self, idx: usize) -> &[usize] {
        self.children.get(idx).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Depth-first walk: each comment is followed by its replies.
    pub fn threaded(&self) -> Vec<(usize, &Comment)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, usize)> = self.roots().iter().rev().map(|&r| (r, 0)).collect();

        while let Some((idx, depth)) = stack.pop() {
            out.push((depth, &self.nodes[idx]));
            for &child in self.children_of(idx).iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        out
    }
}
