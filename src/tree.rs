//! Reconciled gene trees.
//!
//! A [`RecTree`] is an immutable arena whose node ids are postorder
//! indices: left subtree, right subtree, then the node itself. Every child
//! therefore has a smaller id than its parent and the root is the last
//! node. The DP tables are indexed directly by these ids.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Postorder index of a node in its tree.
pub type NodeId = usize;

/// Reconciliation event labelling a gene tree node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Event {
    GDup,
    GLos,
    Spec,
    Extant,
    Unknown,
}

impl Event {
    pub const ALL: [Event; 5] = [
        Event::GDup,
        Event::GLos,
        Event::Spec,
        Event::Extant,
        Event::Unknown,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Event::GDup => "GDup",
            Event::GLos => "GLos",
            Event::Spec => "Spec",
            Event::Extant => "Extant",
            Event::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown event type `{0}`")]
pub struct UnknownEvent(pub String);

impl FromStr for Event {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GDup" => Ok(Event::GDup),
            "GLos" | "GLoss" => Ok(Event::GLos),
            "Spec" => Ok(Event::Spec),
            "Extant" => Ok(Event::Extant),
            "Unknown" => Ok(Event::Unknown),
            other => Err(UnknownEvent(other.to_string())),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("unknown node handle {0}")]
    UnknownNode(usize),

    #[error("node `{0}` is reachable more than once")]
    SharedNode(String),

    #[error("node `{label}` has {count} children, at most 2 are allowed")]
    TooManyChildren { label: String, count: usize },
}

#[derive(Clone, Debug)]
struct Node {
    label: String,
    species: String,
    event: Event,
    left: Option<NodeId>,
    right: Option<NodeId>,
    parent: Option<NodeId>,
    non_dup: usize,
}

/// A rooted binary gene tree reconciled with a species tree.
#[derive(Clone, Debug)]
pub struct RecTree {
    nodes: Vec<Node>,
}

impl RecTree {
    pub fn builder() -> RecTreeBuilder {
        RecTreeBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> NodeId {
        self.nodes.len() - 1
    }

    /// All node ids in postorder.
    pub fn postorder(&self) -> std::ops::Range<NodeId> {
        0..self.nodes.len()
    }

    pub fn label(&self, node: NodeId) -> &str {
        &self.nodes[node].label
    }

    /// Gene name used for extant adjacencies: the label up to the first `|`.
    pub fn gene_name(&self, node: NodeId) -> &str {
        let label = self.label(node);
        label.split('|').next().unwrap_or(label)
    }

    pub fn species(&self, node: NodeId) -> &str {
        &self.nodes[node].species
    }

    pub fn event(&self, node: NodeId) -> Event {
        self.nodes[node].event
    }

    pub fn left(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].left
    }

    pub fn right(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].right
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].parent
    }

    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.left(node).is_none() && self.right(node).is_none()
    }

    pub fn is_left_child(&self, node: NodeId) -> bool {
        self.parent(node)
            .is_some_and(|p| self.nodes[p].left == Some(node))
    }

    pub fn is_right_child(&self, node: NodeId) -> bool {
        self.parent(node)
            .is_some_and(|p| self.nodes[p].right == Some(node))
    }

    /// The other child of this node's parent.
    pub fn sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        if self.nodes[parent].left == Some(node) {
            self.nodes[parent].right
        } else {
            self.nodes[parent].left
        }
    }

    /// Number of nodes in the subtree rooted at `node` that are not duplications.
    pub fn non_dup_count(&self, node: NodeId) -> usize {
        self.nodes[node].non_dup
    }

    /// Node ids grouped by height (leaves first). A node only depends on
    /// nodes of strictly smaller height.
    pub fn height_levels(&self) -> Vec<Vec<NodeId>> {
        let mut height = vec![0usize; self.len()];
        let mut levels: Vec<Vec<NodeId>> = Vec::new();
        for node in self.postorder() {
            let h = [self.left(node), self.right(node)]
                .into_iter()
                .flatten()
                .map(|c| height[c] + 1)
                .max()
                .unwrap_or(0);
            height[node] = h;
            if levels.len() <= h {
                levels.resize_with(h + 1, Vec::new);
            }
            levels[h].push(node);
        }
        levels
    }

    /// Node ids grouped by depth (root first).
    pub fn depth_levels(&self) -> Vec<Vec<NodeId>> {
        let mut depth = vec![0usize; self.len()];
        let mut levels: Vec<Vec<NodeId>> = Vec::new();
        for node in self.postorder().rev() {
            let d = self.parent(node).map_or(0, |p| depth[p] + 1);
            depth[node] = d;
            if levels.len() <= d {
                levels.resize_with(d + 1, Vec::new);
            }
            levels[d].push(node);
        }
        levels
    }
}

/// Opaque reference to a node added to a [`RecTreeBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(usize);

#[derive(Clone, Debug)]
struct PendingNode {
    label: String,
    species: String,
    event: Event,
    children: Vec<Handle>,
}

/// Bottom-up construction of a [`RecTree`]. Nodes may be added in any
/// order; [`RecTreeBuilder::build`] renumbers them in postorder.
#[derive(Clone, Debug, Default)]
pub struct RecTreeBuilder {
    pending: Vec<PendingNode>,
}

impl RecTreeBuilder {
    pub fn leaf(
        &mut self,
        label: impl Into<String>,
        species: impl Into<String>,
        event: Event,
    ) -> Handle {
        self.node(label, species, event, &[])
    }

    /// Add a node with up to two children. A single child is the left child.
    pub fn node(
        &mut self,
        label: impl Into<String>,
        species: impl Into<String>,
        event: Event,
        children: &[Handle],
    ) -> Handle {
        self.pending.push(PendingNode {
            label: label.into(),
            species: species.into(),
            event,
            children: children.to_vec(),
        });
        Handle(self.pending.len() - 1)
    }

    /// Number the subtree under `root` in postorder. Nodes not reachable
    /// from `root` are dropped.
    pub fn build(self, root: Handle) -> Result<RecTree, TreeError> {
        let mut ids: Vec<Option<NodeId>> = vec![None; self.pending.len()];
        let mut seen = vec![false; self.pending.len()];
        let mut nodes: Vec<Node> = Vec::with_capacity(self.pending.len());
        let mut stack = vec![(root, false)];

        while let Some((Handle(h), expanded)) = stack.pop() {
            let pending = self.pending.get(h).ok_or(TreeError::UnknownNode(h))?;
            if !expanded {
                if seen[h] {
                    return Err(TreeError::SharedNode(pending.label.clone()));
                }
                seen[h] = true;
                if pending.children.len() > 2 {
                    return Err(TreeError::TooManyChildren {
                        label: pending.label.clone(),
                        count: pending.children.len(),
                    });
                }
                stack.push((Handle(h), true));
                for &child in pending.children.iter().rev() {
                    stack.push((child, false));
                }
                continue;
            }

            let child_id = |k: usize| pending.children.get(k).and_then(|c| ids[c.0]);
            let left = child_id(0);
            let right = child_id(1);
            let non_dup = usize::from(pending.event != Event::GDup)
                + left.map_or(0, |c| nodes[c].non_dup)
                + right.map_or(0, |c| nodes[c].non_dup);
            let id = nodes.len();
            nodes.push(Node {
                label: pending.label.clone(),
                species: pending.species.clone(),
                event: pending.event,
                left,
                right,
                parent: None,
                non_dup,
            });
            ids[h] = Some(id);
        }

        for id in 0..nodes.len() {
            for child in [nodes[id].left, nodes[id].right].into_iter().flatten() {
                nodes[child].parent = Some(id);
            }
        }

        Ok(RecTree { nodes })
    }
}
