//! The in-memory category tree and every operation that mutates it.

use crate::error::{GraphError, GraphResult, NodeKind};
use crate::model::{
    category_key, Adjacency, Amount, Edge, GraphView, LeafMeta, Node, NodeIndex, ROOT,
};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Field changes for [`GraphEngine::edit_leaf`]. `None` leaves the field as it is.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct LeafEdit {
    pub name: Option<String>,
    pub cost: Option<Amount>,
    /// Moves the leaf to the category with this name, creating it under the root if needed.
    pub category: Option<String>,
}

/// Where a category name resolves to, before anything is mutated.
#[derive(Debug, Clone, Eq, PartialEq)]
enum Target {
    Existing(NodeIndex),
    New(String),
}

impl Target {
    /// The category a node lands under. A new category is created under the root, and its own
    /// cost is the single child's, so only the root sees an extra term.
    fn cost_parent(&self) -> NodeIndex {
        match self {
            Target::Existing(index) => *index,
            Target::New(_) => ROOT,
        }
    }

    fn indices_needed(&self) -> u32 {
        match self {
            Target::Existing(_) => 0,
            Target::New(_) => 1,
        }
    }
}

/// A cost change checked by [`GraphEngine::check_costs`] before the tree is touched. Each variant
/// mirrors the order in which the mutation rearranges child lists.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum CostChange {
    /// A new term of `amount` is pushed to the end of `parent`'s children.
    Insert { parent: NodeIndex, amount: Amount },
    /// `node` keeps its place and now costs `amount`.
    Replace { node: NodeIndex, amount: Amount },
    /// `node` leaves its parent and, when `to` is set, is pushed to the end of that parent's
    /// children costing the given amount.
    Move {
        node: NodeIndex,
        to: Option<(NodeIndex, Amount)>,
    },
}

/// Owns one tree: the nodes, the parent → children adjacency and the derived parent lookup.
///
/// Every public mutation either completes with all invariants intact or returns an error
/// without changing anything. Category costs are never set by callers, they are recomputed
/// from the leaves.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GraphEngine {
    nodes: BTreeMap<NodeIndex, Node>,
    adjacency: Adjacency,
    parents: HashMap<NodeIndex, NodeIndex>,
    /// Highest index handed out or seen this session. Deleted indices are never reused.
    high_water: NodeIndex,
    revision: u64,
}

impl Default for GraphEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphEngine {
    /// Creates a tree holding only the root.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT, Node::root());
        Self {
            nodes,
            adjacency: Adjacency::new(),
            parents: HashMap::new(),
            high_water: ROOT,
            revision: 0,
        }
    }

    /// Builds a tree from decoded nodes and adjacency.
    ///
    /// Legacy layouts are normalized: nodes without a parent are attached to the root, empty
    /// adjacency entries are dropped and childless categories are removed. Category costs are
    /// recomputed because stored values are only snapshots.
    ///
    /// # Errors
    /// - `CorruptSnapshot` when the data cannot form a tree: duplicate indices, a child listed
    ///   under more than one parent, a child or parent that does not exist, a leaf used as a
    ///   parent, or a cycle.
    pub fn from_parts(nodes: Vec<Node>, adjacency: Adjacency) -> GraphResult<Self> {
        let mut map = BTreeMap::new();
        for node in nodes {
            let index = node.index;
            if map.insert(index, node).is_some() {
                return Err(GraphError::corrupt(format!(
                    "more than one node has index {index}"
                )));
            }
        }
        let root = map.entry(ROOT).or_insert_with(Node::root);
        root.is_leaf = false;

        let high_water = map.keys().next_back().copied().unwrap_or(ROOT);
        let mut engine = Self {
            nodes: map,
            adjacency: Adjacency::new(),
            parents: HashMap::new(),
            high_water,
            revision: 0,
        };

        for (key, children) in adjacency {
            if children.is_empty() {
                warn!("Dropping empty adjacency entry for {key}");
                continue;
            }
            match engine.nodes.get(&key) {
                None => {
                    return Err(GraphError::corrupt(format!(
                        "adjacency entry {key} does not refer to a node"
                    )))
                }
                Some(parent) if parent.is_leaf => {
                    return Err(GraphError::corrupt(format!(
                        "transaction {key} is listed as a parent"
                    )))
                }
                Some(_) => {}
            }
            for &child in &children {
                if child == ROOT {
                    return Err(GraphError::corrupt(format!(
                        "the root is listed as a child of {key}"
                    )));
                }
                if !engine.nodes.contains_key(&child) {
                    return Err(GraphError::corrupt(format!(
                        "adjacency entry {key} lists missing node {child}"
                    )));
                }
                if let Some(previous) = engine.parents.insert(child, key) {
                    return Err(GraphError::corrupt(format!(
                        "node {child} is listed under both {previous} and {key}"
                    )));
                }
            }
            engine.adjacency.insert(key, children);
        }

        let orphans: Vec<NodeIndex> = engine
            .nodes
            .keys()
            .copied()
            .filter(|&i| i != ROOT && !engine.parents.contains_key(&i))
            .collect();
        for orphan in orphans {
            debug!("Attaching parentless node {orphan} to the root");
            engine.attach(ROOT, orphan);
        }

        engine.check_acyclic()?;

        let childless: Vec<NodeIndex> = engine
            .nodes
            .values()
            .filter(|n| !n.is_leaf && !n.is_root() && !engine.adjacency.contains_key(&n.index))
            .map(|n| n.index)
            .collect();
        for index in childless {
            if engine.nodes.contains_key(&index) {
                warn!("Removing category {index} because it has no transactions");
                engine.prune_upward(index);
            }
        }

        engine.recompute_all()?;
        Ok(engine)
    }

    /// Finds a category (root included) by case-insensitive, trimmed name.
    ///
    /// This is the single matching rule used whenever a category is referred to by name.
    pub fn find_category(&self, name: &str) -> Option<NodeIndex> {
        let wanted = category_key(name);
        self.nodes
            .values()
            .find(|n| !n.is_leaf && category_key(&n.name) == wanted)
            .map(|n| n.index)
    }

    /// Adds a transaction under the category named `category`, creating the category under the
    /// root when no category by that name exists. Returns the new leaf's index.
    pub fn add_leaf(
        &mut self,
        name: &str,
        cost: Amount,
        category: &str,
        meta: LeafMeta,
    ) -> GraphResult<NodeIndex> {
        let name = clean_name(name, "transaction")?;
        let target = self.resolve_category(category)?;
        self.check_room(1 + target.indices_needed())?;
        self.check_costs(CostChange::Insert {
            parent: target.cost_parent(),
            amount: cost,
        })?;

        let parent = self.materialize(target);
        let index = self.allocate();
        self.nodes.insert(index, Node::leaf(index, name, cost, meta));
        self.attach(parent, index);
        self.recompute_upward(parent)?;
        self.bump();
        debug!("Added transaction {index} under category {parent}");
        Ok(index)
    }

    /// Changes a transaction's name, cost or category.
    ///
    /// Moving a transaction out of its category removes that category when it becomes empty,
    /// repeating up the chain for nested categories. Editing to the current values is a no-op.
    pub fn edit_leaf(&mut self, index: NodeIndex, edit: LeafEdit) -> GraphResult<()> {
        let leaf = self.leaf(index)?;
        let old_parent = self.parent_of(index).unwrap_or(ROOT);

        let name = match edit.name.as_deref() {
            Some(name) => Some(clean_name(name, "transaction")?),
            None => None,
        };
        let target = match edit.category.as_deref() {
            Some(category) => match self.resolve_category(category)? {
                Target::Existing(parent) if parent == old_parent => None,
                Target::Existing(parent) => {
                    self.check_not_within(parent, index)?;
                    Some(Target::Existing(parent))
                }
                new => Some(new),
            },
            None => None,
        };

        let name = name.filter(|n| n != &leaf.name);
        let cost = edit.cost.filter(|c| c != &leaf.cost);
        if name.is_none() && cost.is_none() && target.is_none() {
            return Ok(());
        }
        let new_cost = cost.unwrap_or(leaf.cost);
        match &target {
            Some(target) => {
                self.check_room(target.indices_needed())?;
                self.check_costs(CostChange::Move {
                    node: index,
                    to: Some((target.cost_parent(), new_cost)),
                })?;
            }
            None if cost.is_some() => self.check_costs(CostChange::Replace {
                node: index,
                amount: new_cost,
            })?,
            None => {}
        }

        let old_ancestors = self.ancestors(index);
        if let Some(node) = self.nodes.get_mut(&index) {
            if let Some(name) = name {
                node.name = name;
            }
            if let Some(cost) = cost {
                node.cost = cost;
            }
        }
        if let Some(target) = target {
            self.detach(index);
            let new_parent = self.materialize(target);
            self.attach(new_parent, index);
            self.prune_upward(old_parent);
            debug!("Moved transaction {index} from category {old_parent} to {new_parent}");
        }

        self.recompute_path(&old_ancestors)?;
        self.recompute_upward(index)?;
        self.bump();
        Ok(())
    }

    /// Renames a category in place. Aggregate costs are unaffected.
    pub fn edit_category(&mut self, index: NodeIndex, name: &str) -> GraphResult<()> {
        let category = self.category(index)?;
        if category.is_root() {
            return Err(GraphError::invalid("the root category cannot be renamed"));
        }
        let name = clean_name(name, "category")?;
        if name == category.name {
            return Ok(());
        }
        if let Some(other) = self.find_category(&name).filter(|&other| other != index) {
            return Err(GraphError::invalid(format!(
                "a category named '{name}' already exists ({other})"
            )));
        }
        if let Some(node) = self.nodes.get_mut(&index) {
            node.name = name;
        }
        self.bump();
        Ok(())
    }

    /// Moves a category, with everything below it, under the category named `parent`. The
    /// parent is created under the root when it does not exist.
    pub fn move_category(&mut self, index: NodeIndex, parent: &str) -> GraphResult<()> {
        let category = self.category(index)?;
        if category.is_root() {
            return Err(GraphError::invalid("the root category cannot be moved"));
        }
        let old_parent = self.parent_of(index).unwrap_or(ROOT);
        let target = match self.resolve_category(parent)? {
            Target::Existing(p) if p == old_parent => return Ok(()),
            Target::Existing(p) => {
                self.check_not_within(p, index)?;
                Target::Existing(p)
            }
            new => new,
        };
        self.check_room(target.indices_needed())?;
        self.check_costs(CostChange::Move {
            node: index,
            to: Some((target.cost_parent(), category.cost)),
        })?;

        let old_ancestors = self.ancestors(index);
        self.detach(index);
        let new_parent = self.materialize(target);
        self.attach(new_parent, index);
        self.prune_upward(old_parent);
        self.recompute_path(&old_ancestors)?;
        self.recompute_upward(new_parent)?;
        self.bump();
        debug!("Moved category {index} from {old_parent} to {new_parent}");
        Ok(())
    }

    /// Deletes a transaction and returns it. Its category is removed when it becomes empty.
    pub fn delete_leaf(&mut self, index: NodeIndex) -> GraphResult<Node> {
        self.leaf(index)?;
        self.check_costs(CostChange::Move {
            node: index,
            to: None,
        })?;
        let old_ancestors = self.ancestors(index);
        let parent = self.detach(index).unwrap_or(ROOT);
        let removed = self
            .nodes
            .remove(&index)
            .ok_or_else(|| GraphError::not_found(NodeKind::Leaf, index))?;
        self.prune_upward(parent);
        self.recompute_path(&old_ancestors)?;
        self.bump();
        debug!("Deleted transaction {index}");
        Ok(removed)
    }

    /// Deletes a non-root category with everything below it and returns the removed nodes,
    /// deepest first.
    pub fn delete_category(&mut self, index: NodeIndex) -> GraphResult<Vec<Node>> {
        let category = self.category(index)?;
        if category.is_root() {
            return Err(GraphError::invalid("the root category cannot be deleted"));
        }
        self.check_costs(CostChange::Move {
            node: index,
            to: None,
        })?;
        let old_ancestors = self.ancestors(index);
        let subtree = self.post_order(index);
        let parent = self.detach(index).unwrap_or(ROOT);
        let mut removed = Vec::with_capacity(subtree.len());
        for i in subtree {
            self.adjacency.remove(&i);
            self.parents.remove(&i);
            if let Some(node) = self.nodes.remove(&i) {
                removed.push(node);
            }
        }
        self.prune_upward(parent);
        self.recompute_path(&old_ancestors)?;
        self.bump();
        debug!("Deleted category {index} and {} node(s) below it", removed.len() - 1);
        Ok(removed)
    }

    /// The nodes sorted by index, and one edge per parent → child relationship.
    pub fn query(&self) -> GraphView {
        let edges = self
            .adjacency
            .iter()
            .flat_map(|(&source, children)| {
                children.iter().filter_map(move |&target| {
                    self.nodes.get(&target).map(|n| Edge {
                        source,
                        target,
                        value: n.cost,
                    })
                })
            })
            .collect();
        GraphView {
            nodes: self.nodes.values().cloned().collect(),
            edges,
        }
    }

    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(&index)
    }

    /// All nodes, sorted by index, root first.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn adjacency(&self) -> &Adjacency {
        &self.adjacency
    }

    pub fn parent_of(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.parents.get(&index).copied()
    }

    pub fn children_of(&self, index: NodeIndex) -> &[NodeIndex] {
        self.adjacency.get(&index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Non-leaf nodes, root included.
    pub fn categories(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| !n.is_leaf)
    }

    pub fn leaves(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| n.is_leaf)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }

    /// The root's cost: the sum of every transaction in the tree.
    pub fn total(&self) -> Amount {
        self.nodes.get(&ROOT).map(|n| n.cost).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Increases by one with every mutation that changed the tree.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Records every node's current name as the name it is persisted under.
    pub(crate) fn mark_persisted(&mut self) {
        for node in self.nodes.values_mut() {
            node.original_name = Some(node.name.clone());
        }
    }

    /// Re-checks every structural and cost invariant of the tree.
    pub fn validate(&self) -> GraphResult<()> {
        let root = self
            .nodes
            .get(&ROOT)
            .ok_or_else(|| GraphError::corrupt("the root is missing"))?;
        if root.is_leaf {
            return Err(GraphError::corrupt("the root is marked as a transaction"));
        }

        let mut seen_as_child: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        for (&key, children) in &self.adjacency {
            let parent = self
                .nodes
                .get(&key)
                .ok_or_else(|| GraphError::corrupt(format!("entry {key} has no node")))?;
            if parent.is_leaf {
                return Err(GraphError::corrupt(format!("transaction {key} has children")));
            }
            if children.is_empty() {
                return Err(GraphError::corrupt(format!("entry {key} is empty")));
            }
            for &child in children {
                if !self.nodes.contains_key(&child) {
                    return Err(GraphError::corrupt(format!("entry {key} lists {child}")));
                }
                if seen_as_child.insert(child, key).is_some() {
                    return Err(GraphError::corrupt(format!("{child} has two parents")));
                }
            }
        }
        if seen_as_child.contains_key(&ROOT) {
            return Err(GraphError::corrupt("the root has a parent"));
        }
        if seen_as_child != self.parents {
            return Err(GraphError::corrupt("parent lookup is out of date"));
        }

        for node in self.nodes.values() {
            if node.is_root() {
                continue;
            }
            if !self.parents.contains_key(&node.index) {
                return Err(GraphError::corrupt(format!("{} has no parent", node.index)));
            }
            if !node.is_leaf && !self.adjacency.contains_key(&node.index) {
                return Err(GraphError::corrupt(format!(
                    "category {} has no children",
                    node.index
                )));
            }
            if node.index > self.high_water {
                return Err(GraphError::corrupt(format!(
                    "{} is above the allocation mark",
                    node.index
                )));
            }
        }
        self.check_acyclic()?;

        for node in self.categories() {
            let sum = self.sum_children(node.index).ok_or_else(|| {
                GraphError::corrupt(format!("the children of {} overflow", node.index))
            })?;
            if sum != node.cost {
                return Err(GraphError::corrupt(format!(
                    "category {} costs {} but its children sum to {}",
                    node.index, node.cost, sum
                )));
            }
        }
        Ok(())
    }

    fn leaf(&self, index: NodeIndex) -> GraphResult<&Node> {
        self.nodes
            .get(&index)
            .filter(|n| n.is_leaf)
            .ok_or_else(|| GraphError::not_found(NodeKind::Leaf, index))
    }

    fn category(&self, index: NodeIndex) -> GraphResult<&Node> {
        self.nodes
            .get(&index)
            .filter(|n| !n.is_leaf)
            .ok_or_else(|| GraphError::not_found(NodeKind::Category, index))
    }

    fn resolve_category(&self, name: &str) -> GraphResult<Target> {
        let name = clean_name(name, "category")?;
        Ok(match self.find_category(&name) {
            Some(index) => Target::Existing(index),
            None => Target::New(name),
        })
    }

    /// Fails when `target` is `index` itself or lies below it.
    fn check_not_within(&self, target: NodeIndex, index: NodeIndex) -> GraphResult<()> {
        let mut current = Some(target);
        while let Some(i) = current {
            if i == index {
                return Err(GraphError::invalid(format!(
                    "{target} is within {index}, moving there would create a cycle"
                )));
            }
            current = self.parent_of(i);
        }
        Ok(())
    }

    /// Returns the category for `target`, creating a new category under the root if needed.
    fn materialize(&mut self, target: Target) -> NodeIndex {
        match target {
            Target::Existing(index) => index,
            Target::New(name) => {
                let index = self.allocate();
                debug!("Creating category {index} '{name}'");
                self.nodes.insert(index, Node::category(index, name));
                self.attach(ROOT, index);
                index
            }
        }
    }

    /// Fails unless `count` more indices can be handed out.
    fn check_room(&self, count: u32) -> GraphResult<()> {
        match self.high_water.checked_add(count) {
            Some(_) => Ok(()),
            None => Err(GraphError::invalid(format!(
                "no node indices are left above {}",
                self.high_water
            ))),
        }
    }

    /// Hands out the next index. Callers run `check_room` first.
    fn allocate(&mut self) -> NodeIndex {
        self.high_water = self.high_water.saturating_add(1);
        self.high_water
    }

    /// Works out every category cost `change` would produce and fails if any of them overflows.
    /// Nothing is modified.
    ///
    /// Affected categories are visited deepest first so that each one sees its children's new
    /// costs. Emptied categories are left in with a cost of zero, which cannot change a sum.
    fn check_costs(&self, change: CostChange) -> GraphResult<()> {
        let (leaving, arriving, replaced) = match change {
            CostChange::Insert { parent, amount } => (None, Some((parent, amount)), None),
            CostChange::Replace { node, amount } => (None, None, Some((node, amount))),
            CostChange::Move { node, to } => (Some(node), to, None),
        };

        let mut affected: Vec<NodeIndex> = Vec::new();
        let mut add_chain = |start: NodeIndex| {
            let mut chain = vec![start];
            chain.extend(self.ancestors(start));
            for index in chain {
                if !affected.contains(&index) {
                    affected.push(index);
                }
            }
        };
        if let Some(node) = leaving.or(replaced.map(|(node, _)| node)) {
            if let Some(parent) = self.parent_of(node) {
                add_chain(parent);
            }
        }
        if let Some((parent, _)) = arriving {
            add_chain(parent);
        }
        affected.sort_by_cached_key(|&index| std::cmp::Reverse(self.ancestors(index).len()));

        let mut new_costs: HashMap<NodeIndex, Amount> = HashMap::new();
        for index in affected {
            let mut terms: Vec<Amount> = Vec::new();
            for &child in self.children_of(index) {
                if Some(child) == leaving {
                    continue;
                }
                let cost = match replaced {
                    Some((node, amount)) if node == child => amount,
                    _ => match new_costs.get(&child) {
                        Some(&cost) => cost,
                        None => self.nodes.get(&child).map(|n| n.cost).unwrap_or_default(),
                    },
                };
                terms.push(cost);
            }
            if let Some((_, amount)) = arriving.filter(|&(parent, _)| parent == index) {
                terms.push(amount);
            }
            let sum = Amount::checked_sum(terms).ok_or_else(|| {
                GraphError::invalid(format!("the total of category {index} would overflow"))
            })?;
            new_costs.insert(index, sum);
        }
        Ok(())
    }

    fn bump(&mut self) {
        self.revision += 1;
        debug_assert!(
            self.validate().is_ok(),
            "invariant violated: {:?}",
            self.validate()
        );
    }

    fn attach(&mut self, parent: NodeIndex, child: NodeIndex) {
        let children = self.adjacency.entry(parent).or_default();
        if !children.contains(&child) {
            children.push(child);
        }
        self.parents.insert(child, parent);
    }

    /// Removes `child` from its parent's list, dropping the entry when it becomes empty.
    fn detach(&mut self, child: NodeIndex) -> Option<NodeIndex> {
        let parent = self.parents.remove(&child)?;
        if let Some(children) = self.adjacency.get_mut(&parent) {
            children.retain(|&c| c != child);
            if children.is_empty() {
                self.adjacency.remove(&parent);
            }
        }
        Some(parent)
    }

    /// Removes `start` and then each ancestor in turn while it is a non-root category with no
    /// children left.
    fn prune_upward(&mut self, start: NodeIndex) {
        let mut current = start;
        while current != ROOT && !self.adjacency.contains_key(&current) {
            match self.nodes.get(&current) {
                Some(node) if !node.is_leaf => {}
                _ => break,
            }
            let parent = self.detach(current);
            self.nodes.remove(&current);
            debug!("Removed empty category {current}");
            match parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
    }

    /// Parent, grandparent, ... up to and including the root.
    fn ancestors(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        let mut current = self.parent_of(index);
        while let Some(i) = current {
            out.push(i);
            current = self.parent_of(i);
        }
        out
    }

    /// Recomputes the given nodes in order, skipping those that no longer exist.
    fn recompute_path(&mut self, path: &[NodeIndex]) -> GraphResult<()> {
        for &index in path {
            self.recompute_node(index)?;
        }
        Ok(())
    }

    /// Recomputes `start` (when it is a category) and every ancestor above it.
    fn recompute_upward(&mut self, start: NodeIndex) -> GraphResult<()> {
        let mut current = Some(start);
        while let Some(index) = current {
            self.recompute_node(index)?;
            current = self.parent_of(index);
        }
        Ok(())
    }

    /// Recomputes every category from the leaves up. Only used on a tree being loaded, so an
    /// overflow means the stored costs are unusable.
    fn recompute_all(&mut self) -> GraphResult<()> {
        for index in self.post_order(ROOT) {
            self.recompute_node(index).map_err(|_| {
                GraphError::corrupt(format!("the costs below category {index} overflow"))
            })?;
        }
        Ok(())
    }

    /// Sets a category's cost to the sum of its children. Mutations call `check_costs` first,
    /// so the error only surfaces while loading.
    fn recompute_node(&mut self, index: NodeIndex) -> GraphResult<()> {
        match self.nodes.get(&index) {
            Some(node) if !node.is_leaf => {}
            _ => return Ok(()),
        }
        let sum = self.sum_children(index).ok_or_else(|| {
            GraphError::invalid(format!("the total of category {index} would overflow"))
        })?;
        if let Some(node) = self.nodes.get_mut(&index) {
            node.cost = sum;
        }
        Ok(())
    }

    /// The sum of the children's current costs, or `None` on overflow.
    fn sum_children(&self, index: NodeIndex) -> Option<Amount> {
        Amount::checked_sum(
            self.children_of(index)
                .iter()
                .filter_map(|c| self.nodes.get(c))
                .map(|c| c.cost),
        )
    }

    /// `start` and everything below it, children before their parents.
    fn post_order(&self, start: NodeIndex) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        let mut stack = vec![(start, false)];
        while let Some((index, expanded)) = stack.pop() {
            if expanded {
                out.push(index);
                continue;
            }
            stack.push((index, true));
            for &child in self.children_of(index).iter().rev() {
                stack.push((child, false));
            }
        }
        out
    }

    /// Every node must reach the root by following parents.
    fn check_acyclic(&self) -> GraphResult<()> {
        let limit = self.nodes.len();
        for &start in self.nodes.keys() {
            let mut current = start;
            let mut steps = 0;
            while current != ROOT {
                current = match self.parent_of(current) {
                    Some(parent) => parent,
                    None => break,
                };
                steps += 1;
                if steps > limit {
                    return Err(GraphError::corrupt(format!(
                        "node {start} is part of a cycle"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn clean_name(name: &str, what: &str) -> GraphResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(GraphError::invalid(format!("a {what} name cannot be empty")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ROOT_NAME;
    use std::str::FromStr;

    fn amt(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    fn add(engine: &mut GraphEngine, name: &str, cost: &str, category: &str) -> NodeIndex {
        engine
            .add_leaf(name, amt(cost), category, LeafMeta::default())
            .unwrap()
    }

    fn cost_of(engine: &GraphEngine, index: NodeIndex) -> Amount {
        engine.node(index).unwrap().cost
    }

    #[test]
    fn test_new_has_only_root() {
        let engine = GraphEngine::new();
        assert_eq!(engine.len(), 1);
        assert!(engine.is_empty());
        assert_eq!(engine.node(ROOT).unwrap().name, ROOT_NAME);
        assert_eq!(engine.total(), Amount::ZERO);
        assert!(engine.validate().is_ok());
    }

    #[test]
    fn test_add_leaf_creates_category() {
        let mut engine = GraphEngine::new();
        let coffee = add(&mut engine, "Coffee", "4.50", "Food");

        assert_eq!(engine.len(), 3);
        let food = engine.find_category("Food").unwrap();
        assert_eq!(engine.parent_of(coffee), Some(food));
        assert_eq!(engine.parent_of(food), Some(ROOT));
        assert_eq!(cost_of(&engine, food), amt("4.50"));
        assert_eq!(engine.total(), amt("4.50"));
        assert_eq!(engine.revision(), 1);
    }

    #[test]
    fn test_add_leaf_reuses_category_case_insensitively() {
        let mut engine = GraphEngine::new();
        add(&mut engine, "Coffee", "4.50", "Food");
        add(&mut engine, "Bagel", "3.00", "  fOOD ");

        assert_eq!(engine.categories().count(), 2);
        let food = engine.find_category("food").unwrap();
        assert_eq!(engine.children_of(food).len(), 2);
        assert_eq!(cost_of(&engine, food), amt("7.50"));
        assert_eq!(engine.node(food).unwrap().name, "Food");
    }

    #[test]
    fn test_add_leaf_under_root_by_name() {
        let mut engine = GraphEngine::new();
        let misc = add(&mut engine, "Misc", "1.00", "expenses");
        assert_eq!(engine.parent_of(misc), Some(ROOT));
        assert_eq!(engine.total(), amt("1.00"));
    }

    #[test]
    fn test_add_leaf_rejects_blank_names() {
        let mut engine = GraphEngine::new();
        let before = engine.clone();
        let err = engine
            .add_leaf("Coffee", amt("1"), "   ", LeafMeta::default())
            .unwrap_err();
        assert!(err.is_invalid_operation());
        let err = engine
            .add_leaf(" ", amt("1"), "Food", LeafMeta::default())
            .unwrap_err();
        assert!(err.is_invalid_operation());
        assert_eq!(engine, before);
    }

    #[test]
    fn test_add_leaf_keeps_meta() {
        let mut engine = GraphEngine::new();
        let meta = LeafMeta {
            date: Some("2025-03-02".into()),
            location: Some("Main St".into()),
            bank: Some("Credit Union".into()),
            raw_text: Some("POS 0302 MAIN ST CAFE".into()),
        };
        let index = engine
            .add_leaf("Coffee", amt("4.50"), "Food", meta.clone())
            .unwrap();
        assert_eq!(engine.node(index).unwrap().meta, meta);
    }

    #[test]
    fn test_reparent_to_new_category_removes_empty_old_one() {
        let mut engine = GraphEngine::new();
        let coffee = add(&mut engine, "Coffee", "4.50", "Food");
        let food = engine.find_category("Food").unwrap();

        engine
            .edit_leaf(
                coffee,
                LeafEdit {
                    category: Some("Drinks".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(engine.node(food).is_none());
        assert!(!engine.adjacency().contains_key(&food));
        let drinks = engine.find_category("Drinks").unwrap();
        assert_eq!(engine.parent_of(coffee), Some(drinks));
        assert_eq!(cost_of(&engine, drinks), amt("4.50"));
        assert_eq!(engine.total(), amt("4.50"));
        assert_eq!(engine.children_of(ROOT), &[drinks]);
    }

    #[test]
    fn test_reparent_keeps_non_empty_old_category() {
        let mut engine = GraphEngine::new();
        let coffee = add(&mut engine, "Coffee", "4.50", "Food");
        add(&mut engine, "Bagel", "3.00", "Food");
        add(&mut engine, "Rent", "900", "Housing");
        let food = engine.find_category("Food").unwrap();
        let housing = engine.find_category("Housing").unwrap();

        engine
            .edit_leaf(
                coffee,
                LeafEdit {
                    category: Some("housing".into()),
                    cost: Some(amt("5.00")),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(cost_of(&engine, food), amt("3.00"));
        assert_eq!(cost_of(&engine, housing), amt("905.00"));
        assert_eq!(engine.total(), amt("908.00"));
    }

    #[test]
    fn test_reparent_is_idempotent() {
        let mut engine = GraphEngine::new();
        let coffee = add(&mut engine, "Coffee", "4.50", "Food");
        let edit = LeafEdit {
            category: Some("Drinks".into()),
            ..Default::default()
        };
        engine.edit_leaf(coffee, edit.clone()).unwrap();
        let after_first = engine.clone();
        engine.edit_leaf(coffee, edit).unwrap();
        assert_eq!(engine, after_first);
    }

    #[test]
    fn test_edit_leaf_name_and_cost() {
        let mut engine = GraphEngine::new();
        let coffee = add(&mut engine, "Coffee", "4.50", "Food");
        engine
            .edit_leaf(
                coffee,
                LeafEdit {
                    name: Some("Latte".into()),
                    cost: Some(amt("5.25")),
                    category: None,
                },
            )
            .unwrap();
        let node = engine.node(coffee).unwrap();
        assert_eq!(node.name, "Latte");
        assert_eq!(node.cost, amt("5.25"));
        assert_eq!(engine.total(), amt("5.25"));
    }

    #[test]
    fn test_edit_leaf_not_found() {
        let mut engine = GraphEngine::new();
        add(&mut engine, "Coffee", "4.50", "Food");
        let food = engine.find_category("Food").unwrap();
        let before = engine.clone();

        let err = engine.edit_leaf(99, LeafEdit::default()).unwrap_err();
        assert!(err.is_not_found());
        // A category is not a leaf
        let err = engine.edit_leaf(food, LeafEdit::default()).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(engine, before);
    }

    #[test]
    fn test_edit_category_renames() {
        let mut engine = GraphEngine::new();
        add(&mut engine, "Coffee", "4.50", "Food");
        let food = engine.find_category("Food").unwrap();
        engine.edit_category(food, "Dining").unwrap();
        assert_eq!(engine.node(food).unwrap().name, "Dining");
        assert_eq!(cost_of(&engine, food), amt("4.50"));
        assert_eq!(engine.find_category("dining"), Some(food));
    }

    #[test]
    fn test_edit_category_rejections() {
        let mut engine = GraphEngine::new();
        let coffee = add(&mut engine, "Coffee", "4.50", "Food");
        add(&mut engine, "Rent", "900", "Housing");
        let food = engine.find_category("Food").unwrap();
        let before = engine.clone();

        assert!(engine
            .edit_category(ROOT, "Spending")
            .unwrap_err()
            .is_invalid_operation());
        assert!(engine
            .edit_category(coffee, "Drinks")
            .unwrap_err()
            .is_not_found());
        assert!(engine.edit_category(77, "Drinks").unwrap_err().is_not_found());
        assert!(engine
            .edit_category(food, "HOUSING")
            .unwrap_err()
            .is_invalid_operation());
        assert_eq!(engine, before);
    }

    #[test]
    fn test_delete_last_leaf_removes_category() {
        let mut engine = GraphEngine::new();
        let coffee = add(&mut engine, "Coffee", "4.50", "Food");
        add(&mut engine, "Rent", "900", "Housing");
        let food = engine.find_category("Food").unwrap();
        let total_before = engine.total();

        let removed = engine.delete_leaf(coffee).unwrap();

        assert_eq!(removed.name, "Coffee");
        assert!(engine.node(food).is_none());
        assert!(!engine.adjacency().contains_key(&food));
        assert_eq!(engine.total(), total_before - amt("4.50"));
    }

    #[test]
    fn test_delete_leaf_not_found_leaves_state_unchanged() {
        let mut engine = GraphEngine::new();
        add(&mut engine, "Coffee", "4.50", "Food");
        let before = engine.clone();
        let err = engine.delete_leaf(1234).unwrap_err();
        assert!(matches!(
            err,
            GraphError::NotFound {
                kind: NodeKind::Leaf,
                index: 1234
            }
        ));
        assert_eq!(engine, before);
    }

    #[test]
    fn test_delete_everything_keeps_root() {
        let mut engine = GraphEngine::new();
        let coffee = add(&mut engine, "Coffee", "4.50", "Food");
        engine.delete_leaf(coffee).unwrap();
        assert!(engine.is_empty());
        assert!(engine.adjacency().is_empty());
        assert_eq!(engine.total(), Amount::ZERO);
    }

    #[test]
    fn test_indices_are_not_reused() {
        let mut engine = GraphEngine::new();
        let first = add(&mut engine, "Coffee", "4.50", "Food");
        engine.delete_leaf(first).unwrap();
        let second = add(&mut engine, "Tea", "3.00", "Food");
        assert!(second > first);
        assert!(engine.find_category("Food").unwrap() > first);
    }

    #[test]
    fn test_move_category_nests_and_cascades() {
        let mut engine = GraphEngine::new();
        let coffee = add(&mut engine, "Coffee", "4.50", "Cafes");
        add(&mut engine, "Groceries", "60", "Food");
        let cafes = engine.find_category("Cafes").unwrap();
        let food = engine.find_category("Food").unwrap();

        engine.move_category(cafes, "food").unwrap();
        assert_eq!(engine.parent_of(cafes), Some(food));
        assert_eq!(cost_of(&engine, food), amt("64.50"));
        assert_eq!(engine.total(), amt("64.50"));

        // Removing the only transaction empties Cafes; Food still has Groceries
        engine.delete_leaf(coffee).unwrap();
        assert!(engine.node(cafes).is_none());
        assert_eq!(cost_of(&engine, food), amt("60"));
    }

    #[test]
    fn test_empty_check_repeats_up_the_chain() {
        let mut engine = GraphEngine::new();
        let coffee = add(&mut engine, "Coffee", "4.50", "Cafes");
        let cafes = engine.find_category("Cafes").unwrap();
        engine.move_category(cafes, "Food").unwrap();
        let food = engine.find_category("Food").unwrap();

        engine.delete_leaf(coffee).unwrap();

        assert!(engine.node(cafes).is_none());
        assert!(engine.node(food).is_none());
        assert!(engine.is_empty());
    }

    #[test]
    fn test_move_category_rejects_cycles() {
        let mut engine = GraphEngine::new();
        add(&mut engine, "Coffee", "4.50", "Cafes");
        let cafes = engine.find_category("Cafes").unwrap();
        engine.move_category(cafes, "Food").unwrap();
        let food = engine.find_category("Food").unwrap();
        let before = engine.clone();

        let err = engine.move_category(food, "Cafes").unwrap_err();
        assert!(err.is_invalid_operation());
        let err = engine.move_category(food, "food").unwrap_err();
        assert!(err.is_invalid_operation());
        let err = engine.move_category(ROOT, "Food").unwrap_err();
        assert!(err.is_invalid_operation());
        assert_eq!(engine, before);
    }

    #[test]
    fn test_move_leaf_into_parent_of_nested_category() {
        let mut engine = GraphEngine::new();
        let coffee = add(&mut engine, "Coffee", "4.50", "Cafes");
        let cafes = engine.find_category("Cafes").unwrap();
        engine.move_category(cafes, "Food").unwrap();
        let food = engine.find_category("Food").unwrap();

        engine
            .edit_leaf(
                coffee,
                LeafEdit {
                    category: Some("Food".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(engine.node(cafes).is_none());
        assert_eq!(engine.children_of(food), &[coffee]);
        assert_eq!(engine.total(), amt("4.50"));
    }

    #[test]
    fn test_delete_category_removes_subtree() {
        let mut engine = GraphEngine::new();
        add(&mut engine, "Coffee", "4.50", "Food");
        add(&mut engine, "Bagel", "3.00", "Food");
        add(&mut engine, "Rent", "900", "Housing");
        let food = engine.find_category("Food").unwrap();

        let removed = engine.delete_category(food).unwrap();

        assert_eq!(removed.len(), 3);
        assert_eq!(removed.last().unwrap().index, food);
        assert_eq!(engine.total(), amt("900"));
        assert_eq!(engine.leaf_count(), 1);
        assert!(engine
            .delete_category(ROOT)
            .unwrap_err()
            .is_invalid_operation());
    }

    #[test]
    fn test_query_edges_follow_adjacency() {
        let mut engine = GraphEngine::new();
        let coffee = add(&mut engine, "Coffee", "4.50", "Food");
        let rent = add(&mut engine, "Rent", "900", "Housing");
        let food = engine.find_category("Food").unwrap();
        let housing = engine.find_category("Housing").unwrap();

        let view = engine.query();
        let indices: Vec<NodeIndex> = view.nodes.iter().map(|n| n.index).collect();
        let mut sorted = indices.clone();
        sorted.sort();
        assert_eq!(indices, sorted);

        assert_eq!(
            view.edges,
            vec![
                Edge {
                    source: ROOT,
                    target: food,
                    value: amt("4.50")
                },
                Edge {
                    source: ROOT,
                    target: housing,
                    value: amt("900")
                },
                Edge {
                    source: food,
                    target: coffee,
                    value: amt("4.50")
                },
                Edge {
                    source: housing,
                    target: rent,
                    value: amt("900")
                },
            ]
        );
    }

    #[test]
    fn test_noop_edits_do_not_bump_revision() {
        let mut engine = GraphEngine::new();
        let coffee = add(&mut engine, "Coffee", "4.50", "Food");
        let food = engine.find_category("Food").unwrap();
        let revision = engine.revision();
        engine
            .edit_leaf(
                coffee,
                LeafEdit {
                    name: Some("Coffee".into()),
                    cost: Some(amt("4.5")),
                    category: Some("FOOD".into()),
                },
            )
            .unwrap();
        engine.edit_category(food, "Food").unwrap();
        assert_eq!(engine.revision(), revision);
    }

    #[test]
    fn test_from_parts_recomputes_stale_costs() {
        let mut food = Node::category(1, "Food");
        food.cost = amt("999");
        let nodes = vec![
            food,
            Node::leaf(2, "Coffee", amt("4.50"), LeafMeta::default()),
            Node::leaf(3, "Bagel", amt("3"), LeafMeta::default()),
        ];
        let adjacency = Adjacency::from([(ROOT, vec![1]), (1, vec![2, 3])]);
        let engine = GraphEngine::from_parts(nodes, adjacency).unwrap();
        assert_eq!(cost_of(&engine, 1), amt("7.50"));
        assert_eq!(engine.total(), amt("7.50"));
        assert_eq!(engine.revision(), 0);
        assert!(engine.validate().is_ok());
    }

    #[test]
    fn test_from_parts_attaches_parentless_categories_to_root() {
        let nodes = vec![
            Node::category(1, "Food"),
            Node::leaf(2, "Coffee", amt("4.50"), LeafMeta::default()),
        ];
        let adjacency = Adjacency::from([(1, vec![2])]);
        let engine = GraphEngine::from_parts(nodes, adjacency).unwrap();
        assert_eq!(engine.children_of(ROOT), &[1]);
        assert_eq!(engine.total(), amt("4.50"));
    }

    #[test]
    fn test_from_parts_removes_childless_categories() {
        let nodes = vec![
            Node::category(1, "Food"),
            Node::category(4, "Travel"),
            Node::leaf(2, "Coffee", amt("4.50"), LeafMeta::default()),
        ];
        let adjacency = Adjacency::from([(ROOT, vec![1, 4]), (1, vec![2]), (4, vec![])]);
        let engine = GraphEngine::from_parts(nodes, adjacency).unwrap();
        assert!(engine.node(4).is_none());
        assert_eq!(engine.children_of(ROOT), &[1]);
        // The allocation mark still accounts for the removed index
        let mut engine = engine;
        let next = engine
            .add_leaf("Tea", amt("2"), "Food", LeafMeta::default())
            .unwrap();
        assert_eq!(next, 5);
    }

    #[test]
    fn test_from_parts_rejects_corruption() {
        let leaf = |i| Node::leaf(i, "x", amt("1"), LeafMeta::default());

        let two_parents = GraphEngine::from_parts(
            vec![Node::category(1, "A"), Node::category(2, "B"), leaf(3)],
            Adjacency::from([(ROOT, vec![1, 2]), (1, vec![3]), (2, vec![3])]),
        );
        assert!(matches!(two_parents, Err(GraphError::CorruptSnapshot(_))));

        let dangling = GraphEngine::from_parts(
            vec![Node::category(1, "A")],
            Adjacency::from([(ROOT, vec![1]), (1, vec![9])]),
        );
        assert!(matches!(dangling, Err(GraphError::CorruptSnapshot(_))));

        let leaf_parent = GraphEngine::from_parts(
            vec![leaf(1), leaf(2)],
            Adjacency::from([(ROOT, vec![1]), (1, vec![2])]),
        );
        assert!(matches!(leaf_parent, Err(GraphError::CorruptSnapshot(_))));

        let cycle = GraphEngine::from_parts(
            vec![Node::category(1, "A"), Node::category(2, "B"), leaf(3)],
            Adjacency::from([(1, vec![2, 3]), (2, vec![1])]),
        );
        assert!(matches!(cycle, Err(GraphError::CorruptSnapshot(_))));

        let duplicate = GraphEngine::from_parts(vec![leaf(1), leaf(1)], Adjacency::new());
        assert!(matches!(duplicate, Err(GraphError::CorruptSnapshot(_))));
    }

    #[test]
    fn test_mark_persisted_sets_baselines() {
        let mut engine = GraphEngine::new();
        let coffee = add(&mut engine, "Coffee", "4.50", "Food");
        assert_eq!(engine.node(coffee).unwrap().original_name, None);
        engine.mark_persisted();
        engine
            .edit_leaf(
                coffee,
                LeafEdit {
                    name: Some("Latte".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let node = engine.node(coffee).unwrap();
        assert_eq!(node.original_name.as_deref(), Some("Coffee"));
        assert!(node.is_renamed());
    }

    const BIG: &str = "50000000000000000000000000000";

    fn is_invalid<T: std::fmt::Debug>(result: GraphResult<T>) -> bool {
        matches!(result, Err(GraphError::InvalidOperation(_)))
    }

    #[test]
    fn test_add_leaf_overflow_leaves_tree_unchanged() {
        let mut engine = GraphEngine::new();
        add(&mut engine, "Rent", BIG, "Housing");
        let before = engine.clone();

        let into_existing = engine.add_leaf("Deposit", amt(BIG), "Housing", LeafMeta::default());
        assert!(is_invalid(into_existing));
        assert_eq!(engine, before);

        // A new category only overflows at the root
        let into_new = engine.add_leaf("Flight", amt(BIG), "Travel", LeafMeta::default());
        assert!(is_invalid(into_new));
        assert_eq!(engine, before);
        assert_eq!(engine.find_category("Travel"), None);
    }

    #[test]
    fn test_edit_leaf_overflow_leaves_tree_unchanged() {
        let mut engine = GraphEngine::new();
        add(&mut engine, "Salary", BIG, "Income");
        let bonus = add(&mut engine, "Bonus", "1", "Income");
        add(&mut engine, "Refund", &format!("-{BIG}"), "Returns");
        let hotel = add(&mut engine, "Hotel", "1", "Travel");
        let before = engine.clone();

        let raise = engine.edit_leaf(
            hotel,
            LeafEdit {
                cost: Some(amt(BIG)),
                category: Some("Income".into()),
                ..Default::default()
            },
        );
        assert!(is_invalid(raise));
        assert_eq!(engine, before);

        let replace = engine.edit_leaf(
            bonus,
            LeafEdit {
                cost: Some(amt(BIG)),
                ..Default::default()
            },
        );
        assert!(is_invalid(replace));
        assert_eq!(engine, before);

        // The same cost is fine once it stays below the limit
        engine
            .edit_leaf(
                hotel,
                LeafEdit {
                    cost: Some(amt(BIG)),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(engine.total(), amt(BIG) + amt("1"));
    }

    #[test]
    fn test_move_category_overflow_leaves_tree_unchanged() {
        let mut engine = GraphEngine::new();
        add(&mut engine, "Salary", BIG, "Income");
        add(&mut engine, "Refund", &format!("-{BIG}"), "Returns");
        add(&mut engine, "Hotel", BIG, "Travel");
        let income = engine.find_category("Income").unwrap();
        let before = engine.clone();

        assert!(is_invalid(engine.move_category(income, "Travel")));
        assert_eq!(engine, before);
    }

    #[test]
    fn test_allocation_exhausted_leaves_tree_unchanged() {
        let nodes = vec![
            Node::category(1, "Food"),
            Node::leaf(NodeIndex::MAX, "Coffee", amt("4.50"), LeafMeta::default()),
        ];
        let adjacency = Adjacency::from([(ROOT, vec![1]), (1, vec![NodeIndex::MAX])]);
        let mut engine = GraphEngine::from_parts(nodes, adjacency).unwrap();
        let before = engine.clone();

        let added = engine.add_leaf("Tea", amt("2"), "Food", LeafMeta::default());
        assert!(is_invalid(added));
        assert_eq!(engine, before);

        let moved = engine.edit_leaf(
            NodeIndex::MAX,
            LeafEdit {
                category: Some("Drinks".into()),
                ..Default::default()
            },
        );
        assert!(is_invalid(moved));
        assert_eq!(engine, before);

        // Edits that allocate nothing still work
        engine
            .edit_leaf(
                NodeIndex::MAX,
                LeafEdit {
                    cost: Some(amt("5")),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(engine.total(), amt("5"));
    }

    #[test]
    fn test_from_parts_rejects_overflowing_costs() {
        let nodes = vec![
            Node::category(1, "Income"),
            Node::leaf(2, "Salary", amt(BIG), LeafMeta::default()),
            Node::leaf(3, "Bonus", amt(BIG), LeafMeta::default()),
        ];
        let adjacency = Adjacency::from([(ROOT, vec![1]), (1, vec![2, 3])]);
        let result = GraphEngine::from_parts(nodes, adjacency);
        assert!(matches!(result, Err(GraphError::CorruptSnapshot(_))));
    }

    mod proptests {
        use super::*;
        use crate::graph::engine::arb::{apply, arb_op, pick, CATEGORIES};
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn invariants_hold_after_every_operation(ops in proptest::collection::vec(arb_op(), 1..60)) {
                let mut engine = GraphEngine::new();
                for op in &ops {
                    let before = engine.clone();
                    if apply(&mut engine, op).is_err() {
                        prop_assert_eq!(&engine, &before);
                    }
                    prop_assert!(engine.validate().is_ok(), "{:?}", engine.validate());

                    let leaf_total: Amount = engine.leaves().map(|n| n.cost).sum();
                    prop_assert_eq!(engine.total(), leaf_total);

                    let mut seen = std::collections::HashSet::new();
                    for node in engine.nodes() {
                        prop_assert!(seen.insert(node.index));
                    }
                    for edge in engine.query().edges {
                        prop_assert_eq!(edge.value, engine.node(edge.target).unwrap().cost);
                        prop_assert!(engine.node(edge.source).is_some());
                    }
                }
            }

            #[test]
            fn reparent_twice_is_identical(
                ops in proptest::collection::vec(arb_op(), 1..30),
                p in any::<usize>(),
                category in 0..CATEGORIES.len(),
            ) {
                let mut engine = GraphEngine::new();
                for op in &ops {
                    let _ = apply(&mut engine, op);
                }
                let leaves: Vec<NodeIndex> = engine.leaves().map(|n| n.index).collect();
                prop_assume!(!leaves.is_empty());
                let index = pick(leaves, p);
                let edit = LeafEdit { category: Some(CATEGORIES[category].to_string()), ..Default::default() };
                let first = engine.edit_leaf(index, edit.clone());
                let snapshot = engine.clone();
                let second = engine.edit_leaf(index, edit);
                prop_assert_eq!(first.is_ok(), second.is_ok());
                prop_assert_eq!(engine, snapshot);
            }
        }
    }
}
