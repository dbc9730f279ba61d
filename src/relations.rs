use crate::model::{Indicator, IndicatorId, RelationId};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

/// Parent/child structure of an indicator collection.
///
/// Child links declared by each record are the only source of truth; parent
/// links are derived from them when the graph is built, so the two directions
/// can never disagree inside the client. Use [`validate`] to find records
/// whose declared `padres` do not match.
#[derive(Clone, Debug, Default)]
pub struct RelationGraph {
    order: Vec<IndicatorId>,
    known: HashSet<IndicatorId>,
    children: HashMap<IndicatorId, Vec<IndicatorId>>,
    parents: HashMap<IndicatorId, Vec<IndicatorId>>,
    referenced_as_child: HashSet<IndicatorId>,
    links: HashMap<(IndicatorId, IndicatorId), RelationId>,
}

impl RelationGraph {
    /// Builds the graph in O(N + E).
    ///
    /// Child references to ids missing from the collection are kept in the
    /// declared child lists but never followed.
    pub fn build(indicators: &[Indicator]) -> Self {
        let mut graph = RelationGraph::default();

        for ind in indicators {
            if graph.known.insert(ind.id) {
                graph.order.push(ind.id);
            }
        }

        for ind in indicators {
            let declared = graph.children.entry(ind.id).or_default();
            for child in &ind.children {
                if declared.contains(&child.id) {
                    continue;
                }
                declared.push(child.id);
                graph.referenced_as_child.insert(child.id);
                graph.links.insert((ind.id, child.id), child.rel_id);
            }
        }

        for &parent in &graph.order {
            for &child in graph.children.get(&parent).map_or(&[][..], Vec::as_slice) {
                if graph.known.contains(&child) {
                    graph.parents.entry(child).or_default().push(parent);
                }
            }
        }

        graph
    }

    pub fn contains(&self, id: IndicatorId) -> bool {
        self.known.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Declared children in declaration order, dangling ids included.
    pub fn children_of(&self, id: IndicatorId) -> &[IndicatorId] {
        self.children.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Parents derived from child links, in collection order.
    pub fn parents_of(&self, id: IndicatorId) -> &[IndicatorId] {
        self.parents.get(&id).map_or(&[], Vec::as_slice)
    }

    pub fn child_map(&self) -> BTreeMap<IndicatorId, Vec<IndicatorId>> {
        self.order
            .iter()
            .map(|&id| (id, self.children_of(id).to_vec()))
            .collect()
    }

    pub fn is_root(&self, id: IndicatorId) -> bool {
        self.contains(id) && !self.referenced_as_child.contains(&id)
    }

    /// Indicators nobody lists as a child, in collection order.
    pub fn roots(&self) -> Vec<IndicatorId> {
        self.order
            .iter()
            .copied()
            .filter(|id| !self.referenced_as_child.contains(id))
            .collect()
    }

    pub fn relation_id(&self, parent: IndicatorId, child: IndicatorId) -> Option<RelationId> {
        self.links.get(&(parent, child)).copied()
    }

    fn neighbors(&self, id: IndicatorId) -> impl Iterator<Item = IndicatorId> + '_ {
        self.children_of(id)
            .iter()
            .copied()
            .filter(|c| self.known.contains(c))
            .chain(self.parents_of(id).iter().copied())
    }

    /// Every indicator connected to `start` through parent or child links in
    /// either direction. Always contains `start`.
    pub fn group(&self, start: IndicatorId) -> BTreeSet<IndicatorId> {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        visited.insert(start);
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            for next in self.neighbors(current) {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        visited
    }

    /// Whether `to` can be reached from `from` following child links.
    pub fn reaches(&self, from: IndicatorId, to: IndicatorId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];

        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if !visited.insert(node) {
                continue;
            }
            for &child in self.children_of(node) {
                if !visited.contains(&child) {
                    stack.push(child);
                }
            }
        }
        false
    }

    pub fn would_create_cycle(&self, parent: IndicatorId, child: IndicatorId) -> bool {
        parent == child || self.reaches(child, parent)
    }

    /// Pre-order walk from `root`, yielding `(id, depth)`.
    ///
    /// `descend` decides whether a node's children are visited. One visited
    /// set is shared by the whole walk, so cycles terminate and no indicator
    /// is emitted twice under the same root.
    pub fn walk<F>(&self, root: IndicatorId, mut descend: F) -> Vec<(IndicatorId, usize)>
    where
        F: FnMut(IndicatorId) -> bool,
    {
        let mut out = Vec::new();
        if !self.contains(root) {
            return out;
        }

        let mut visited = HashSet::new();
        let mut stack = vec![(root, 0usize)];

        while let Some((id, depth)) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            out.push((id, depth));

            if !descend(id) {
                continue;
            }
            for &child in self.children_of(id).iter().rev() {
                if !self.known.contains(&child) {
                    debug!("skipping dangling child {} of indicator {}", child, id);
                } else if !visited.contains(&child) {
                    stack.push((child, depth + 1));
                }
            }
        }
        out
    }
}

/// Inconsistency between the parent and child links the API reported.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RelationIssue {
    /// `parent` lists a child id that is not in the collection.
    DanglingChild { parent: IndicatorId, child: IndicatorId },
    /// `child` lists a parent id that is not in the collection.
    DanglingParent { child: IndicatorId, parent: IndicatorId },
    /// `parent` lists `child`, but `child` does not list `parent` back.
    MissingParentLink { parent: IndicatorId, child: IndicatorId },
    /// `child` lists `parent`, but `parent` does not list `child`.
    UnmatchedParentLink { parent: IndicatorId, child: IndicatorId },
    SelfLink { id: IndicatorId },
}

impl fmt::Display for RelationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationIssue::DanglingChild { parent, child } => {
                write!(f, "indicator {} lists missing child {}", parent, child)
            }
            RelationIssue::DanglingParent { child, parent } => {
                write!(f, "indicator {} lists missing parent {}", child, parent)
            }
            RelationIssue::MissingParentLink { parent, child } => write!(
                f,
                "indicator {} lists child {} but {} does not list it as parent",
                parent, child, child
            ),
            RelationIssue::UnmatchedParentLink { parent, child } => write!(
                f,
                "indicator {} lists parent {} but {} does not list it as child",
                child, parent, parent
            ),
            RelationIssue::SelfLink { id } => write!(f, "indicator {} is its own child", id),
        }
    }
}

/// Cross-checks declared `hijos` against declared `padres`.
///
/// The result is sorted, so two runs over the same collection compare equal.
pub fn validate(indicators: &[Indicator]) -> Vec<RelationIssue> {
    let by_id: HashMap<IndicatorId, &Indicator> = indicators.iter().map(|i| (i.id, i)).collect();
    let mut issues = BTreeSet::new();

    for ind in indicators {
        for child in &ind.children {
            if child.id == ind.id {
                issues.insert(RelationIssue::SelfLink { id: ind.id });
                continue;
            }
            match by_id.get(&child.id) {
                None => {
                    issues.insert(RelationIssue::DanglingChild {
                        parent: ind.id,
                        child: child.id,
                    });
                }
                Some(c) if !c.parents.iter().any(|p| p.id == ind.id) => {
                    issues.insert(RelationIssue::MissingParentLink {
                        parent: ind.id,
                        child: child.id,
                    });
                }
                Some(_) => {}
            }
        }

        for parent in &ind.parents {
            if parent.id == ind.id {
                issues.insert(RelationIssue::SelfLink { id: ind.id });
                continue;
            }
            match by_id.get(&parent.id) {
                None => {
                    issues.insert(RelationIssue::DanglingParent {
                        child: ind.id,
                        parent: parent.id,
                    });
                }
                Some(p) if !p.children.iter().any(|c| c.id == ind.id) => {
                    issues.insert(RelationIssue::UnmatchedParentLink {
                        parent: parent.id,
                        child: ind.id,
                    });
                }
                Some(_) => {}
            }
        }
    }

    for issue in &issues {
        warn!("relation inconsistency: {}", issue);
    }
    issues.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RelationRef;

    fn rel(rel_id: RelationId, id: IndicatorId) -> RelationRef {
        RelationRef {
            rel_id,
            id,
            n: None,
            name: None,
        }
    }

    fn ind(id: IndicatorId, children: &[IndicatorId]) -> Indicator {
        let mut i = Indicator::new(id);
        i.children = children
            .iter()
            .map(|&c| rel(id * 100 + c, c))
            .collect();
        i
    }

    // Fills in `padres` from `hijos` so the collection is consistent.
    fn linked(mut inds: Vec<Indicator>) -> Vec<Indicator> {
        let pairs: Vec<(IndicatorId, IndicatorId, RelationId)> = inds
            .iter()
            .flat_map(|p| p.children.iter().map(move |c| (p.id, c.id, c.rel_id)))
            .collect();
        for (parent, child, rel_id) in pairs {
            if let Some(c) = inds.iter_mut().find(|i| i.id == child) {
                c.parents.push(rel(rel_id, parent));
            }
        }
        inds
    }

    #[test]
    fn two_node_roots_and_child_map() {
        let graph = RelationGraph::build(&[ind(1, &[2]), ind(2, &[])]);
        assert_eq!(graph.roots(), vec![1]);
        let map = graph.child_map();
        assert_eq!(map[&1], vec![2]);
        assert_eq!(map[&2], Vec::<IndicatorId>::new());
        assert_eq!(graph.parents_of(2), &[1]);
        assert_eq!(graph.relation_id(1, 2), Some(102));
    }

    #[test]
    fn every_id_is_root_or_child_exactly_once() {
        let inds = vec![
            ind(1, &[2, 3]),
            ind(2, &[4]),
            ind(3, &[]),
            ind(4, &[]),
            ind(5, &[]),
            ind(6, &[3]),
        ];
        let graph = RelationGraph::build(&inds);
        let roots: HashSet<_> = graph.roots().into_iter().collect();
        for i in &inds {
            let is_child = inds.iter().any(|p| p.id != i.id && p.child_ids().any(|c| c == i.id));
            assert_ne!(roots.contains(&i.id), is_child, "indicator {}", i.id);
        }
        assert_eq!(graph.roots(), vec![1, 5, 6]);
    }

    #[test]
    fn isolated_indicator_is_root_with_no_children() {
        let graph = RelationGraph::build(&[ind(9, &[])]);
        assert_eq!(graph.roots(), vec![9]);
        assert!(graph.children_of(9).is_empty());
    }

    #[test]
    fn dangling_child_is_tolerated() {
        let graph = RelationGraph::build(&[ind(1, &[42])]);
        assert_eq!(graph.roots(), vec![1]);
        assert_eq!(graph.children_of(1), &[42]);
        let walked = graph.walk(1, |_| true);
        assert_eq!(walked, vec![(1, 0)]);
        assert_eq!(graph.group(1), BTreeSet::from([1]));
    }

    #[test]
    fn walk_terminates_on_cycles() {
        let graph = RelationGraph::build(&[ind(1, &[2]), ind(2, &[3]), ind(3, &[2])]);
        let walked = graph.walk(1, |_| true);
        assert_eq!(walked, vec![(1, 0), (2, 1), (3, 2)]);

        let graph = RelationGraph::build(&[ind(1, &[2]), ind(2, &[1])]);
        assert!(graph.roots().is_empty());
        assert_eq!(graph.walk(1, |_| true), vec![(1, 0), (2, 1)]);
    }

    #[test]
    fn walk_is_preorder_in_declared_order() {
        let graph = RelationGraph::build(&[
            ind(1, &[3, 2]),
            ind(2, &[5]),
            ind(3, &[4]),
            ind(4, &[]),
            ind(5, &[]),
        ]);
        let ids: Vec<_> = graph.walk(1, |_| true).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 3, 4, 2, 5]);

        let collapsed: Vec<_> = graph.walk(1, |id| id == 1).into_iter().collect();
        assert_eq!(collapsed, vec![(1, 0), (3, 1), (2, 1)]);
    }

    #[test]
    fn group_follows_links_both_ways() {
        let inds = vec![
            ind(1, &[2]),
            ind(2, &[3]),
            ind(3, &[]),
            ind(4, &[3]),
            ind(7, &[8]),
            ind(8, &[]),
            ind(9, &[]),
        ];
        let graph = RelationGraph::build(&inds);
        assert_eq!(graph.group(3), BTreeSet::from([1, 2, 3, 4]));
        assert_eq!(graph.group(9), BTreeSet::from([9]));
        assert_eq!(graph.group(100), BTreeSet::from([100]));

        for x in [1, 2, 3, 4, 7, 8, 9] {
            for y in graph.group(x) {
                assert!(graph.group(y).contains(&x), "{} in group of {}", y, x);
            }
        }
    }

    #[test]
    fn cycle_check_before_linking() {
        let graph = RelationGraph::build(&[ind(1, &[2]), ind(2, &[3]), ind(3, &[])]);
        assert!(graph.would_create_cycle(3, 1));
        assert!(graph.would_create_cycle(2, 2));
        assert!(!graph.would_create_cycle(1, 3));
    }

    #[test]
    fn consistent_collection_validates_clean() {
        let inds = linked(vec![ind(1, &[2, 3]), ind(2, &[]), ind(3, &[])]);
        assert!(validate(&inds).is_empty());
    }

    #[test]
    fn validation_flags_mismatches() {
        let mut inds = vec![ind(1, &[2, 50]), ind(2, &[]), ind(3, &[3])];
        inds[1].parents.push(rel(1, 60));
        inds[1].parents.push(rel(2, 1));
        inds[0].parents.push(rel(3, 2));

        let issues = validate(&inds);
        assert!(issues.contains(&RelationIssue::DanglingChild { parent: 1, child: 50 }));
        assert!(issues.contains(&RelationIssue::DanglingParent { child: 2, parent: 60 }));
        assert!(issues.contains(&RelationIssue::UnmatchedParentLink { parent: 2, child: 1 }));
        assert!(issues.contains(&RelationIssue::SelfLink { id: 3 }));
        assert!(!issues.contains(&RelationIssue::MissingParentLink { parent: 1, child: 2 }));
    }
}
