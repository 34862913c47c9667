use fnv::FnvHashMap;

/// A `PriorityUpdate` as supplied by the application in raw mode, or synthesized by the tree
/// itself in levels mode.
#[derive(Debug, Clone, Copy)]
pub struct PriorityUpdate {
    pub parent_id: u32,
    pub exclusive: bool,
    pub weight: u8,
}

impl PriorityUpdate {
    pub fn new(parent_id: u32, exclusive: bool, weight: u8) -> Self {
        PriorityUpdate {
            parent_id,
            exclusive,
            weight,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PriorityNode {
    pub id: u32,
    pub parent_id: u32,
    pub weight: u8,
    pub exclusive: bool,
    pub virtual_node: bool,
}

/// Minimum-priority fallback used for unknown levels (§4.3).
const MIN_WEIGHT: u8 = 1;

/// Forest of virtual and real priority nodes (§4.3). Grounded on the teacher's `Streams` registry
/// (an `FnvHashMap` keyed arena with a monotonic id minter), applied here to priority nodes
/// instead of QUIC streams.
#[derive(Debug)]
pub struct PriorityTree {
    nodes: FnvHashMap<u32, PriorityNode>,
    levels: Vec<u32>,
    high_priority_parent: Option<u32>,
    low_priority_parent: Option<u32>,
    next_virtual_id: u32,
}

impl PriorityTree {
    pub fn new() -> Self {
        PriorityTree {
            nodes: FnvHashMap::default(),
            levels: Vec::new(),
            high_priority_parent: None,
            low_priority_parent: None,
            next_virtual_id: 1,
        }
    }

    fn mint_virtual_id(&mut self) -> u32 {
        let id = self.next_virtual_id;
        self.next_virtual_id += 1;
        id
    }

    /// Bootstraps levels-mode virtual parents. Returns the ids created, in the order a single
    /// codec call should express them (so the caller can emit exactly one `generatePriority`
    /// batch), matching §4.3's "single codec call" guarantee.
    pub fn bootstrap_levels(&mut self, num_levels: u8, has_high_priority: bool) -> Vec<u32> {
        let mut created = Vec::new();
        if has_high_priority {
            let id = self.mint_virtual_id();
            self.nodes.insert(
                id,
                PriorityNode {
                    id,
                    parent_id: 0,
                    weight: 256,
                    exclusive: false,
                    virtual_node: true,
                },
            );
            self.high_priority_parent = Some(id);
            created.push(id);
        }
        let low_id = self.mint_virtual_id();
        self.nodes.insert(
            low_id,
            PriorityNode {
                id: low_id,
                parent_id: 0,
                weight: 16,
                exclusive: false,
                virtual_node: true,
            },
        );
        self.low_priority_parent = Some(low_id);
        created.push(low_id);

        self.levels.clear();
        for level in 0..num_levels {
            let parent = if level == 0 && has_high_priority {
                self.high_priority_parent.unwrap()
            } else {
                self.low_priority_parent.unwrap()
            };
            self.levels.push(parent);
        }
        created
    }

    /// Raw mode, application-minted id: creates a brand-new virtual node with no backing stream
    /// and returns the id the peer will observe (`Session::send_priority`, §4.1).
    pub fn create_virtual_node(&mut self, update: PriorityUpdate) -> u32 {
        let id = self.mint_virtual_id();
        self.nodes.insert(
            id,
            PriorityNode {
                id,
                parent_id: update.parent_id,
                weight: update.weight,
                exclusive: update.exclusive,
                virtual_node: true,
            },
        );
        id
    }

    /// Raw mode: create a node on first reference (§4.3).
    pub fn create_or_update(&mut self, id: u32, update: PriorityUpdate) {
        self.nodes
            .entry(id)
            .and_modify(|n| {
                n.parent_id = update.parent_id;
                n.weight = update.weight;
                n.exclusive = update.exclusive;
            })
            .or_insert(PriorityNode {
                id,
                parent_id: update.parent_id,
                weight: update.weight,
                exclusive: update.exclusive,
                virtual_node: false,
            });
    }

    /// Returns the priority tuple the peer should see for `level`. Unknown levels resolve to the
    /// minimum-priority entry (§4.3).
    pub fn get_http_priority(&self, level: u8) -> PriorityUpdate {
        match self.levels.get(level as usize) {
            Some(&parent) => PriorityUpdate::new(parent, false, self.weight_for(parent)),
            None => PriorityUpdate::new(self.low_priority_parent.unwrap_or(0), false, MIN_WEIGHT),
        }
    }

    fn weight_for(&self, parent: u32) -> u8 {
        self.nodes.get(&parent).map(|n| n.weight).unwrap_or(MIN_WEIGHT)
    }

    pub fn node(&self, id: u32) -> Option<&PriorityNode> {
        self.nodes.get(&id)
    }
}

/// Deterministically derives the same virtual-parent id set for multiple sessions sharing one
/// transport-level priority budget (§4.3 supplement), rather than each session independently
/// minting an incompatible set of virtual ids for conceptually identical levels.
#[derive(Debug, Clone, Copy)]
pub struct PriorityMapFactory {
    num_levels: u8,
    has_high_priority: bool,
}

impl PriorityMapFactory {
    pub fn new(num_levels: u8, has_high_priority: bool) -> Self {
        PriorityMapFactory {
            num_levels,
            has_high_priority,
        }
    }

    pub fn bootstrap(&self, tree: &mut PriorityTree) -> Vec<u32> {
        tree.bootstrap_levels(self.num_levels, self.has_high_priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_zero_gets_high_priority_parent() {
        let mut tree = PriorityTree::new();
        tree.bootstrap_levels(4, true);
        let p0 = tree.get_http_priority(0);
        let p1 = tree.get_http_priority(1);
        assert_ne!(p0.parent_id, p1.parent_id);
        assert_eq!(tree.get_http_priority(2).parent_id, p1.parent_id);
    }

    #[test]
    fn unknown_level_resolves_to_minimum_weight() {
        let mut tree = PriorityTree::new();
        tree.bootstrap_levels(2, false);
        let unknown = tree.get_http_priority(99);
        assert_eq!(unknown.weight, MIN_WEIGHT);
    }

    #[test]
    fn create_virtual_node_mints_a_fresh_id() {
        let mut tree = PriorityTree::new();
        let a = tree.create_virtual_node(PriorityUpdate::new(0, false, 100));
        let b = tree.create_virtual_node(PriorityUpdate::new(0, false, 50));
        assert_ne!(a, b);
        assert_eq!(tree.node(a).unwrap().weight, 100);
    }

    #[test]
    fn raw_mode_creates_on_first_reference() {
        let mut tree = PriorityTree::new();
        assert!(tree.node(42).is_none());
        tree.create_or_update(42, PriorityUpdate::new(0, true, 200));
        assert!(tree.node(42).is_some());
        assert_eq!(tree.node(42).unwrap().weight, 200);
    }

    #[test]
    fn two_sessions_derive_identical_bootstrap_ids() {
        let factory = PriorityMapFactory::new(3, true);
        let mut tree_a = PriorityTree::new();
        let mut tree_b = PriorityTree::new();
        let created_a = factory.bootstrap(&mut tree_a);
        let created_b = factory.bootstrap(&mut tree_b);
        assert_eq!(created_a, created_b);
    }
}
