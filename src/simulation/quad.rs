//! # Fixed-depth quad-tree spatial index
//!
//! The tree partitions the simulation rectangle exactly: each non-leaf
//! node's four children tile its bounds with no gap or overlap. The whole
//! topology is built once up front (every non-leaf eagerly allocates its
//! children) and never resized, so nodes live in a flat arena `Vec` and
//! refer to each other by index. That makes the structure trivially
//! shareable across the worker threads.
//!
//! The tree owns no particles. Each node keeps a *resident list* of
//! `Arc<Particle>` back-references for the particles whose inflated
//! bounding box fits its bounds but not any single child's — which is why
//! resident lists exist at every depth, not only at the leaves. A particle
//! that straddles a child midline legitimately stays at the parent.
//!
//! Removal never erases in place: other workers may be scanning the same
//! list, so a removed entry is replaced with a `None` tombstone and the
//! node's tombstone counter is bumped. Compaction is amortized through
//! [`QuadTree::clean_resident_lists`], which only touches nodes whose
//! counter exceeds a threshold.
//!
//! Tie-break convention: a coordinate exactly on a boundary is treated as
//! *not* crossing it (strict `<`/`>` only). Relaxing this invites infinite
//! trickle loops.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::simulation::params::QUAD_CLEAN;
use crate::simulation::particle::{Aabb, Particle};

/// Index of the root node in the arena.
pub const ROOT: usize = 0;

/// One node of the quad-tree.
///
/// Quadrant indices relative to the parent (positive y is down):
/// 0 = top-left, 1 = top-right, 2 = bottom-left, 3 = bottom-right.
pub struct QuadNode {
    pub parent: Option<usize>,
    pub children: Option<[usize; 4]>, // absent at max depth
    pub level: u32,
    pub quadrant: usize,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    // Multiple workers may push here concurrently during the resort phase
    // when a particle crosses worker subtree boundaries.
    residents: Mutex<Vec<Option<Arc<Particle>>>>,
    tombstones: AtomicUsize,
}

impl QuadNode {
    pub fn contains(&self, bounds: &Aabb) -> bool {
        bounds.x_min >= self.x_min
            && bounds.x_max <= self.x_max
            && bounds.y_min >= self.y_min
            && bounds.y_max <= self.y_max
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones.load(Ordering::Relaxed)
    }

    /// Snapshot of the resident slots as particle ids (`None` = tombstone).
    pub fn resident_snapshot(&self) -> Vec<Option<u64>> {
        self.residents
            .lock()
            .iter()
            .map(|slot| slot.as_ref().map(|p| p.id()))
            .collect()
    }
}

/// The flat-arena quad-tree over the full simulation rectangle.
pub struct QuadTree {
    nodes: Vec<QuadNode>,
    max_level: u32,
}

impl QuadTree {
    /// Build the full topology for a `width` × `height` rectangle down to
    /// `max_level`.
    pub fn new(width: f64, height: f64, max_level: u32) -> Self {
        let mut nodes = Vec::new();
        build_node(&mut nodes, None, 0, max_level, 0, 0.0, width, 0.0, height);
        Self { nodes, max_level }
    }

    pub fn node(&self, index: usize) -> &QuadNode {
        &self.nodes[index]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Insert `particle` at `node_index`, descending as deep as its cached
    /// bounding box allows. If it cannot be pushed anywhere else it joins
    /// this node's resident list (reusing a tombstoned slot when one is
    /// free) and the node becomes its owner.
    ///
    /// This never fails: a particle that fits nowhere deeper simply stays
    /// resident here, which is always structurally valid.
    pub fn add_particle(&self, node_index: usize, particle: &Arc<Particle>, check_bounds: bool) {
        if self.trickle_particle(node_index, particle, check_bounds) {
            return;
        }
        let node = &self.nodes[node_index];
        let mut residents = node.residents.lock();
        if let Some(slot) = residents.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(Arc::clone(particle));
            node.tombstones.fetch_sub(1, Ordering::Relaxed);
        } else {
            residents.push(Some(Arc::clone(particle)));
        }
        particle.set_node(node_index);
    }

    /// Try to relocate `particle` away from `node_index`. Returns whether
    /// the particle moved (it is then owned by some other node); `false`
    /// means it must stay resident at the current node.
    ///
    /// Two sub-moves, upward escape first:
    /// - crossing an edge this quadrant shares with the parent's outer
    ///   boundary cannot be fixed by the parent (same edge), so escape to
    ///   the grandparent; crossing only an interior midline escapes to the
    ///   parent. A move that would land above the root fails and the root
    ///   keeps the particle.
    /// - otherwise, descend into the single child whose bounds strictly
    ///   contain the box, and recurse from there.
    pub fn trickle_particle(&self, node_index: usize, particle: &Arc<Particle>, check_bounds: bool) -> bool {
        let node = &self.nodes[node_index];
        let bounds = particle.bounds();

        if check_bounds && node.level != 0 {
            let out_left = bounds.x_min < node.x_min;
            let out_right = bounds.x_max > node.x_max;
            let out_top = bounds.y_min < node.y_min;
            let out_bottom = bounds.y_max > node.y_max;

            let crossed_outer = match node.quadrant {
                0 => out_left || out_top,
                1 => out_right || out_top,
                2 => out_left || out_bottom,
                _ => out_right || out_bottom,
            };
            if crossed_outer {
                return self.move_to_grandparent(node_index, particle);
            }
            if out_left || out_right || out_top || out_bottom {
                return self.move_to_parent(node_index, particle);
            }
        }

        if let Some(children) = node.children {
            let x_mid = node.x_min + (node.x_max - node.x_min) / 2.0;
            let y_mid = node.y_min + (node.y_max - node.y_min) / 2.0;

            // Strictly on one side of both midlines, or it stays put.
            let quadrant = if bounds.x_max < x_mid {
                if bounds.y_max < y_mid {
                    Some(0)
                } else if bounds.y_min > y_mid {
                    Some(2)
                } else {
                    None
                }
            } else if bounds.x_min > x_mid {
                if bounds.y_max < y_mid {
                    Some(1)
                } else if bounds.y_min > y_mid {
                    Some(3)
                } else {
                    None
                }
            } else {
                None
            };

            if let Some(quadrant) = quadrant {
                self.add_particle(children[quadrant], particle, false);
                return true;
            }
        }

        false
    }

    fn move_to_parent(&self, node_index: usize, particle: &Arc<Particle>) -> bool {
        match self.nodes[node_index].parent {
            Some(parent) => {
                self.add_particle(parent, particle, true);
                true
            }
            None => false,
        }
    }

    fn move_to_grandparent(&self, node_index: usize, particle: &Arc<Particle>) -> bool {
        let parent = match self.nodes[node_index].parent {
            Some(parent) => parent,
            None => return false,
        };
        // At level 1 the parent is the root; the root absorbs the escape.
        let target = self.nodes[parent].parent.unwrap_or(parent);
        self.add_particle(target, particle, true);
        true
    }

    /// Re-sort a particle after its bounding box may have changed. If it
    /// relocates, the old resident entry is tombstoned rather than erased.
    /// Returns whether the particle moved.
    pub fn sort_particle(&self, particle: &Arc<Particle>) -> bool {
        let node_index = particle.node();
        if !self.trickle_particle(node_index, particle, true) {
            return false;
        }
        self.tombstone_in(node_index, particle.id());
        true
    }

    /// Tombstone a particle's entry in its owning node. Used by pool
    /// compaction when a dead particle is dropped for good.
    pub fn remove_particle(&self, particle: &Arc<Particle>) {
        self.tombstone_in(particle.node(), particle.id());
    }

    fn tombstone_in(&self, node_index: usize, id: u64) {
        let node = &self.nodes[node_index];
        let mut residents = node.residents.lock();
        for slot in residents.iter_mut() {
            if slot.as_ref().map_or(false, |p| p.id() == id) {
                *slot = None;
                node.tombstones.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
    }

    /// Enumerate every live particle with greater residency order than
    /// `particle` exactly once, invoking `visit(particle, other)` per pair.
    ///
    /// The scan starts just past the particle's own slot in its node's
    /// resident list, then walks *all four* child subtrees in full: any
    /// particle deeper in the tree is by construction never earlier in the
    /// pairing order, so no pair is visited twice and none is skipped. The
    /// fixed small depth keeps the subtree walks bounded.
    pub fn collide_from<F>(&self, particle: &Arc<Particle>, visit: &mut F)
    where
        F: FnMut(&Arc<Particle>, &Arc<Particle>),
    {
        self.collide_node(particle.node(), particle, true, visit);
    }

    fn collide_node<F>(&self, node_index: usize, particle: &Arc<Particle>, resident: bool, visit: &mut F)
    where
        F: FnMut(&Arc<Particle>, &Arc<Particle>),
    {
        let node = &self.nodes[node_index];
        let mut found = !resident;
        {
            let residents = node.residents.lock();
            if resident {
                let mut slots = residents.iter();
                for slot in slots.by_ref() {
                    if slot.as_ref().map_or(false, |p| p.id() == particle.id()) {
                        found = true;
                        break;
                    }
                }
                if found {
                    for slot in slots {
                        if let Some(other) = slot {
                            if other.alive() {
                                visit(particle, other);
                            }
                        }
                    }
                }
            } else {
                for slot in residents.iter() {
                    if let Some(other) = slot {
                        if other.alive() {
                            visit(particle, other);
                        }
                    }
                }
            }
        }
        // If the resident particle was concurrently moved out from under
        // us, skip the subtrees too; its new owner covers them.
        if found {
            if let Some(children) = node.children {
                for child in children {
                    self.collide_node(child, particle, false, visit);
                }
            }
        }
    }

    /// Compact resident lists whose tombstone count exceeds the threshold,
    /// recursing through the whole tree. Amortizes removal cost instead of
    /// paying O(n) per tombstone.
    pub fn clean_resident_lists(&self) {
        self.clean_node(ROOT);
    }

    fn clean_node(&self, node_index: usize) {
        let node = &self.nodes[node_index];
        if node.tombstones.load(Ordering::Relaxed) > QUAD_CLEAN {
            let mut residents = node.residents.lock();
            residents.retain(|slot| slot.is_some());
            node.tombstones.store(0, Ordering::Relaxed);
        }
        if let Some(children) = node.children {
            for child in children {
                self.clean_node(child);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_node(
    nodes: &mut Vec<QuadNode>,
    parent: Option<usize>,
    level: u32,
    max_level: u32,
    quadrant: usize,
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
) -> usize {
    let index = nodes.len();
    nodes.push(QuadNode {
        parent,
        children: None,
        level,
        quadrant,
        x_min,
        x_max,
        y_min,
        y_max,
        residents: Mutex::new(Vec::new()),
        tombstones: AtomicUsize::new(0),
    });

    if level < max_level {
        let x_mid = x_min + (x_max - x_min) / 2.0;
        let y_mid = y_min + (y_max - y_min) / 2.0;
        let children = [
            // Top-left, top-right, bottom-left, bottom-right.
            build_node(nodes, Some(index), level + 1, max_level, 0, x_min, x_mid, y_min, y_mid),
            build_node(nodes, Some(index), level + 1, max_level, 1, x_mid, x_max, y_min, y_mid),
            build_node(nodes, Some(index), level + 1, max_level, 2, x_min, x_mid, y_mid, y_max),
            build_node(nodes, Some(index), level + 1, max_level, 3, x_mid, x_max, y_mid, y_max),
        ];
        nodes[index].children = Some(children);
    }

    index
}
