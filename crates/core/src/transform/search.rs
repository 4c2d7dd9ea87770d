//! Frontier policies for [TransformResolver::relative_master]. Every policy
//! is an explicit loop bounded by [MAX_SEARCH_STEPS]. Running out of steps
//! logs an error and degrades to the identity transform.

use crate::{
    graph::CellGraph,
    math::{Point, Transform},
    transform::{TransformResolver, MAX_SEARCH_STEPS},
};
use fnv::FnvHashSet;
use log::error;
use ordered_float::OrderedFloat;
use std::{
    cmp::Reverse,
    collections::{BinaryHeap, VecDeque},
};

fn exhausted<C: std::fmt::Debug>(policy: &str, h2: C, h1: C) -> Transform {
    error!(
        "{} search from {:?} to {:?} exceeded {} steps",
        policy, h1, h2, MAX_SEARCH_STEPS
    );
    Transform::identity()
}

fn dead_end<C: std::fmt::Debug>(
    policy: &str,
    cell: C,
    dir: usize,
) -> Transform {
    error!(
        "{} search hit a missing neighbor at {:?} direction {}",
        policy, cell, dir
    );
    Transform::identity()
}

/// Both sides walk toward the root, the deeper one first, until they meet.
/// `left` accumulates the source side, `right` the target side.
pub fn distance_field<G: CellGraph>(
    resolver: &TransformResolver<'_, G>,
    h2: G::Cell,
    h1: G::Cell,
) -> Transform {
    let graph = resolver.graph();
    let (mut a, mut b) = (h2, h1);
    let mut left = Transform::identity();
    let mut right = Transform::identity();

    for _ in 0..MAX_SEARCH_STEPS {
        if a == b {
            return left * right;
        }
        if graph.depth(a) >= graph.depth(b) {
            let dir = graph.parent_direction(a);
            let next = match graph.master_neighbor(a, dir) {
                Some(next) => next,
                None => return dead_end("distance field", a, dir),
            };
            right = resolver.iadj(a, dir) * right;
            a = next;
        } else {
            let dir = graph.parent_direction(b);
            let next = match graph.master_neighbor(b, dir) {
                Some(next) => next,
                None => return dead_end("distance field", b, dir),
            };
            left *= resolver.adj(b, dir);
            b = next;
        }
    }
    exhausted("distance field", h2, h1)
}

/// Compact spaces. Look for the target within two steps, picking the copy
/// closest to the hint; otherwise step toward the hint. If stepping stops
/// getting closer, fall back to a breadth-first search.
pub fn bounded<G: CellGraph>(
    resolver: &TransformResolver<'_, G>,
    h2: G::Cell,
    h1: G::Cell,
    hint: &Point,
) -> Transform {
    let graph = resolver.graph();
    let family = resolver.family();
    let origin = family.origin();
    let distance = |m: &Transform| family.distance(&(m * origin), hint);

    let mut cur = h1;
    let mut acc = Transform::identity();
    let mut best_distance = distance(&acc);
    for _ in 0..MAX_SEARCH_STEPS {
        let mut found: Option<(f64, Transform)> = None;
        let mut consider = |m: Transform| {
            let d = distance(&m);
            if found.as_ref().map_or(true, |(best, _)| d < *best) {
                found = Some((d, m));
            }
        };
        let mut step: Option<(f64, G::Cell, Transform)> = None;

        for d1 in 0..graph.master_degree(cur) {
            let n1 = match graph.master_neighbor(cur, d1) {
                Some(n1) => n1,
                None => continue,
            };
            let m1 = acc * resolver.adj(cur, d1);
            if n1 == h2 {
                consider(m1);
            }
            for d2 in 0..graph.master_degree(n1) {
                if graph.master_neighbor(n1, d2) == Some(h2) {
                    consider(m1 * resolver.adj(n1, d2));
                }
            }
            let d = distance(&m1);
            if step.as_ref().map_or(true, |(best, _, _)| d < *best) {
                step = Some((d, n1, m1));
            }
        }

        if let Some((_, m)) = found {
            return m;
        }
        match step {
            Some((d, next, m)) if d < best_distance => {
                best_distance = d;
                cur = next;
                acc = m;
            }
            _ => return breadth_first(resolver, h2, h1),
        }
    }
    exhausted("bounded", h2, h1)
}

/// Plain breadth-first search for the shortest path from `h1` to `h2`
fn breadth_first<G: CellGraph>(
    resolver: &TransformResolver<'_, G>,
    h2: G::Cell,
    h1: G::Cell,
) -> Transform {
    let graph = resolver.graph();
    let mut visited = FnvHashSet::default();
    let mut queue = VecDeque::new();
    visited.insert(h1);
    queue.push_back((h1, Transform::identity()));

    let mut steps = 0;
    while let Some((cell, acc)) = queue.pop_front() {
        if cell == h2 {
            return acc;
        }
        steps += 1;
        if steps > MAX_SEARCH_STEPS {
            break;
        }
        for dir in 0..graph.master_degree(cell) {
            if let Some(next) = graph.master_neighbor(cell, dir) {
                if visited.insert(next) {
                    queue.push_back((next, acc * resolver.adj(cell, dir)));
                }
            }
        }
    }
    exhausted("breadth-first", h2, h1)
}

/// Greedy descent on the graph's distance oracle. Among the neighbors that
/// get closer to the target, the one whose image is closest to the hint
/// wins.
pub fn quotient<G: CellGraph>(
    resolver: &TransformResolver<'_, G>,
    h2: G::Cell,
    h1: G::Cell,
    hint: &Point,
) -> Transform {
    let graph = resolver.graph();
    let family = resolver.family();
    let origin = family.origin();
    let remaining = |c: G::Cell| graph.cell_distance(c, h2);

    let mut cur = h1;
    let mut acc = Transform::identity();
    for _ in 0..MAX_SEARCH_STEPS {
        if cur == h2 {
            return acc;
        }
        let here = match remaining(cur) {
            Some(here) => here,
            // No oracle, so fall back to searching
            None => return breadth_first(resolver, h2, h1),
        };
        let mut best: Option<(OrderedFloat<f64>, G::Cell, Transform)> = None;
        for dir in 0..graph.master_degree(cur) {
            let next = match graph.master_neighbor(cur, dir) {
                Some(next) => next,
                None => continue,
            };
            if remaining(next).map_or(true, |d| d >= here) {
                continue;
            }
            let m = acc * resolver.adj(cur, dir);
            let d = OrderedFloat(family.distance(&(m * origin), hint));
            if best.as_ref().map_or(true, |(b, _, _)| d < *b) {
                best = Some((d, next, m));
            }
        }
        match best {
            Some((_, next, m)) => {
                cur = next;
                acc = m;
            }
            None => return breadth_first(resolver, h2, h1),
        }
    }
    exhausted("quotient", h2, h1)
}

/// Best-first expansion by the intrinsic distance to the target
pub fn crystal<G: CellGraph>(
    resolver: &TransformResolver<'_, G>,
    h2: G::Cell,
    h1: G::Cell,
) -> Transform {
    let graph = resolver.graph();
    let priority = |c: G::Cell| {
        let d = graph.space_distance(c, h2).unwrap_or(f64::INFINITY);
        OrderedFloat(d)
    };

    // Transforms live in a side table so the heap stays small
    let mut transforms = vec![Transform::identity()];
    let mut cells = vec![h1];
    let mut visited = FnvHashSet::default();
    let mut heap = BinaryHeap::new();
    visited.insert(h1);
    heap.push(Reverse((priority(h1), 0)));

    let mut steps = 0;
    while let Some(Reverse((_, idx))) = heap.pop() {
        let cell = cells[idx];
        if cell == h2 {
            return transforms[idx];
        }
        steps += 1;
        if steps > MAX_SEARCH_STEPS {
            break;
        }
        for dir in 0..graph.master_degree(cell) {
            if let Some(next) = graph.master_neighbor(cell, dir) {
                if visited.insert(next) {
                    transforms.push(transforms[idx] * resolver.adj(cell, dir));
                    cells.push(next);
                    heap.push(Reverse((priority(next), cells.len() - 1)));
                }
            }
        }
    }
    exhausted("crystal", h2, h1)
}

/// Breadth-first walk over `(cell, transform)` states starting at `origin`.
/// A state is expanded if its transform is `within` range and `record`
/// accepts it as new.
pub fn reachable<G: CellGraph>(
    resolver: &TransformResolver<'_, G>,
    origin: G::Cell,
    within: impl Fn(&Transform) -> bool,
    mut record: impl FnMut(G::Cell, &Transform) -> bool,
) {
    let graph = resolver.graph();
    let mut queue = VecDeque::new();
    record(origin, &Transform::identity());
    queue.push_back((origin, Transform::identity()));

    let mut states = 0;
    while let Some((cell, acc)) = queue.pop_front() {
        states += 1;
        if states > MAX_SEARCH_STEPS {
            error!(
                "reachability search from {:?} exceeded {} states",
                origin, MAX_SEARCH_STEPS
            );
            return;
        }
        for dir in 0..graph.degree(cell) {
            let next = graph.neighbor(cell, dir);
            let (next, step) = match (next, resolver.cell_adj(cell, dir)) {
                (Some(next), Some(step)) => (next, step),
                _ => continue,
            };
            let m = acc * step;
            if within(&m) && record(next, &m) {
                queue.push_back((next, m));
            }
        }
    }
}
