//! Interval-tree strategy.
//!
//! At open time every cover cell of every polygon becomes an interval
//! `[range_min, range_max]` over leaf-cell id space, tagged with its
//! polygon. Two static centered interval trees (interior and exterior
//! covers) answer point stabs in `O(log n + k)`: each node stores the
//! intervals overlapping its center id, sorted by low endpoint ascending
//! and high endpoint descending, so a stab scans only matching entries.

use s2::cellid::CellID;
use rustc_hash::FxHashSet;

use crate::cell;
use crate::error::Result;
use crate::storage::Store;
use crate::strategy::StrategyOptions;
use crate::types::{IndexResponse, PolygonRef};

#[derive(Debug, Clone, Copy)]
struct Interval {
    lo: u64,
    hi: u64,
    payload: PolygonRef,
}

struct Node {
    center: u64,
    /// Intervals overlapping `center`, ascending by `lo`.
    by_lo: Vec<Interval>,
    /// The same intervals, descending by `hi`.
    by_hi: Vec<Interval>,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

/// Static interval tree answering point stabs.
pub(crate) struct IntervalTree {
    root: Option<Box<Node>>,
    len: usize,
}

impl IntervalTree {
    fn build(intervals: Vec<Interval>) -> IntervalTree {
        let len = intervals.len();
        IntervalTree {
            root: Self::build_node(intervals),
            len,
        }
    }

    fn build_node(intervals: Vec<Interval>) -> Option<Box<Node>> {
        if intervals.is_empty() {
            return None;
        }
        // Median endpoint keeps the left/right partitions balanced, which
        // bounds the recursion depth logarithmically.
        let mut endpoints: Vec<u64> = intervals.iter().map(|i| i.lo).collect();
        endpoints.extend(intervals.iter().map(|i| i.hi));
        endpoints.sort_unstable();
        let center = endpoints[endpoints.len() / 2];

        let mut left = Vec::new();
        let mut right = Vec::new();
        let mut mid = Vec::new();
        for iv in intervals {
            if iv.hi < center {
                left.push(iv);
            } else if iv.lo > center {
                right.push(iv);
            } else {
                mid.push(iv);
            }
        }

        let mut by_lo = mid.clone();
        by_lo.sort_unstable_by_key(|iv| iv.lo);
        let mut by_hi = mid;
        by_hi.sort_unstable_by_key(|iv| std::cmp::Reverse(iv.hi));

        Some(Box::new(Node {
            center,
            by_lo,
            by_hi,
            left: Self::build_node(left),
            right: Self::build_node(right),
        }))
    }

    fn len(&self) -> usize {
        self.len
    }

    /// All payloads whose interval contains `q` (`lo <= q <= hi`).
    fn stab(&self, q: u64, out: &mut Vec<PolygonRef>) {
        let mut node = self.root.as_deref();
        while let Some(n) = node {
            if q < n.center {
                for iv in &n.by_lo {
                    if iv.lo > q {
                        break;
                    }
                    out.push(iv.payload);
                }
                node = n.left.as_deref();
            } else if q > n.center {
                for iv in &n.by_hi {
                    if iv.hi < q {
                        break;
                    }
                    out.push(iv.payload);
                }
                node = n.right.as_deref();
            } else {
                for iv in &n.by_lo {
                    out.push(iv.payload);
                }
                break;
            }
        }
    }
}

/// The `insidetree` strategy: interior and exterior trees built from the
/// `'C'` records, stabbed with the query's leaf cell.
pub struct TreeStrategy {
    itree: IntervalTree,
    otree: IntervalTree,
    opts: StrategyOptions,
}

impl TreeStrategy {
    /// Loads every cover cell from the store and builds both trees.
    pub fn open(store: &Store, opts: StrategyOptions) -> Result<TreeStrategy> {
        let mut inside = Vec::new();
        let mut outside = Vec::new();
        store.load_feature_cells(|id, cells| {
            for (pos, cu) in cells.cover_in.iter().enumerate() {
                for raw in cu {
                    let c = CellID(*raw);
                    inside.push(Interval {
                        lo: c.range_min().0,
                        hi: c.range_max().0,
                        payload: PolygonRef {
                            feature_id: id,
                            polygon: pos as u16,
                        },
                    });
                }
            }
            for (pos, cu) in cells.cover_out.iter().enumerate() {
                for raw in cu {
                    let c = CellID(*raw);
                    outside.push(Interval {
                        lo: c.range_min().0,
                        hi: c.range_max().0,
                        payload: PolygonRef {
                            feature_id: id,
                            polygon: pos as u16,
                        },
                    });
                }
            }
            Ok(())
        })?;

        Ok(TreeStrategy {
            itree: IntervalTree::build(inside),
            otree: IntervalTree::build(outside),
            opts,
        })
    }

    /// Number of indexed intervals (interior, exterior).
    pub fn sizes(&self) -> (usize, usize) {
        (self.itree.len(), self.otree.len())
    }

    pub fn stab(&self, lat: f64, lng: f64) -> IndexResponse {
        let q = cell::leaf_from_degrees(lat, lng).0;
        let mut resp = IndexResponse::default();

        let mut hits = Vec::new();
        self.itree.stab(q, &mut hits);
        let mut seen: FxHashSet<PolygonRef> = FxHashSet::default();
        for r in hits {
            if seen.insert(r) {
                resp.inside.push(r);
            }
        }

        if self.opts.stop_on_inside_found && !resp.inside.is_empty() {
            return resp;
        }

        let mut outer = Vec::new();
        self.otree.stab(q, &mut outer);
        let mut seen_out: FxHashSet<PolygonRef> = FxHashSet::default();
        for r in outer {
            if !seen.contains(&r) && seen_out.insert(r) {
                resp.maybe_inside.push(r);
            }
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(lo: u64, hi: u64, id: u32) -> Interval {
        Interval {
            lo,
            hi,
            payload: PolygonRef {
                feature_id: id,
                polygon: 0,
            },
        }
    }

    fn stab_ids(tree: &IntervalTree, q: u64) -> Vec<u32> {
        let mut out = Vec::new();
        tree.stab(q, &mut out);
        let mut ids: Vec<u32> = out.into_iter().map(|r| r.feature_id).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn stab_is_inclusive_on_both_ends() {
        let tree = IntervalTree::build(vec![iv(10, 20, 1)]);
        assert_eq!(stab_ids(&tree, 10), vec![1]);
        assert_eq!(stab_ids(&tree, 20), vec![1]);
        assert_eq!(stab_ids(&tree, 15), vec![1]);
        assert!(stab_ids(&tree, 9).is_empty());
        assert!(stab_ids(&tree, 21).is_empty());
    }

    #[test]
    fn stab_finds_all_overlapping_intervals() {
        let tree = IntervalTree::build(vec![
            iv(0, 100, 1),
            iv(10, 20, 2),
            iv(15, 30, 3),
            iv(40, 50, 4),
            iv(90, 95, 5),
        ]);
        assert_eq!(stab_ids(&tree, 17), vec![1, 2, 3]);
        assert_eq!(stab_ids(&tree, 45), vec![1, 4]);
        assert_eq!(stab_ids(&tree, 92), vec![1, 5]);
        assert_eq!(stab_ids(&tree, 35), vec![1]);
        assert!(stab_ids(&tree, 101).is_empty());
    }

    #[test]
    fn empty_tree_stabs_nothing() {
        let tree = IntervalTree::build(Vec::new());
        assert!(stab_ids(&tree, 0).is_empty());
    }

    #[test]
    fn point_intervals_are_found() {
        let tree = IntervalTree::build(vec![iv(7, 7, 1), iv(7, 7, 2), iv(8, 8, 3)]);
        assert_eq!(stab_ids(&tree, 7), vec![1, 2]);
        assert_eq!(stab_ids(&tree, 8), vec![3]);
    }

    #[test]
    fn many_intervals_stay_consistent_with_linear_scan() {
        // Deterministic pseudo-random intervals.
        let mut state = 0x9e37_79b9_u64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        let intervals: Vec<Interval> = (0..500)
            .map(|i| {
                let lo = next() % 10_000;
                let hi = lo + next() % 200;
                iv(lo, hi, i)
            })
            .collect();
        let tree = IntervalTree::build(intervals.clone());
        for q in (0..10_200).step_by(97) {
            let mut expect: Vec<u32> = intervals
                .iter()
                .filter(|ivl| ivl.lo <= q && q <= ivl.hi)
                .map(|ivl| ivl.payload.feature_id)
                .collect();
            expect.sort_unstable();
            assert_eq!(stab_ids(&tree, q), expect, "q = {q}");
        }
    }
}
