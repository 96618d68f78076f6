//! Sorted set: a member→score dict paired with a rank-aware skip list.
//!
//! Members are unique strings ordered by `(score, member)`; score ties
//! break lexicographically. The skip list carries per-level span counts
//! (bottom-level nodes skipped by each forward pointer), which makes
//! rank queries O(log n). The dict gives O(1) member→score lookups; the
//! two structures are updated together and must stay consistent.
//!
//! Nodes live in an arena (`Vec` plus a free list) and link by index, so
//! the backward pointers cost nothing to manage.

use std::collections::HashMap;

use rand::Rng;

const MAX_LEVEL: usize = 16;

/// A member with its score, as returned by range queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub member: String,
    pub score: f64,
}

/// One side of a score range: a finite bound (inclusive or exclusive)
/// or an infinity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBorder {
    NegInf,
    PosInf,
    Value { value: f64, exclusive: bool },
}

impl ScoreBorder {
    /// Parses the wire syntax: `-inf`, `+inf`, `(x` (exclusive), or `x`.
    /// NaN is rejected.
    pub fn parse(s: &str) -> Result<Self, ()> {
        match s {
            "-inf" => return Ok(ScoreBorder::NegInf),
            "+inf" => return Ok(ScoreBorder::PosInf),
            _ => {}
        }
        let (raw, exclusive) = match s.strip_prefix('(') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let value: f64 = raw.parse().map_err(|_| ())?;
        if value.is_nan() {
            return Err(());
        }
        Ok(ScoreBorder::Value { value, exclusive })
    }

    /// Returns `true` if this border, used as a minimum, admits `score`.
    pub fn less(&self, score: f64) -> bool {
        match *self {
            ScoreBorder::NegInf => true,
            ScoreBorder::PosInf => false,
            ScoreBorder::Value { value, exclusive } => {
                if exclusive {
                    value < score
                } else {
                    value <= score
                }
            }
        }
    }

    /// Returns `true` if this border, used as a maximum, admits `score`.
    pub fn greater(&self, score: f64) -> bool {
        match *self {
            ScoreBorder::NegInf => false,
            ScoreBorder::PosInf => true,
            ScoreBorder::Value { value, exclusive } => {
                if exclusive {
                    value > score
                } else {
                    value >= score
                }
            }
        }
    }

    fn raw(&self) -> (f64, bool) {
        match *self {
            ScoreBorder::NegInf => (f64::NEG_INFINITY, false),
            ScoreBorder::PosInf => (f64::INFINITY, false),
            ScoreBorder::Value { value, exclusive } => (value, exclusive),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Level {
    forward: Option<usize>,
    /// Bottom-level nodes skipped by `forward`, counting the target.
    span: u64,
}

#[derive(Debug, Clone)]
struct Node {
    member: String,
    score: f64,
    backward: Option<usize>,
    levels: Vec<Level>,
}

/// The probabilistic index. Node 0 is the header and holds no element.
#[derive(Debug, Clone)]
struct SkipList {
    nodes: Vec<Node>,
    free: Vec<usize>,
    tail: Option<usize>,
    length: u64,
    level: usize,
}

/// Geometric level draw: a uniform value in `[0, 2^16 - 1)` mapped
/// through its bit length, clamped to the level cap.
fn random_level() -> usize {
    let total = (1u64 << MAX_LEVEL) - 1;
    let k = rand::thread_rng().gen_range(0..total);
    let bits = (64 - k.leading_zeros()) as usize;
    (MAX_LEVEL + 1).saturating_sub(bits).min(MAX_LEVEL)
}

impl SkipList {
    fn new() -> Self {
        let header = Node {
            member: String::new(),
            score: 0.0,
            backward: None,
            levels: vec![Level::default(); MAX_LEVEL],
        };
        Self {
            nodes: vec![header],
            free: Vec::new(),
            tail: None,
            length: 0,
            level: 1,
        }
    }

    fn alloc(&mut self, member: String, score: f64, level: usize) -> usize {
        let node = Node {
            member,
            score,
            backward: None,
            levels: vec![Level::default(); level],
        };
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    /// True if `(score, member)` sorts after node `id`'s element.
    fn precedes(&self, id: usize, score: f64, member: &str) -> bool {
        let node = &self.nodes[id];
        node.score < score || (node.score == score && node.member.as_str() < member)
    }

    fn insert(&mut self, member: &str, score: f64) {
        let mut update = [0usize; MAX_LEVEL];
        let mut rank = [0u64; MAX_LEVEL];

        // record per-level predecessors and their ranks
        let mut x = 0;
        for i in (0..self.level).rev() {
            rank[i] = if i == self.level - 1 { 0 } else { rank[i + 1] };
            while let Some(f) = self.nodes[x].levels[i].forward {
                if self.precedes(f, score, member) {
                    rank[i] += self.nodes[x].levels[i].span;
                    x = f;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        let level = random_level();
        if level > self.level {
            for i in self.level..level {
                rank[i] = 0;
                update[i] = 0;
                self.nodes[0].levels[i].span = self.length;
            }
            self.level = level;
        }

        let id = self.alloc(member.to_owned(), score, level);
        for i in 0..level {
            let prev = update[i];
            self.nodes[id].levels[i].forward = self.nodes[prev].levels[i].forward;
            self.nodes[prev].levels[i].forward = Some(id);

            let prev_span = self.nodes[prev].levels[i].span;
            self.nodes[id].levels[i].span = prev_span - (rank[0] - rank[i]);
            self.nodes[prev].levels[i].span = rank[0] - rank[i] + 1;
        }
        // levels above the new node's height skip one more element now
        for i in level..self.level {
            self.nodes[update[i]].levels[i].span += 1;
        }

        self.nodes[id].backward = if update[0] == 0 { None } else { Some(update[0]) };
        match self.nodes[id].levels[0].forward {
            Some(f) => self.nodes[f].backward = Some(id),
            None => self.tail = Some(id),
        }
        self.length += 1;
    }

    /// Unlinks `node` given its per-level predecessors, fixing spans.
    fn remove_node(&mut self, node: usize, update: &[usize; MAX_LEVEL]) {
        for i in 0..self.level {
            let prev = update[i];
            if self.nodes[prev].levels[i].forward == Some(node) {
                let node_span = self.nodes[node].levels[i].span;
                self.nodes[prev].levels[i].span += node_span - 1;
                self.nodes[prev].levels[i].forward = self.nodes[node].levels[i].forward;
            } else {
                self.nodes[prev].levels[i].span -= 1;
            }
        }

        match self.nodes[node].levels[0].forward {
            Some(f) => self.nodes[f].backward = self.nodes[node].backward,
            None => self.tail = self.nodes[node].backward,
        }

        while self.level > 1 && self.nodes[0].levels[self.level - 1].forward.is_none() {
            self.level -= 1;
        }
        self.length -= 1;
        self.free.push(node);
    }

    fn remove(&mut self, member: &str, score: f64) -> bool {
        let mut update = [0usize; MAX_LEVEL];
        let mut x = 0;
        for i in (0..self.level).rev() {
            while let Some(f) = self.nodes[x].levels[i].forward {
                if self.precedes(f, score, member) {
                    x = f;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        if let Some(target) = self.nodes[x].levels[0].forward {
            let node = &self.nodes[target];
            if node.score == score && node.member == member {
                self.remove_node(target, &update);
                return true;
            }
        }
        false
    }

    /// 1-based rank of a member, or 0 if absent.
    fn rank_of(&self, member: &str, score: f64) -> u64 {
        let mut rank = 0;
        let mut x = 0;
        for i in (0..self.level).rev() {
            while let Some(f) = self.nodes[x].levels[i].forward {
                let node = &self.nodes[f];
                if node.score < score || (node.score == score && node.member.as_str() <= member) {
                    rank += self.nodes[x].levels[i].span;
                    x = f;
                } else {
                    break;
                }
            }
            if x != 0 && self.nodes[x].member == member {
                return rank;
            }
        }
        0
    }

    /// Node at a 1-based rank, or `None` if out of range.
    fn by_rank(&self, rank: u64) -> Option<usize> {
        if rank == 0 || rank > self.length {
            return None;
        }
        let mut traversed = 0;
        let mut x = 0;
        for i in (0..self.level).rev() {
            while let Some(f) = self.nodes[x].levels[i].forward {
                if traversed + self.nodes[x].levels[i].span <= rank {
                    traversed += self.nodes[x].levels[i].span;
                    x = f;
                } else {
                    break;
                }
            }
            if traversed == rank {
                return Some(x);
            }
        }
        None
    }

    fn has_in_range(&self, min: &ScoreBorder, max: &ScoreBorder) -> bool {
        let (min_v, min_ex) = min.raw();
        let (max_v, max_ex) = max.raw();
        if min_v > max_v || (min_v == max_v && (min_ex || max_ex)) {
            return false;
        }
        let Some(tail) = self.tail else {
            return false;
        };
        if !min.less(self.nodes[tail].score) {
            return false;
        }
        let Some(first) = self.nodes[0].levels[0].forward else {
            return false;
        };
        max.greater(self.nodes[first].score)
    }

    /// First node whose score is admitted by both borders.
    fn first_in_range(&self, min: &ScoreBorder, max: &ScoreBorder) -> Option<usize> {
        if !self.has_in_range(min, max) {
            return None;
        }
        let mut x = 0;
        for i in (0..self.level).rev() {
            // advance while the next node is still below the range
            while let Some(f) = self.nodes[x].levels[i].forward {
                if !min.less(self.nodes[f].score) {
                    x = f;
                } else {
                    break;
                }
            }
        }
        let first = self.nodes[x].levels[0].forward?;
        if !max.greater(self.nodes[first].score) {
            return None;
        }
        Some(first)
    }

    /// Last node whose score is admitted by both borders.
    fn last_in_range(&self, min: &ScoreBorder, max: &ScoreBorder) -> Option<usize> {
        if !self.has_in_range(min, max) {
            return None;
        }
        let mut x = 0;
        for i in (0..self.level).rev() {
            while let Some(f) = self.nodes[x].levels[i].forward {
                if max.greater(self.nodes[f].score) {
                    x = f;
                } else {
                    break;
                }
            }
        }
        if x == 0 || !min.less(self.nodes[x].score) {
            return None;
        }
        Some(x)
    }

    /// Removes nodes ranked within the 1-based half-open `[start, stop)`.
    fn remove_range_by_rank(&mut self, start: u64, stop: u64) -> Vec<Element> {
        let mut update = [0usize; MAX_LEVEL];
        let mut removed = Vec::new();

        let mut rank = 0;
        let mut x = 0;
        for i in (0..self.level).rev() {
            while let Some(f) = self.nodes[x].levels[i].forward {
                if rank + self.nodes[x].levels[i].span < start {
                    rank += self.nodes[x].levels[i].span;
                    x = f;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        rank += 1;
        let mut node = self.nodes[x].levels[0].forward;
        while let Some(id) = node {
            if rank >= stop {
                break;
            }
            let next = self.nodes[id].levels[0].forward;
            removed.push(Element {
                member: self.nodes[id].member.clone(),
                score: self.nodes[id].score,
            });
            self.remove_node(id, &update);
            node = next;
            rank += 1;
        }
        removed
    }

    /// Removes nodes whose scores fall within the borders, up to `limit`
    /// when `limit > 0`.
    fn remove_range_by_score(
        &mut self,
        min: &ScoreBorder,
        max: &ScoreBorder,
        limit: usize,
    ) -> Vec<Element> {
        let mut update = [0usize; MAX_LEVEL];
        let mut removed = Vec::new();

        let mut x = 0;
        for i in (0..self.level).rev() {
            while let Some(f) = self.nodes[x].levels[i].forward {
                if !min.less(self.nodes[f].score) {
                    x = f;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        let mut node = self.nodes[x].levels[0].forward;
        while let Some(id) = node {
            if !max.greater(self.nodes[id].score) {
                break;
            }
            let next = self.nodes[id].levels[0].forward;
            removed.push(Element {
                member: self.nodes[id].member.clone(),
                score: self.nodes[id].score,
            });
            self.remove_node(id, &update);
            if limit > 0 && removed.len() == limit {
                break;
            }
            node = next;
        }
        removed
    }
}

/// A sorted set of unique string members, each with a float score.
#[derive(Debug, Clone)]
pub struct SortedSet {
    dict: HashMap<String, f64>,
    list: SkipList,
}

impl Default for SortedSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SortedSet {
    /// Creates an empty sorted set.
    pub fn new() -> Self {
        Self {
            dict: HashMap::new(),
            list: SkipList::new(),
        }
    }

    /// Number of members.
    pub fn len(&self) -> u64 {
        self.dict.len() as u64
    }

    /// Returns `true` if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    /// Adds `member` with `score`, or updates its score. Returns `true`
    /// when a new member was inserted. An update to the same score is a
    /// no-op.
    pub fn add(&mut self, member: &str, score: f64) -> bool {
        match self.dict.insert(member.to_owned(), score) {
            Some(old) => {
                if score != old {
                    self.list.remove(member, old);
                    self.list.insert(member, score);
                }
                false
            }
            None => {
                self.list.insert(member, score);
                true
            }
        }
    }

    /// Removes a member. Returns `false` if it was absent.
    pub fn remove(&mut self, member: &str) -> bool {
        match self.dict.remove(member) {
            Some(score) => {
                self.list.remove(member, score);
                true
            }
            None => false,
        }
    }

    /// Returns the member's score, or `None` if absent.
    pub fn get(&self, member: &str) -> Option<f64> {
        self.dict.get(member).copied()
    }

    /// 0-based rank in the requested direction, or -1 if absent.
    pub fn get_rank(&self, member: &str, desc: bool) -> i64 {
        let Some(&score) = self.dict.get(member) else {
            return -1;
        };
        let rank = self.list.rank_of(member, score);
        if desc {
            (self.list.length - rank) as i64
        } else {
            rank as i64 - 1
        }
    }

    /// Visits members ranked within the half-open `[start, stop)` in the
    /// requested direction. Bounds must be pre-clamped; panics otherwise.
    pub fn for_each(
        &self,
        start: u64,
        stop: u64,
        desc: bool,
        mut consumer: impl FnMut(&str, f64) -> bool,
    ) {
        let size = self.len();
        assert!(start <= size, "illegal start {start}");
        assert!(stop >= start && stop <= size, "illegal stop {stop}");
        if start == stop {
            return;
        }

        let mut node = if desc {
            if start > 0 {
                self.list.by_rank(size - start)
            } else {
                self.list.tail
            }
        } else if start > 0 {
            self.list.by_rank(start + 1)
        } else {
            self.list.nodes[0].levels[0].forward
        };

        for _ in 0..(stop - start) {
            let Some(id) = node else { break };
            let n = &self.list.nodes[id];
            if !consumer(&n.member, n.score) {
                break;
            }
            node = if desc {
                n.backward
            } else {
                n.levels[0].forward
            };
        }
    }

    /// Members ranked within the half-open `[start, stop)`, in the
    /// requested direction. Bounds must be pre-clamped.
    pub fn range(&self, start: u64, stop: u64, desc: bool) -> Vec<Element> {
        let mut out = Vec::with_capacity((stop - start) as usize);
        self.for_each(start, stop, desc, |member, score| {
            out.push(Element {
                member: member.to_owned(),
                score,
            });
            true
        });
        out
    }

    /// Number of members whose scores fall within the borders.
    pub fn count(&self, min: &ScoreBorder, max: &ScoreBorder) -> u64 {
        let mut n = 0;
        self.for_each(0, self.len(), false, |_, score| {
            if !min.less(score) {
                return true; // below the window, keep going
            }
            if !max.greater(score) {
                return false; // past the window, stop
            }
            n += 1;
            true
        });
        n
    }

    /// Members whose scores fall within the borders, after skipping
    /// `offset` from the directional start. `limit < 0` is unbounded,
    /// `limit == 0` returns nothing.
    pub fn range_by_score(
        &self,
        min: &ScoreBorder,
        max: &ScoreBorder,
        offset: i64,
        limit: i64,
        desc: bool,
    ) -> Vec<Element> {
        if limit == 0 || offset < 0 {
            return Vec::new();
        }

        let mut node = if desc {
            self.list.last_in_range(min, max)
        } else {
            self.list.first_in_range(min, max)
        };

        let mut skip = offset;
        while skip > 0 {
            let Some(id) = node else { return Vec::new() };
            node = if desc {
                self.list.nodes[id].backward
            } else {
                self.list.nodes[id].levels[0].forward
            };
            skip -= 1;
        }

        let mut out = Vec::new();
        while let Some(id) = node {
            if limit > 0 && out.len() as i64 == limit {
                break;
            }
            let n = &self.list.nodes[id];
            if !min.less(n.score) || !max.greater(n.score) {
                break;
            }
            out.push(Element {
                member: n.member.clone(),
                score: n.score,
            });
            node = if desc {
                n.backward
            } else {
                n.levels[0].forward
            };
        }
        out
    }

    /// Removes members ranked within the 0-based half-open `[start, stop)`.
    /// Returns the count removed.
    pub fn remove_by_rank(&mut self, start: u64, stop: u64) -> u64 {
        let removed = self.list.remove_range_by_rank(start + 1, stop + 1);
        for element in &removed {
            self.dict.remove(&element.member);
        }
        removed.len() as u64
    }

    /// Removes members whose scores fall within the borders. Returns the
    /// count removed.
    pub fn remove_by_score(&mut self, min: &ScoreBorder, max: &ScoreBorder) -> u64 {
        let removed = self.list.remove_range_by_score(min, max, 0);
        for element in &removed {
            self.dict.remove(&element.member);
        }
        removed.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn border(value: f64, exclusive: bool) -> ScoreBorder {
        ScoreBorder::Value { value, exclusive }
    }

    fn set_of(pairs: &[(&str, f64)]) -> SortedSet {
        let mut ss = SortedSet::new();
        for (m, s) in pairs {
            ss.add(m, *s);
        }
        ss
    }

    /// Verifies the span invariant: summing spans along any search path
    /// must reproduce every node's bottom-level rank.
    fn assert_spans_consistent(ss: &SortedSet) {
        let list = &ss.list;
        let mut expected = 0u64;
        let mut node = list.nodes[0].levels[0].forward;
        while let Some(id) = node {
            expected += 1;
            let n = &list.nodes[id];
            assert_eq!(
                list.rank_of(&n.member, n.score),
                expected,
                "rank mismatch for {}",
                n.member
            );
            node = n.levels[0].forward;
        }
        assert_eq!(expected, list.length);
        assert_eq!(ss.dict.len() as u64, list.length, "dict/list length skew");
    }

    #[test]
    fn add_and_get() {
        let mut ss = SortedSet::new();
        assert!(ss.add("alice", 100.0));
        assert!(!ss.add("alice", 100.0));
        assert_eq!(ss.get("alice"), Some(100.0));
        assert_eq!(ss.len(), 1);
    }

    #[test]
    fn update_score_moves_member() {
        let mut ss = set_of(&[("a", 10.0), ("b", 20.0), ("c", 30.0)]);
        assert_eq!(ss.get_rank("a", false), 0);

        assert!(!ss.add("a", 50.0));
        assert_eq!(ss.get_rank("a", false), 2);
        assert_eq!(ss.get_rank("b", false), 0);
        assert_spans_consistent(&ss);
    }

    #[test]
    fn remove_member() {
        let mut ss = set_of(&[("a", 1.0), ("b", 2.0)]);
        assert!(ss.remove("a"));
        assert!(!ss.remove("a"));
        assert_eq!(ss.len(), 1);
        assert_eq!(ss.get_rank("b", false), 0);
        assert_spans_consistent(&ss);
    }

    #[test]
    fn rank_orders_by_score_then_member() {
        let ss = set_of(&[("c", 1.0), ("a", 1.0), ("b", 1.0), ("z", 0.5)]);
        assert_eq!(ss.get_rank("z", false), 0);
        assert_eq!(ss.get_rank("a", false), 1);
        assert_eq!(ss.get_rank("b", false), 2);
        assert_eq!(ss.get_rank("c", false), 3);
        assert_eq!(ss.get_rank("missing", false), -1);
    }

    #[test]
    fn forward_and_reverse_ranks_are_symmetric() {
        let members = ["a", "b", "c", "d", "e", "f", "g"];
        let mut ss = SortedSet::new();
        for (i, m) in members.iter().enumerate() {
            ss.add(m, i as f64 * 1.5);
        }
        let n = ss.len() as i64;
        for m in members {
            let asc = ss.get_rank(m, false);
            let desc = ss.get_rank(m, true);
            assert_eq!(asc + desc + 1, n, "rank symmetry broken for {m}");
        }
    }

    #[test]
    fn range_ascending_and_descending() {
        let ss = set_of(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let asc = ss.range(0, 3, false);
        assert_eq!(
            asc.iter().map(|e| e.member.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        let desc = ss.range(0, 3, true);
        assert_eq!(
            desc.iter().map(|e| e.member.as_str()).collect::<Vec<_>>(),
            vec!["c", "b", "a"]
        );
        let mid = ss.range(1, 2, false);
        assert_eq!(mid[0].member, "b");
    }

    #[test]
    #[should_panic(expected = "illegal stop")]
    fn range_rejects_unclamped_bounds() {
        let ss = set_of(&[("a", 1.0)]);
        let _ = ss.range(0, 5, false);
    }

    #[test]
    fn count_with_borders() {
        let ss = set_of(&[("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)]);
        assert_eq!(ss.count(&border(2.0, false), &border(3.0, false)), 2);
        assert_eq!(ss.count(&border(2.0, true), &border(3.0, false)), 1);
        assert_eq!(ss.count(&ScoreBorder::NegInf, &ScoreBorder::PosInf), 4);
        assert_eq!(ss.count(&border(10.0, false), &ScoreBorder::PosInf), 0);
    }

    #[test]
    fn range_by_score_basic() {
        let ss = set_of(&[("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)]);
        let r = ss.range_by_score(&border(2.0, false), &border(4.0, false), 0, -1, false);
        assert_eq!(
            r.iter().map(|e| e.member.as_str()).collect::<Vec<_>>(),
            vec!["b", "c", "d"]
        );
    }

    #[test]
    fn range_by_score_exclusive_borders() {
        let ss = set_of(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let r = ss.range_by_score(&border(1.0, true), &border(3.0, true), 0, -1, false);
        assert_eq!(r.len(), 1);
        assert_eq!(r[0].member, "b");
    }

    #[test]
    fn range_by_score_offset_and_limit() {
        let ss = set_of(&[("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)]);
        let r = ss.range_by_score(&ScoreBorder::NegInf, &ScoreBorder::PosInf, 1, 2, false);
        assert_eq!(
            r.iter().map(|e| e.member.as_str()).collect::<Vec<_>>(),
            vec!["b", "c"]
        );
        // limit 0 is empty, offset past the end is empty
        assert!(ss
            .range_by_score(&ScoreBorder::NegInf, &ScoreBorder::PosInf, 0, 0, false)
            .is_empty());
        assert!(ss
            .range_by_score(&ScoreBorder::NegInf, &ScoreBorder::PosInf, 10, -1, false)
            .is_empty());
    }

    #[test]
    fn range_by_score_descending() {
        let ss = set_of(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let r = ss.range_by_score(&ScoreBorder::NegInf, &ScoreBorder::PosInf, 0, -1, true);
        assert_eq!(
            r.iter().map(|e| e.member.as_str()).collect::<Vec<_>>(),
            vec!["c", "b", "a"]
        );
        let r = ss.range_by_score(&ScoreBorder::NegInf, &ScoreBorder::PosInf, 1, 1, true);
        assert_eq!(r[0].member, "b");
    }

    #[test]
    fn remove_by_rank_half_open() {
        let mut ss = set_of(&[("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)]);
        let removed = ss.remove_by_rank(1, 3);
        assert_eq!(removed, 2);
        assert_eq!(ss.len(), 2);
        assert_eq!(ss.get("b"), None);
        assert_eq!(ss.get("c"), None);
        assert_eq!(ss.get_rank("d", false), 1);
        assert_spans_consistent(&ss);
    }

    #[test]
    fn remove_by_score_updates_dict() {
        let mut ss = set_of(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let removed = ss.remove_by_score(&border(2.0, false), &ScoreBorder::PosInf);
        assert_eq!(removed, 2);
        assert_eq!(ss.len(), 1);
        assert_eq!(ss.get("a"), Some(1.0));
        assert_spans_consistent(&ss);
    }

    #[test]
    fn spans_survive_a_large_workload() {
        let mut ss = SortedSet::new();
        for i in 0..500 {
            ss.add(&format!("m{i:03}"), (i % 50) as f64);
        }
        assert_spans_consistent(&ss);

        // churn: updates and removals
        for i in (0..500).step_by(3) {
            ss.add(&format!("m{i:03}"), (i % 7) as f64 * 10.0);
        }
        for i in (0..500).step_by(5) {
            ss.remove(&format!("m{i:03}"));
        }
        assert_spans_consistent(&ss);

        let n = ss.len() as i64;
        for element in ss.range(0, ss.len(), false) {
            let asc = ss.get_rank(&element.member, false);
            let desc = ss.get_rank(&element.member, true);
            assert_eq!(asc + desc + 1, n);
        }
    }

    #[test]
    fn infinity_scores_sort_at_the_ends() {
        let ss = set_of(&[
            ("mid", 0.0),
            ("hi", f64::INFINITY),
            ("lo", f64::NEG_INFINITY),
        ]);
        assert_eq!(ss.get_rank("lo", false), 0);
        assert_eq!(ss.get_rank("mid", false), 1);
        assert_eq!(ss.get_rank("hi", false), 2);
    }

    #[test]
    fn border_parsing() {
        assert_eq!(ScoreBorder::parse("-inf"), Ok(ScoreBorder::NegInf));
        assert_eq!(ScoreBorder::parse("+inf"), Ok(ScoreBorder::PosInf));
        assert_eq!(
            ScoreBorder::parse("1.5"),
            Ok(ScoreBorder::Value {
                value: 1.5,
                exclusive: false
            })
        );
        assert_eq!(
            ScoreBorder::parse("(3"),
            Ok(ScoreBorder::Value {
                value: 3.0,
                exclusive: true
            })
        );
        assert!(ScoreBorder::parse("abc").is_err());
        assert!(ScoreBorder::parse("(").is_err());
        assert!(ScoreBorder::parse("nan").is_err());
    }

    #[test]
    fn border_comparisons() {
        let inclusive = border(5.0, false);
        assert!(inclusive.less(5.0));
        assert!(inclusive.greater(5.0));
        let exclusive = border(5.0, true);
        assert!(!exclusive.less(5.0));
        assert!(exclusive.less(5.1));
        assert!(!exclusive.greater(5.0));
        assert!(ScoreBorder::NegInf.less(f64::NEG_INFINITY + 1.0));
        assert!(ScoreBorder::PosInf.greater(1e308));
    }

    #[test]
    fn empty_set_queries() {
        let ss = SortedSet::new();
        assert_eq!(ss.get_rank("x", false), -1);
        assert!(ss.range(0, 0, false).is_empty());
        assert_eq!(ss.count(&ScoreBorder::NegInf, &ScoreBorder::PosInf), 0);
        assert!(ss
            .range_by_score(&ScoreBorder::NegInf, &ScoreBorder::PosInf, 0, -1, false)
            .is_empty());
    }

    #[test]
    fn random_level_stays_in_bounds() {
        for _ in 0..10_000 {
            let level = random_level();
            assert!((1..=MAX_LEVEL).contains(&level));
        }
    }
}
