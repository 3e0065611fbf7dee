use record::Record;

/// Indexed binary min-heap driving the k-way merge.
///
/// Each slot holds a record associated with an external index `i`, the
/// number of the stream that produced it, and every external index is
/// present at most once. That lets the merger say "stream `i` just yielded
/// its next record, place it" in O(log n) without scanning, and is why
/// extracting the minimum also tells you which stream to refill.
///
/// Ordering is the record ordering: ascending key, ties broken by
/// ascending stream order.
///
/// Internally this is the classic indexed priority queue: a 1-based heap
/// `pq` of external indexes, its inverse `qp` (`qp[pq[k]] == k`), and the
/// records themselves in `items`, addressed by external index.
pub struct IndexMinHeap {
    /// Number of elements currently on the heap.
    n: usize,
    /// Binary heap of external indexes, 1-based.
    pq: Vec<usize>,
    /// Inverse of `pq`: heap position of each external index, if present.
    qp: Vec<Option<usize>>,
    /// items[i] is the record associated with external index i.
    items: Vec<Option<Record>>,
}

impl IndexMinHeap {
    /// Creates a heap for `capacity` input streams (external indexes
    /// `0..capacity`).
    pub fn new(capacity: usize) -> Self {
        Self {
            n: 0,
            pq: vec![0; capacity + 1],
            qp: vec![None; capacity + 1],
            items: (0..=capacity).map(|_| None).collect(),
        }
    }

    /// Associates `item` with external index `i` and sifts it into place.
    ///
    /// `i` must not currently be on the heap; the merge loop guarantees
    /// that because a stream is only refilled after its record was taken.
    pub fn insert(&mut self, i: usize, item: Record) {
        debug_assert!(self.qp[i].is_none(), "external index {} already queued", i);

        self.n += 1;
        self.qp[i] = Some(self.n);
        self.pq[self.n] = i;
        self.items[i] = Some(item);
        self.swim(self.n);
    }

    /// Removes and returns the smallest record together with its external
    /// index, or `None` when the heap is empty.
    pub fn min(&mut self) -> Option<(usize, Record)> {
        if self.n == 0 {
            return None;
        }

        let index_of_min = self.pq[1];
        self.exchange(1, self.n);
        self.n -= 1;
        self.sink(1);

        self.qp[index_of_min] = None;
        self.items[index_of_min].take().map(|item| (index_of_min, item))
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// True when the record at heap position `i` sorts after the one at
    /// heap position `j`.
    fn greater(&self, i: usize, j: usize) -> bool {
        match (&self.items[self.pq[i]], &self.items[self.pq[j]]) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        }
    }

    fn exchange(&mut self, i: usize, j: usize) {
        self.pq.swap(i, j);
        self.qp[self.pq[i]] = Some(i);
        self.qp[self.pq[j]] = Some(j);
    }

    fn swim(&mut self, mut k: usize) {
        while k > 1 && self.greater(k / 2, k) {
            self.exchange(k, k / 2);
            k /= 2;
        }
    }

    fn sink(&mut self, mut k: usize) {
        while 2 * k <= self.n {
            let mut j = 2 * k;
            if j < self.n && self.greater(j, j + 1) {
                j += 1;
            }
            if !self.greater(k, j) {
                break;
            }
            self.exchange(k, j);
            k = j;
        }
    }
}
