/// Counter value from which a group is considered cached.
pub const INCACHE: u8 = 3;

/// Counter value a cached group jumps to; it then sits out `WAIT - INCACHE` visits.
pub const WAIT: u8 = 10;

/// Small-cache state, one counter per collapsed group.
///
/// A group whose counter is above `INCACHE` is cooling down and gets skipped; every
/// other group is active.
#[derive(Debug, Clone)]
pub struct SmallCache {
    counters: Box<[u8]>,
}

impl SmallCache {
    /// Creates a cache with every group active.
    pub fn new(groups: usize) -> Self {
        Self {
            counters: vec![0; groups].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn counter(&self, group: usize) -> u8 {
        self.counters[group]
    }

    pub fn is_cooling(&self, group: usize) -> bool {
        self.counters[group] > INCACHE
    }

    /// Counts the groups that will be processed when visited.
    pub fn active_count(&self) -> usize {
        self.counters.iter().filter(|&&c| c <= INCACHE).count()
    }

    /// Skips a cooling group for one visit.
    pub fn cool_down(&mut self, group: usize) {
        self.counters[group] -= 1;
    }

    /// The group violated a margin, it is active again.
    pub fn reset(&mut self, group: usize) {
        self.counters[group] = 0;
    }

    /// The group satisfied both margins on this visit.
    pub fn satisfied(&mut self, group: usize) {
        let counter = &mut self.counters[group];
        *counter = if *counter == INCACHE { WAIT } else { *counter + 1 };
    }
}
