use super::Example;

/// A maximal run of unique examples sharing the same extended label.
///
/// The members are the candidate latent placements of one training example; the
/// optimizer picks the best-scoring one on every visit.
#[derive(Debug, Clone, Copy)]
pub struct CollapsedGroup<'a> {
    members: &'a [&'a Example],
}

impl<'a> CollapsedGroup<'a> {
    pub fn members(&self) -> &'a [&'a Example] {
        self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns the class label shared by every member.
    pub fn label(&self) -> i32 {
        self.members[0].label()
    }

    /// Returns the dataset shared by every member.
    pub fn dataset(&self) -> Option<usize> {
        self.members[0].dataset()
    }
}

/// Partitions sorted unique examples into groups of equal extended label.
///
/// # Arguments
/// * `sorted` - Unique examples in canonical order.
///
/// # Returns
/// The groups, in order, whose concatenation is exactly `sorted`.
pub fn collapse<'a>(sorted: &'a [&'a Example]) -> Vec<CollapsedGroup<'a>> {
    sorted
        .chunk_by(|a, b| a.same_label(b))
        .map(|members| CollapsedGroup { members })
        .collect()
}
