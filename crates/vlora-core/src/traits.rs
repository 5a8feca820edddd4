//! Core trait definitions.

/// Collaborator seam for training-data sources.
///
/// Training loops and batchers consume prepared samples through this trait;
/// they never reach into the data-preparation internals.
pub trait Dataset: Send + Sync {
    /// The item type yielded by this dataset.
    type Item;

    /// Get the number of samples in the dataset.
    fn len(&self) -> usize;

    /// Check if the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a sample by index.
    fn get(&self, index: usize) -> Option<Self::Item>;
}
