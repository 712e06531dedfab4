use std::io::Read;

use log::info;

use super::Example;
use crate::{Result, layout::Header};

/// Every example of a run, in file order, with duplicates flagged.
#[derive(Debug, Clone)]
pub struct ExampleStore {
    examples: Vec<Example>,
    order: Vec<usize>,
}

impl ExampleStore {
    /// Reads `header.num_examples` records and puts them in canonical order.
    ///
    /// # Arguments
    /// * `reader` - The example byte stream.
    /// * `header` - The run's header.
    ///
    /// # Returns
    /// The loaded store or the first record error.
    pub fn load<R: Read + ?Sized>(reader: &mut R, header: &Header) -> Result<Self> {
        let examples = (0..header.num_examples)
            .map(|index| Example::read(reader, header, index))
            .collect::<Result<Vec<_>>>()?;

        let store = Self::from_examples(examples);
        info!(
            examples = store.len(),
            unique = store.unique_count();
            "loaded examples"
        );
        Ok(store)
    }

    /// Builds a store out of already parsed examples.
    ///
    /// The sort is stable, so among byte-identical records the earliest one in file order
    /// becomes the unique representative.
    pub fn from_examples(mut examples: Vec<Example>) -> Self {
        let mut order: Vec<usize> = (0..examples.len()).collect();
        order.sort_by(|&a, &b| examples[a].canonical_cmp(&examples[b]));

        let mut prev: Option<usize> = None;
        for &idx in &order {
            let unique = prev.is_none_or(|p| !examples[p].is_duplicate_of(&examples[idx]));
            examples[idx].set_unique(unique);
            prev = Some(idx);
        }

        Self { examples, order }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Returns the examples in file order.
    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    /// Returns every example in canonical order.
    pub fn sorted(&self) -> impl Iterator<Item = &Example> + '_ {
        self.order.iter().map(|&idx| &self.examples[idx])
    }

    /// Returns the unique examples in canonical order.
    pub fn sorted_unique(&self) -> Vec<&Example> {
        self.sorted().filter(|ex| ex.is_unique()).collect()
    }

    /// Returns the amount of examples flagged as unique.
    pub fn unique_count(&self) -> usize {
        self.examples.iter().filter(|ex| ex.is_unique()).count()
    }
}
