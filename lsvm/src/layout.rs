use std::io::Read;

use log::info;

use crate::{LsvmErr, Result, codec};

/// Position inside the extended label that holds the 1-based dataset identifier.
pub const DATASET_FIELD: usize = 5;

/// A contiguous segment of the feature and weight space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    pub size: usize,
    pub regmult: f32,
    pub learnmult: f32,
}

/// The block structure shared by every example and by the model of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockLayout {
    blocks: Vec<Block>,
    dim: usize,
}

impl BlockLayout {
    /// Creates a new `BlockLayout`.
    ///
    /// # Arguments
    /// * `blocks` - The blocks in index order.
    pub fn new(blocks: Vec<Block>) -> Self {
        let dim = blocks.iter().map(|b| b.size).sum();
        Self { blocks, dim }
    }

    /// Returns the amount of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns the total feature dimension, the sum of every block size.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Returns the block at `idx`, if any.
    pub fn get(&self, idx: usize) -> Option<&Block> {
        self.blocks.get(idx)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Returns an iterator over the block sizes.
    pub fn sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocks.iter().map(|b| b.size)
    }
}

/// The run's header: example and dataset counts plus the block layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub num_examples: usize,
    pub label_size: usize,
    pub num_datasets: usize,
    pub layout: BlockLayout,
}

impl Header {
    /// Reads a header.
    ///
    /// The stream holds four integers (examples, label size, blocks, datasets), then one
    /// integer size per block, then the per-block regularization multipliers and
    /// learning rate multipliers as floats.
    ///
    /// # Arguments
    /// * `reader` - The header byte stream.
    ///
    /// # Returns
    /// The parsed header or an error if it is truncated or holds unusable values.
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let fields = codec::read_i32s(reader, 4, "header fields")?;
        let num_examples = codec::count("numExamples", fields[0])?;
        let label_size = codec::count("labelSize", fields[1])?;
        let num_blocks = codec::count("numBlocks", fields[2])?;
        let num_datasets = codec::count("numDatasets", fields[3])?;

        if num_examples == 0 {
            return Err(LsvmErr::InvalidHeader {
                field: "numExamples",
                value: 0,
            });
        }

        if label_size <= DATASET_FIELD {
            return Err(LsvmErr::InvalidHeader {
                field: "labelSize",
                value: label_size as i64,
            });
        }

        let sizes = codec::read_i32s(reader, num_blocks, "block sizes")?;
        let regmult = codec::read_f32s(reader, num_blocks, "regularization multipliers")?;
        let learnmult = codec::read_f32s(reader, num_blocks, "learning rate multipliers")?;

        let blocks = sizes
            .into_iter()
            .zip(regmult)
            .zip(learnmult)
            .map(|((size, regmult), learnmult)| {
                Ok(Block {
                    size: codec::count("blockSize", size)?,
                    regmult,
                    learnmult,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let header = Self {
            num_examples,
            label_size,
            num_datasets,
            layout: BlockLayout::new(blocks),
        };
        header.log_summary();
        Ok(header)
    }

    fn log_summary(&self) {
        info!(
            examples = self.num_examples,
            label_size = self.label_size,
            blocks = self.layout.len(),
            datasets = self.num_datasets,
            dim = self.layout.dim();
            "read header"
        );

        for (idx, block) in self.layout.blocks().iter().enumerate() {
            info!(
                block = idx,
                size = block.size,
                regmult = block.regmult,
                learnmult = block.learnmult;
                "block"
            );
        }
    }
}

/// The amount of examples that belong to each dataset, indexed by 0-based dataset id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetCounts {
    counts: Vec<usize>,
}

impl DatasetCounts {
    /// Creates a new `DatasetCounts` table.
    pub fn new(counts: Vec<usize>) -> Self {
        Self { counts }
    }

    /// Reads one integer count per dataset.
    ///
    /// # Arguments
    /// * `reader` - The count byte stream.
    /// * `num_datasets` - The amount of datasets declared by the header.
    pub fn read<R: Read + ?Sized>(reader: &mut R, num_datasets: usize) -> Result<Self> {
        let counts = codec::read_i32s(reader, num_datasets, "dataset counts")?
            .into_iter()
            .map(|c| codec::count("datasetCount", c))
            .collect::<Result<Vec<_>>>()?;

        for (dataset, count) in counts.iter().enumerate() {
            info!(dataset = dataset, count = *count; "dataset count");
        }

        Ok(Self { counts })
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Returns the count of `dataset`, or `None` if it is out of range.
    pub fn get(&self, dataset: usize) -> Option<usize> {
        self.counts.get(dataset).copied()
    }
}
