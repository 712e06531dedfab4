use std::{
    io::{Read, Write},
    ops::Range,
};

use log::info;

use crate::{
    LsvmErr, Result, codec,
    layout::BlockLayout,
};

/// Where each block lives inside a flat weight buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BlockRanges(Box<[Range<usize>]>);

impl BlockRanges {
    fn new(layout: &BlockLayout) -> Self {
        let mut offset = 0;
        let ranges = layout
            .sizes()
            .map(|size| {
                let range = offset..offset + size;
                offset += size;
                range
            })
            .collect();

        Self(ranges)
    }

    fn get(&self, block: usize) -> Range<usize> {
        self.0[block].clone()
    }
}

/// The shared weight vector `w` and one bias vector per dataset.
///
/// Every vector is a flat buffer of `dim` doubles laid out block after block, the same
/// order the model file uses.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    ranges: BlockRanges,
    w: Box<[f64]>,
    bias: Vec<Box<[f64]>>,
}

impl Model {
    /// Creates a model with every weight set to zero.
    ///
    /// # Arguments
    /// * `layout` - The run's block layout.
    /// * `num_datasets` - The amount of bias vectors.
    pub fn zeros(layout: &BlockLayout, num_datasets: usize) -> Self {
        let dim = layout.dim();

        Self {
            ranges: BlockRanges::new(layout),
            w: vec![0.; dim].into_boxed_slice(),
            bias: (0..num_datasets)
                .map(|_| vec![0.; dim].into_boxed_slice())
                .collect(),
        }
    }

    /// Reads a model: `w` first, then each dataset's bias vector in dataset order.
    ///
    /// # Arguments
    /// * `reader` - The model byte stream.
    /// * `layout` - The run's block layout.
    /// * `num_datasets` - The amount of bias vectors to read.
    ///
    /// # Returns
    /// The model or an error if the stream is too short.
    pub fn read<R: Read + ?Sized>(
        reader: &mut R,
        layout: &BlockLayout,
        num_datasets: usize,
    ) -> Result<Self> {
        let dim = layout.dim();
        let w = codec::read_f64s(reader, dim, "shared weights")?;
        let bias = (0..num_datasets)
            .map(|_| codec::read_f64s(reader, dim, "bias weights").map(Vec::into_boxed_slice))
            .collect::<Result<Vec<_>>>()?;

        info!(dim = dim, datasets = num_datasets; "read initial model");

        Ok(Self {
            ranges: BlockRanges::new(layout),
            w: w.into_boxed_slice(),
            bias,
        })
    }

    /// Writes the model in the same layout `read` expects.
    pub fn write<W: Write + ?Sized>(&self, writer: &mut W) -> Result<()> {
        codec::write_f64s(writer, &self.w)?;
        for bias in &self.bias {
            codec::write_f64s(writer, bias)?;
        }

        Ok(())
    }

    /// Returns the total dimension of each vector.
    pub fn dim(&self) -> usize {
        self.w.len()
    }

    /// Returns the amount of per-dataset bias vectors.
    pub fn num_datasets(&self) -> usize {
        self.bias.len()
    }

    /// Returns the whole shared weight vector.
    pub fn w(&self) -> &[f64] {
        &self.w
    }

    /// Returns the whole bias vector of `dataset`.
    pub fn bias(&self, dataset: usize) -> &[f64] {
        &self.bias[dataset]
    }

    /// Returns block `block` of the shared weights.
    pub fn w_block(&self, block: usize) -> &[f64] {
        &self.w[self.ranges.get(block)]
    }

    pub fn w_block_mut(&mut self, block: usize) -> &mut [f64] {
        let range = self.ranges.get(block);
        &mut self.w[range]
    }

    /// Returns block `block` of `dataset`'s bias.
    pub fn bias_block(&self, dataset: usize, block: usize) -> &[f64] {
        &self.bias[dataset][self.ranges.get(block)]
    }

    /// Returns mutable views of block `block` in both the shared weights and `dataset`'s
    /// bias, for updates that touch both.
    pub fn blocks_mut(&mut self, dataset: usize, block: usize) -> (&mut [f64], &mut [f64]) {
        let range = self.ranges.get(block);
        (&mut self.w[range.clone()], &mut self.bias[dataset][range])
    }

    /// Returns mutable views of block `block` in every bias vector.
    pub fn bias_blocks_mut(&mut self, block: usize) -> impl Iterator<Item = &mut [f64]> + '_ {
        let range = self.ranges.get(block);
        self.bias.iter_mut().map(move |bias| &mut bias[range.clone()])
    }

    /// Raises every coordinate of `w` and of each bias below its lower bound up to it.
    ///
    /// # Returns
    /// A `SizeMismatch` error if the bounds don't cover the model's dimension.
    pub fn clamp(&mut self, bounds: &LowerBounds) -> Result<()> {
        if bounds.values.len() != self.w.len() {
            return Err(LsvmErr::SizeMismatch {
                what: "lower bounds",
                got: bounds.values.len(),
                expected: self.w.len(),
            });
        }

        for vector in std::iter::once(&mut self.w).chain(self.bias.iter_mut()) {
            vector
                .iter_mut()
                .zip(&bounds.values)
                .for_each(|(v, &lb)| *v = v.max(lb));
        }

        Ok(())
    }

    /// Shared score of a sparse example: `<x, w>`.
    pub fn dot<'x>(&self, blocks: impl Iterator<Item = (usize, &'x [f32])>) -> f64 {
        blocks.map(|(block, x)| dot(x, self.w_block(block))).sum()
    }

    /// Bias contribution of a sparse example: `<x, bias[dataset]>`.
    pub fn dot_bias<'x>(
        &self,
        dataset: usize,
        blocks: impl Iterator<Item = (usize, &'x [f32])>,
    ) -> f64 {
        blocks
            .map(|(block, x)| dot(x, self.bias_block(dataset, block)))
            .sum()
    }

    /// Biased score of a sparse example: `<x, w + bias[dataset]>`.
    pub fn dot_biased<'x>(
        &self,
        dataset: usize,
        blocks: impl Iterator<Item = (usize, &'x [f32])>,
    ) -> f64 {
        let bias = &self.bias[dataset];
        blocks
            .map(|(block, x)| {
                let range = self.ranges.get(block);
                x.iter()
                    .zip(&self.w[range.clone()])
                    .zip(&bias[range])
                    .map(|((&x, &w), &b)| (w + b) * x as f64)
                    .sum::<f64>()
            })
            .sum()
    }
}

/// The per-coordinate floor applied to `w` and every bias after each pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LowerBounds {
    values: Box<[f64]>,
}

impl LowerBounds {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values: values.into_boxed_slice(),
        }
    }

    /// Reads one double per coordinate of the layout.
    pub fn read<R: Read + ?Sized>(reader: &mut R, layout: &BlockLayout) -> Result<Self> {
        let values = codec::read_f64s(reader, layout.dim(), "lower bounds")?;
        Ok(Self::new(values))
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

fn dot(x: &[f32], w: &[f64]) -> f64 {
    x.iter().zip(w).map(|(&x, &w)| w * x as f64).sum()
}
