use log::{debug, info};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};

use super::{SmallCache, TrainConfig};
use crate::{
    LsvmErr, Result,
    data::{CollapsedGroup, Example},
    layout::{BlockLayout, DatasetCounts},
    model::{LowerBounds, Model},
};

/// Offset added to the step counter in the learning rate schedule.
const RATE_OFFSET: f64 = 1000.0;

/// What a training run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainStats {
    /// Groups processed, cooling visits excluded.
    pub steps: usize,
    /// Full passes over the groups.
    pub passes: usize,
}

/// The best scoring member of a group under one of the two scores.
#[derive(Debug, Clone, Copy)]
struct Placement<'e> {
    example: &'e Example,
    score: f64,
}

/// Stochastic subgradient trainer for the shared weights and the per-dataset biases.
pub struct Trainer<'a, R: Rng> {
    config: TrainConfig,
    layout: &'a BlockLayout,
    counts: &'a DatasetCounts,
    rng: R,
}

impl<'a> Trainer<'a, StdRng> {
    /// Creates a trainer whose RNG is seeded from `config.seed`, or from the OS when unset.
    pub fn from_config(
        config: TrainConfig,
        layout: &'a BlockLayout,
        counts: &'a DatasetCounts,
    ) -> Self {
        let rng = generate_rng(config.seed);
        Self::new(config, layout, counts, rng)
    }
}

impl<'a, R: Rng> Trainer<'a, R> {
    /// Creates a new `Trainer`.
    ///
    /// # Arguments
    /// * `config` - Hyperparameters and run bounds.
    /// * `layout` - The run's block layout.
    /// * `counts` - The amount of examples in each dataset.
    /// * `rng` - The source of the per-pass permutations.
    pub fn new(
        config: TrainConfig,
        layout: &'a BlockLayout,
        counts: &'a DatasetCounts,
        rng: R,
    ) -> Self {
        Self {
            config,
            layout,
            counts,
            rng,
        }
    }

    /// Runs passes over `groups` until the step budget is spent, updating `model` in place.
    ///
    /// Every pass visits the groups in a fresh random order and ends by clamping the model
    /// to `bounds`. The budget is only checked between passes.
    ///
    /// # Arguments
    /// * `groups` - The collapsed training groups.
    /// * `model` - The model to train, read as the initial weights.
    /// * `bounds` - The per-coordinate lower bounds.
    ///
    /// # Returns
    /// The run's statistics, or an error if the inputs don't fit together.
    pub fn train(
        &mut self,
        groups: &[CollapsedGroup<'_>],
        model: &mut Model,
        bounds: &LowerBounds,
    ) -> Result<TrainStats> {
        let sizes = self.check_inputs(groups, model, bounds)?;

        info!(
            groups = groups.len(),
            iterations = self.config.iterations,
            c = self.config.c,
            j = self.config.j,
            lambda = self.config.lambda;
            "starting training"
        );

        let mut cache = SmallCache::new(groups.len());
        let mut order: Vec<usize> = (0..groups.len()).collect();
        let mut stats = TrainStats::default();
        let interval = self.config.progress_interval.get();

        while stats.steps < self.config.iterations {
            order.shuffle(&mut self.rng);
            let active = cache.active_count();

            for &i in &order {
                if cache.is_cooling(i) {
                    cache.cool_down(i);
                    continue;
                }

                let t = stats.steps as f64 + RATE_OFFSET;
                let rate_data = active as f64 * self.config.c / t;
                let rate_reg = 1.0 / t;

                if stats.steps % interval == 0 {
                    info!(steps = stats.steps, passes = stats.passes, active = active; "training");
                }
                stats.steps += 1;

                let satisfied = self.step(&groups[i], model, &sizes, rate_data, rate_reg);
                match satisfied {
                    Some(label) if label < 0 => cache.satisfied(i),
                    Some(_) => {}
                    None => cache.reset(i),
                }
            }

            model.clamp(bounds)?;
            stats.passes += 1;
            debug!(passes = stats.passes, steps = stats.steps; "pass finished");
        }

        info!(steps = stats.steps, passes = stats.passes; "training finished");
        Ok(stats)
    }

    /// Processes a single group.
    ///
    /// # Returns
    /// The group's label if both margins were satisfied, `None` if any update fired.
    fn step(
        &self,
        group: &CollapsedGroup<'_>,
        model: &mut Model,
        sizes: &[f64],
        rate_data: f64,
        rate_reg: f64,
    ) -> Option<i32> {
        let (shared, biased) = latent_max(group.members(), model)?;

        self.decay(model, rate_reg);

        let mut violated = false;

        let label = shared.example.label();
        if f64::from(label) * shared.score < 1.0 {
            violated = true;
            let sign = self.sign(label);
            for (block, x) in shared.example.blocks() {
                let mult = sign * rate_data * self.learnmult(block);
                axpy(mult, x, model.w_block_mut(block));
            }
        }

        let label = biased.example.label();
        if f64::from(label) * biased.score < 1.0 {
            violated = true;
            if let Some(dataset) = biased.example.dataset() {
                let sign = self.sign(label);
                for (block, x) in biased.example.blocks() {
                    let mult = sign * rate_data * self.learnmult(block) / sizes[dataset];
                    let (w, bias) = model.blocks_mut(dataset, block);
                    axpy(mult, x, w);
                    axpy(mult, x, bias);
                }
            }
        }

        (!violated).then_some(label)
    }

    /// Shrinks `w` and every bias toward zero, block by block.
    fn decay(&self, model: &mut Model, rate_reg: f64) {
        let lambda = self.config.lambda;

        for (idx, block) in self.layout.blocks().iter().enumerate() {
            let mult = rate_reg * f64::from(block.regmult) * f64::from(block.learnmult);

            for w in model.w_block_mut(idx) {
                *w -= mult * *w;
            }

            for bias in model.bias_blocks_mut(idx) {
                for b in bias {
                    *b -= lambda * (mult * *b);
                }
            }
        }
    }

    fn sign(&self, label: i32) -> f64 {
        if label > 0 { self.config.j } else { -1.0 }
    }

    fn learnmult(&self, block: usize) -> f64 {
        f64::from(self.layout.blocks()[block].learnmult)
    }

    /// Checks the model and bounds match the layout and that every referenced dataset has
    /// a usable count.
    ///
    /// # Returns
    /// The dataset counts as floats, indexed by dataset.
    fn check_inputs(
        &self,
        groups: &[CollapsedGroup<'_>],
        model: &Model,
        bounds: &LowerBounds,
    ) -> Result<Vec<f64>> {
        if groups.is_empty() {
            return Err(LsvmErr::EmptyTrainingSet);
        }

        let dim = self.layout.dim();
        for (what, got) in [("model", model.dim()), ("lower bounds", bounds.values().len())] {
            if got != dim {
                return Err(LsvmErr::SizeMismatch {
                    what,
                    got,
                    expected: dim,
                });
            }
        }

        if model.num_datasets() != self.counts.len() {
            return Err(LsvmErr::SizeMismatch {
                what: "bias vectors",
                got: model.num_datasets(),
                expected: self.counts.len(),
            });
        }

        let datasets = groups
            .iter()
            .flat_map(|g| g.members())
            .filter_map(|ex| ex.dataset());

        for dataset in datasets {
            if self.counts.get(dataset).unwrap_or(0) == 0 {
                return Err(LsvmErr::ZeroDatasetCount { dataset });
            }
        }

        Ok((0..self.counts.len())
            .map(|d| self.counts.get(d).unwrap_or(0) as f64)
            .collect())
    }
}

/// Generates the permutation RNG.
///
/// # Arguments
/// * `seed` - A fixed seed, or `None` to seed from the OS.
pub fn generate_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Finds the best member of a group under the shared score and under the biased score.
/// The first maximum wins ties.
fn latent_max<'e>(
    members: &[&'e Example],
    model: &Model,
) -> Option<(Placement<'e>, Placement<'e>)> {
    let mut candidates = members.iter().map(|&example| {
        let score = model.dot(example.blocks());
        let biased = match example.dataset() {
            Some(dataset) => score + model.dot_bias(dataset, example.blocks()),
            None => score,
        };

        (
            Placement { example, score },
            Placement {
                example,
                score: biased,
            },
        )
    });

    let first = candidates.next()?;
    Some(candidates.fold(first, |(shared, biased), (s, b)| {
        (
            if s.score > shared.score { s } else { shared },
            if b.score > biased.score { b } else { biased },
        )
    }))
}

fn axpy(alpha: f64, x: &[f32], y: &mut [f64]) {
    y.iter_mut()
        .zip(x)
        .for_each(|(y, &x)| *y += alpha * f64::from(x));
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, num::NonZeroUsize};

    use super::*;
    use crate::{
        codec::write_values,
        data::{ExampleStore, collapse},
        layout::{Block, Header},
    };

    fn layout(size: usize) -> BlockLayout {
        BlockLayout::new(vec![Block {
            size,
            regmult: 1.0,
            learnmult: 1.0,
        }])
    }

    fn store(
        examples: &[(i32, i32, &[f32])],
        layout: &BlockLayout,
        num_datasets: usize,
    ) -> ExampleStore {
        let header = Header {
            num_examples: examples.len(),
            label_size: 6,
            num_datasets,
            layout: layout.clone(),
        };

        let parsed = examples
            .iter()
            .enumerate()
            .map(|(idx, &(label, dataset, x))| {
                let mut bytes = Vec::new();
                write_values(&mut bytes, &[label, idx as i32, 0, 0, 0, dataset]).unwrap();
                write_values(&mut bytes, &[1, x.len() as i32 + 1]).unwrap();
                write_values(&mut bytes, &[1.0f32]).unwrap();
                write_values(&mut bytes, x).unwrap();
                Example::read(&mut Cursor::new(bytes), &header, idx).unwrap()
            })
            .collect();

        ExampleStore::from_examples(parsed)
    }

    fn config(c: f64, iterations: usize) -> TrainConfig {
        TrainConfig {
            iterations,
            seed: Some(42),
            progress_interval: NonZeroUsize::new(1).unwrap(),
            ..TrainConfig::new(c, 1.0, 1.0)
        }
    }

    #[test]
    fn empty_training_sets_are_rejected() {
        let layout = layout(1);
        let counts = DatasetCounts::new(vec![]);
        let mut model = Model::zeros(&layout, 0);
        let bounds = LowerBounds::new(vec![0.0]);

        let mut trainer = Trainer::from_config(config(1.0, 10), &layout, &counts);
        assert!(matches!(
            trainer.train(&[], &mut model, &bounds),
            Err(LsvmErr::EmptyTrainingSet)
        ));
    }

    #[test]
    fn referenced_datasets_need_a_positive_count() {
        let layout = layout(1);
        let store = store(&[(1, 1, &[1.0]), (-1, 2, &[1.0])], &layout, 2);
        let sorted = store.sorted_unique();
        let groups = collapse(&sorted);

        let counts = DatasetCounts::new(vec![3, 0]);
        let mut model = Model::zeros(&layout, 2);
        let bounds = LowerBounds::new(vec![f64::NEG_INFINITY]);

        let mut trainer = Trainer::from_config(config(1.0, 10), &layout, &counts);
        assert!(matches!(
            trainer.train(&groups, &mut model, &bounds),
            Err(LsvmErr::ZeroDatasetCount { dataset: 1 })
        ));
    }

    #[test]
    fn mismatched_models_are_rejected() {
        let layout = layout(2);
        let store = store(&[(1, 1, &[1.0, 0.0])], &layout, 1);
        let sorted = store.sorted_unique();
        let groups = collapse(&sorted);

        let counts = DatasetCounts::new(vec![1]);
        let mut model = Model::zeros(&layout, 0);
        let bounds = LowerBounds::new(vec![0.0, 0.0]);

        let mut trainer = Trainer::from_config(config(1.0, 10), &layout, &counts);
        assert!(matches!(
            trainer.train(&groups, &mut model, &bounds),
            Err(LsvmErr::SizeMismatch { what: "bias vectors", .. })
        ));
    }

    #[test]
    fn the_budget_is_checked_between_passes() {
        let layout = layout(1);
        let store = store(&[(1, 1, &[1.0]), (-1, 1, &[1.0])], &layout, 0);
        let sorted = store.sorted_unique();
        let groups = collapse(&sorted);

        let counts = DatasetCounts::new(vec![]);
        let mut model = Model::zeros(&layout, 0);
        let bounds = LowerBounds::new(vec![f64::NEG_INFINITY]);

        // Without data updates every score stays at 0, a violation, so nothing is cached.
        let mut trainer = Trainer::from_config(config(0.0, 5), &layout, &counts);
        let stats = trainer.train(&groups, &mut model, &bounds).unwrap();

        assert_eq!(stats, TrainStats { steps: 6, passes: 3 });
    }

    #[test]
    fn decay_shrinks_weights_toward_zero_without_crossing() {
        let layout = layout(2);
        let store = store(&[(1, 1, &[0.0, 0.0])], &layout, 1);
        let sorted = store.sorted_unique();
        let groups = collapse(&sorted);

        let counts = DatasetCounts::new(vec![1]);
        let mut model = Model::zeros(&layout, 1);
        model.w_block_mut(0).copy_from_slice(&[2.0, -2.0]);
        model.bias_blocks_mut(0).for_each(|b| b.copy_from_slice(&[1.0, -1.0]));
        let bounds = LowerBounds::new(vec![f64::NEG_INFINITY; 2]);

        let mut trainer = Trainer::from_config(config(0.0, 1), &layout, &counts);
        let mut prev = model.clone();
        for _ in 0..20 {
            trainer.train(&groups, &mut model, &bounds).unwrap();

            assert!(model.w()[0] < prev.w()[0] && model.w()[0] > 0.0);
            assert!(model.w()[1] > prev.w()[1] && model.w()[1] < 0.0);
            assert!(model.bias(0)[0] < prev.bias(0)[0] && model.bias(0)[0] > 0.0);
            assert!(model.bias(0)[1] > prev.bias(0)[1] && model.bias(0)[1] < 0.0);
            prev = model.clone();
        }
    }

    #[test]
    fn every_pass_ends_above_the_lower_bounds() {
        let layout = layout(2);
        let store = store(
            &[(-1, 1, &[1.0, 1.0]), (-1, 2, &[3.0, 0.5]), (1, 1, &[0.1, 0.0])],
            &layout,
            2,
        );
        let sorted = store.sorted_unique();
        let groups = collapse(&sorted);

        let counts = DatasetCounts::new(vec![2, 1]);
        let mut model = Model::zeros(&layout, 2);
        let bounds = LowerBounds::new(vec![0.0, -0.01]);

        let mut trainer = Trainer::from_config(config(10.0, 1), &layout, &counts);
        for _ in 0..10 {
            trainer.train(&groups, &mut model, &bounds).unwrap();

            let vectors = std::iter::once(model.w()).chain((0..2).map(|d| model.bias(d)));
            for v in vectors {
                assert!(v[0] >= 0.0);
                assert!(v[1] >= -0.01);
            }
        }
    }

    #[test]
    fn ties_keep_the_first_member() {
        let layout = layout(1);
        let store = store(&[(1, 1, &[1.0]), (1, 1, &[2.0])], &layout, 0);
        let a = &store.examples()[0];
        let b = &store.examples()[1];

        let model = Model::zeros(&layout, 0);
        let (shared, biased) = latent_max(&[a, b], &model).unwrap();
        assert!(std::ptr::eq(shared.example, a));
        assert!(std::ptr::eq(biased.example, a));

        let mut model = model;
        model.w_block_mut(0)[0] = 1.0;
        let (shared, _) = latent_max(&[a, b], &model).unwrap();
        assert!(std::ptr::eq(shared.example, b));
        assert_eq!(shared.score, 2.0);
    }

    #[test]
    fn satisfied_negative_groups_sit_out_their_cooling_visits() {
        let layout = layout(1);
        let store = store(&[(1, 1, &[1.0]), (-1, 1, &[-1.0])], &layout, 0);
        let sorted = store.sorted_unique();
        let groups = collapse(&sorted);

        let counts = DatasetCounts::new(vec![]);
        let mut model = Model::zeros(&layout, 0);
        model.w_block_mut(0)[0] = 100.0;
        let bounds = LowerBounds::new(vec![f64::NEG_INFINITY]);

        // Both margins hold on every visit. The positive group is processed every pass,
        // the negative one is cached after INCACHE + 1 visits and then skipped while it
        // cools, so passes outnumber what the step budget alone would need.
        let mut trainer = Trainer::from_config(config(0.0, 12), &layout, &counts);
        let stats = trainer.train(&groups, &mut model, &bounds).unwrap();

        assert_eq!(stats, TrainStats { steps: 12, passes: 8 });
    }

    #[test]
    fn bias_decay_is_scaled_by_lambda() {
        let layout = layout(1);
        let store = store(&[(1, 1, &[0.0])], &layout, 1);
        let sorted = store.sorted_unique();
        let groups = collapse(&sorted);

        let counts = DatasetCounts::new(vec![1]);
        let mut model = Model::zeros(&layout, 1);
        model.w_block_mut(0)[0] = 1.0;
        model.bias_blocks_mut(0).for_each(|b| b[0] = 1.0);
        let bounds = LowerBounds::new(vec![f64::NEG_INFINITY]);

        let config = TrainConfig {
            lambda: 3.0,
            ..config(0.0, 1)
        };
        let mut trainer = Trainer::from_config(config, &layout, &counts);
        trainer.train(&groups, &mut model, &bounds).unwrap();

        let mult = 1.0 / RATE_OFFSET;
        assert!((model.w()[0] - (1.0 - mult)).abs() < 1e-12);
        assert!((model.bias(0)[0] - (1.0 - 3.0 * mult)).abs() < 1e-12);
    }

    #[test]
    fn shared_and_biased_updates_follow_their_own_placement() {
        use crate::data::example::tests::{header, record};

        let header = header(2, &[2], 1);
        let bytes = [
            record(1, 9, 1, &[(0, &[1.0, 0.0])]),
            record(1, 9, 1, &[(0, &[0.0, 1.0])]),
        ]
        .concat();
        let store = ExampleStore::load(&mut Cursor::new(bytes), &header).unwrap();
        let sorted = store.sorted_unique();
        let groups = collapse(&sorted);
        assert_eq!(groups.len(), 1);

        let counts = DatasetCounts::new(vec![4]);
        let mut model = Model::zeros(&header.layout, 1);
        model.w_block_mut(0).copy_from_slice(&[0.5, 0.0]);
        model.bias_blocks_mut(0).for_each(|b| b.copy_from_slice(&[0.0, 0.8]));
        let bounds = LowerBounds::new(vec![f64::NEG_INFINITY; 2]);

        // Shared scores are 0.5 and 0.0, biased scores 0.5 and 0.8: the shared step moves
        // along [1, 0] and the biased step along [0, 1], both margins violated.
        let config = TrainConfig {
            lambda: 2.0,
            ..config(1.0, 1)
        };
        let mut trainer = Trainer::from_config(config, &header.layout, &counts);
        let stats = trainer.train(&groups, &mut model, &bounds).unwrap();
        assert_eq!(stats.steps, 1);

        let rate = 1.0 / RATE_OFFSET;
        let coupled = rate / 4.0;
        let expected_w = [0.5 * (1.0 - rate) + rate, coupled];
        let expected_bias = [0.0, 0.8 - 2.0 * (rate * 0.8) + coupled];

        for (got, want) in model.w().iter().zip(expected_w) {
            assert!((got - want).abs() < 1e-12, "w: {got} != {want}");
        }
        for (got, want) in model.bias(0).iter().zip(expected_bias) {
            assert!((got - want).abs() < 1e-12, "bias: {got} != {want}");
        }
    }
}
