use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use log::info;

use crate::{
    LsvmErr, Result,
    data::{ExampleStore, collapse},
    layout::{DatasetCounts, Header},
    model::{LowerBounds, Model},
    scoring,
    training::{TrainConfig, TrainStats, Trainer},
};

/// The files of a training run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub header: PathBuf,
    pub data: PathBuf,
    /// Read as the initial model and overwritten with the trained one.
    pub model: PathBuf,
    pub info: PathBuf,
    pub lower_bounds: PathBuf,
    pub counts: PathBuf,
}

/// What a run processed and produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub examples: usize,
    pub unique: usize,
    pub groups: usize,
    pub stats: TrainStats,
}

/// Runs a full training job: load, train, save the model and write the report.
///
/// # Arguments
/// * `paths` - The run's files.
/// * `config` - The optimizer configuration.
///
/// # Returns
/// A summary of the run, or the first error met in any phase.
pub fn run(paths: &RunPaths, config: &TrainConfig) -> Result<RunSummary> {
    config.validate()?;

    info!("reading header");
    let header = Header::read(&mut open("header", &paths.header)?)?;
    let counts = DatasetCounts::read(&mut open("count", &paths.counts)?, header.num_datasets)?;

    info!("reading examples");
    let store = ExampleStore::load(&mut open("data", &paths.data)?, &header)?;

    let sorted = store.sorted_unique();
    let groups = collapse(&sorted);
    info!(groups = groups.len(); "collapsed examples");

    info!("reading initial model");
    let mut model = Model::read(
        &mut open("model", &paths.model)?,
        &header.layout,
        header.num_datasets,
    )?;
    let bounds = LowerBounds::read(&mut open("lower bound", &paths.lower_bounds)?, &header.layout)?;

    let mut trainer = Trainer::from_config(config.clone(), &header.layout, &counts);
    let stats = trainer.train(&groups, &mut model, &bounds)?;

    info!("saving model");
    save("model", &paths.model, |w| model.write(w))?;

    info!("scoring examples");
    let shared = scoring::score(store.examples(), &model);
    let biased = scoring::score_biased(store.examples(), &model);
    save("info", &paths.info, |w| scoring::write_info(w, store.examples(), &shared, &biased))?;

    let summary = RunSummary {
        examples: store.len(),
        unique: sorted.len(),
        groups: groups.len(),
        stats,
    };
    info!(
        examples = summary.examples,
        unique = summary.unique,
        groups = summary.groups,
        steps = stats.steps;
        "run finished"
    );

    Ok(summary)
}

fn open(role: &'static str, path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| LsvmErr::file(role, path, e))
}

/// Creates (or truncates) `path` and hands a buffered writer to `write`.
fn save<F>(role: &'static str, path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let file = File::create(path).map_err(|e| LsvmErr::file(role, path, e))?;
    let mut writer = BufWriter::new(file);
    write(&mut writer).map_err(|e| match e {
        LsvmErr::Io(source) => LsvmErr::file(role, path, source),
        other => other,
    })?;
    writer.flush().map_err(|e| LsvmErr::file(role, path, e))
}
