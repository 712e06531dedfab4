use std::io::Write;

use crate::{LsvmErr, Result, data::Example, model::Model};

/// Scores every example against the shared weights only.
pub fn score(examples: &[Example], model: &Model) -> Vec<f64> {
    examples.iter().map(|ex| model.dot(ex.blocks())).collect()
}

/// Scores every example against the shared weights plus its dataset's bias.
///
/// Examples of runs without datasets get their shared score.
pub fn score_biased(examples: &[Example], model: &Model) -> Vec<f64> {
    examples
        .iter()
        .map(|ex| match ex.dataset() {
            Some(dataset) => model.dot_biased(dataset, ex.blocks()),
            None => model.dot(ex.blocks()),
        })
        .collect()
}

/// Writes one report line per example:
/// `label\tshared\tunique\tdataset\tbiased`, scores with six decimals and the dataset
/// 0-based.
///
/// # Arguments
/// * `writer` - The report sink.
/// * `examples` - The examples in file order.
/// * `shared` - The shared score of each example.
/// * `biased` - The biased score of each example.
pub fn write_info<W: Write + ?Sized>(
    writer: &mut W,
    examples: &[Example],
    shared: &[f64],
    biased: &[f64],
) -> Result<()> {
    for (what, got) in [("shared scores", shared.len()), ("biased scores", biased.len())] {
        if got != examples.len() {
            return Err(LsvmErr::SizeMismatch {
                what,
                got,
                expected: examples.len(),
            });
        }
    }

    for ((ex, s), b) in examples.iter().zip(shared).zip(biased) {
        writeln!(
            writer,
            "{}\t{s:.6}\t{}\t{}\t{b:.6}",
            ex.label(),
            u8::from(ex.is_unique()),
            ex.dataset_field(),
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::data::{
        ExampleStore,
        example::tests::{header, record},
    };

    fn store(num_datasets: usize) -> ExampleStore {
        let records = [
            record(1, 1, 1, &[(0, &[1.0, 2.0])]),
            record(-1, 2, 2, &[(0, &[0.5, 0.0]), (1, &[4.0])]),
            record(1, 1, 1, &[(0, &[1.0, 2.0])]),
        ];
        let header = header(records.len(), &[2, 1], num_datasets);
        ExampleStore::load(&mut Cursor::new(records.concat()), &header).unwrap()
    }

    fn model() -> Model {
        let header = header(1, &[2, 1], 2);
        let mut model = Model::zeros(&header.layout, 2);
        model.w_block_mut(0).copy_from_slice(&[1.0, -1.0]);
        model.w_block_mut(1).copy_from_slice(&[0.25]);
        let (_, bias) = model.blocks_mut(1, 1);
        bias[0] = 1.0;
        let (_, bias) = model.blocks_mut(0, 0);
        bias.copy_from_slice(&[2.0, 0.0]);
        model
    }

    #[test]
    fn biased_scores_add_the_examples_dataset() {
        let store = store(2);
        let model = model();

        assert_eq!(score(store.examples(), &model), vec![-1.0, 1.5, -1.0]);
        assert_eq!(score_biased(store.examples(), &model), vec![1.0, 5.5, 1.0]);
    }

    #[test]
    fn info_lines_follow_the_report_format() {
        let store = store(2);
        let model = model();
        let shared = score(store.examples(), &model);
        let biased = score_biased(store.examples(), &model);

        let mut out = Vec::new();
        write_info(&mut out, store.examples(), &shared, &biased).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "1\t-1.000000\t1\t0\t1.000000\n\
             -1\t1.500000\t1\t1\t5.500000\n\
             1\t-1.000000\t0\t0\t1.000000\n"
        );
    }

    #[test]
    fn runs_without_datasets_score_the_shared_weights_twice() {
        let store = store(0);
        let header = header(1, &[2, 1], 0);
        let mut model = Model::zeros(&header.layout, 0);
        model.w_block_mut(1)[0] = 2.0;

        assert_eq!(score(store.examples(), &model), score_biased(store.examples(), &model));
    }

    #[test]
    fn mismatched_scores_are_rejected() {
        let store = store(2);
        let mut out = Vec::new();
        assert!(matches!(
            write_info(&mut out, store.examples(), &[0.0], &[0.0, 0.0, 0.0]),
            Err(LsvmErr::SizeMismatch { what: "shared scores", .. })
        ));
    }
}
