use std::{cmp::Ordering, io::Read, mem, ops::Range};

use crate::{
    LsvmErr, Result, codec,
    layout::{BlockLayout, DATASET_FIELD, Header},
};

/// One non-zero block of an example: which block it is and where its values live in
/// the example's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSpan {
    pub block: usize,
    pub values: Range<usize>,
}

/// A single feature record, parsed once at load time.
///
/// The payload is kept as read (block markers interleaved with block values) so that
/// byte-level ordering and duplicate detection see exactly what was in the file; the
/// spans index into it.
#[derive(Debug, Clone)]
pub struct Example {
    label: Box<[i32]>,
    payload: Box<[f32]>,
    spans: Box<[BlockSpan]>,
    dataset: Option<usize>,
    unique: bool,
}

impl Example {
    /// Reads the next record of the example stream.
    ///
    /// A record is `label_size` label integers, the number of non-zero blocks, the number
    /// of payload words, and then the payload: for each block a 1-based block marker
    /// stored as a float followed by that block's values.
    ///
    /// # Arguments
    /// * `reader` - The example byte stream.
    /// * `header` - The run's header.
    /// * `index` - The record's position in the stream, used for error reporting.
    ///
    /// # Returns
    /// The parsed example or an error if the record is truncated or malformed.
    pub fn read<R: Read + ?Sized>(reader: &mut R, header: &Header, index: usize) -> Result<Self> {
        let label_size = header.label_size;
        if label_size <= DATASET_FIELD {
            return Err(LsvmErr::InvalidHeader {
                field: "labelSize",
                value: label_size as i64,
            });
        }

        let mut fields = codec::read_i32s(reader, label_size + 2, "example label")?;
        let words = fields[label_size + 1];
        let nblocks = fields[label_size];

        let words = usize::try_from(words)
            .map_err(|_| LsvmErr::record(index, format!("negative payload length {words}")))?;
        let nblocks = usize::try_from(nblocks)
            .map_err(|_| LsvmErr::record(index, format!("negative block count {nblocks}")))?;

        let payload = codec::read_f32s(reader, words, "example payload")?;
        let spans = parse_spans(&payload, nblocks, &header.layout)
            .map_err(|reason| LsvmErr::record(index, reason))?;

        fields.truncate(label_size);

        match fields[0] {
            1 | -1 => {}
            other => return Err(LsvmErr::record(index, format!("class label {other} is not ±1"))),
        }

        let dataset = match header.num_datasets {
            0 => None,
            n => {
                let id = fields[DATASET_FIELD];
                if id < 1 || id as usize > n {
                    let reason = format!("dataset id {id} outside 1..={n}");
                    return Err(LsvmErr::record(index, reason));
                }
                Some(id as usize - 1)
            }
        };

        Ok(Self {
            label: fields.into_boxed_slice(),
            payload: payload.into_boxed_slice(),
            spans: spans.into_boxed_slice(),
            dataset,
            unique: false,
        })
    }

    /// Returns the class label, `1` or `-1`.
    pub fn label(&self) -> i32 {
        self.label[0]
    }

    /// Returns the extended label as stored in the file.
    pub fn extended_label(&self) -> &[i32] {
        &self.label
    }

    /// Returns the 0-based dataset this example belongs to, or `None` when the run has no
    /// datasets.
    pub fn dataset(&self) -> Option<usize> {
        self.dataset
    }

    /// Returns the dataset field converted to 0-based, exactly as reported in the info file.
    pub fn dataset_field(&self) -> i32 {
        self.label[DATASET_FIELD].wrapping_sub(1)
    }

    /// Returns whether this example is the representative of its duplicates.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub(crate) fn set_unique(&mut self, unique: bool) {
        self.unique = unique;
    }

    /// Returns an iterator over the non-zero blocks as `(block index, values)` pairs.
    pub fn blocks(&self) -> impl Iterator<Item = (usize, &[f32])> + '_ {
        self.spans
            .iter()
            .map(|span| (span.block, &self.payload[span.values.clone()]))
    }

    /// Returns the record's byte length, excluding the unique flag.
    pub fn byte_len(&self) -> usize {
        (self.label.len() + 2 + self.payload.len()) * mem::size_of::<i32>()
    }

    fn label_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.label)
    }

    fn payload_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.payload)
    }

    /// Returns whether both examples share a byte-identical extended label.
    pub fn same_label(&self, other: &Self) -> bool {
        self.label_bytes() == other.label_bytes()
    }

    /// Canonical order: label bytes, then record length, then the whole record's bytes.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.label_bytes()
            .cmp(other.label_bytes())
            .then_with(|| self.byte_len().cmp(&other.byte_len()))
            .then_with(|| {
                let a = self.spans.len() as i32;
                let b = other.spans.len() as i32;
                a.to_ne_bytes().cmp(&b.to_ne_bytes())
            })
            .then_with(|| self.payload_bytes().cmp(other.payload_bytes()))
    }

    /// Returns whether both records have identical byte images.
    pub fn is_duplicate_of(&self, other: &Self) -> bool {
        self.canonical_cmp(other) == Ordering::Equal
    }
}

fn parse_spans(
    payload: &[f32],
    nblocks: usize,
    layout: &BlockLayout,
) -> std::result::Result<Vec<BlockSpan>, String> {
    // Each block takes at least its marker word, so the payload caps the capacity.
    let mut spans = Vec::with_capacity(nblocks.min(payload.len()));
    let mut cursor = 0;

    for _ in 0..nblocks {
        let Some(&marker) = payload.get(cursor) else {
            return Err(format!("payload ends before block {} of {nblocks}", spans.len()));
        };

        // Markers are 1-based indices stored as floats.
        let idx = marker as i64 - 1;
        let Some(block) = usize::try_from(idx).ok().and_then(|b| layout.get(b).map(|_| b))
        else {
            return Err(format!("block marker {marker} outside 1..={}", layout.len()));
        };

        let start = cursor + 1;
        let end = start + layout.blocks()[block].size;
        if end > payload.len() {
            return Err(format!(
                "block {block} needs {} values but the payload ends at word {}",
                end - start,
                payload.len()
            ));
        }

        spans.push(BlockSpan {
            block,
            values: start..end,
        });
        cursor = end;
    }

    if cursor != payload.len() {
        return Err(format!(
            "payload has {} words but its blocks only account for {cursor}",
            payload.len()
        ));
    }

    Ok(spans)
}
