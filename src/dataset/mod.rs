//! Labeled audio datasets, the train/validation split and batch loading.
//!
//! Several metadata tables (each paired with the directory holding its
//! `{hash_id}.wav` files) are concatenated in order into one dataset. The
//! split is drawn once from a seeded shuffle; training batches are reshuffled
//! every epoch while evaluation keeps dataset order.

pub mod metadata;

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::batch::{Batch, BatchCollator, BatchError};
use crate::features::FeatureExtractor;
use crate::labels::{LabelEncoding, LabelError};
use metadata::{MetadataError, SampleRecord};

/// A metadata table and the directory its audio files live in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSource {
    pub metadata: PathBuf,
    pub audio_dir: PathBuf,
}

impl DataSource {
    pub fn new(metadata: impl Into<PathBuf>, audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            metadata: metadata.into(),
            audio_dir: audio_dir.into(),
        }
    }

    pub fn audio_path(&self, record: &SampleRecord) -> PathBuf {
        audio_path(&self.audio_dir, &record.id)
    }
}

/// Location of the waveform for `id` inside `audio_dir`.
pub fn audio_path(audio_dir: &Path, id: &str) -> PathBuf {
    audio_dir.join(format!("{id}.wav"))
}

/// A metadata row resolved to its audio file, label still raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledClip {
    pub path: PathBuf,
    pub raw_label: String,
}

/// Read every source in order and resolve audio paths.
pub fn load_clips(sources: &[DataSource]) -> Result<Vec<LabeledClip>, MetadataError> {
    let mut clips = Vec::new();
    for source in sources {
        let records = metadata::load_records(&source.metadata)?;
        info!(
            "Loaded {} metadata rows from {}",
            records.len(),
            source.metadata.display()
        );
        clips.extend(records.into_iter().map(|record| LabeledClip {
            path: source.audio_path(&record),
            raw_label: record.raw_label,
        }));
    }
    Ok(clips)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetItem {
    pub path: PathBuf,
    pub label: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioDataset {
    items: Vec<DatasetItem>,
}

impl AudioDataset {
    /// Encode every clip label; an unknown label fails the whole dataset.
    pub fn encode(clips: &[LabeledClip], labels: &LabelEncoding) -> Result<Self, LabelError> {
        let items = clips
            .iter()
            .map(|clip| {
                Ok(DatasetItem {
                    path: clip.path.clone(),
                    label: labels.encode(&clip.raw_label)?,
                })
            })
            .collect::<Result<Vec<_>, LabelError>>()?;
        Ok(Self { items })
    }

    pub fn from_items(items: Vec<DatasetItem>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[DatasetItem] {
        &self.items
    }

    /// Random `(train, validation)` split, reproducible for a given seed.
    pub fn split(&self, train_fraction: f32, seed: u64) -> (AudioDataset, AudioDataset) {
        let (train_len, _) = split_sizes(self.len(), train_fraction);
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));
        let pick = |ids: &[usize]| AudioDataset {
            items: ids.iter().map(|&idx| self.items[idx].clone()).collect(),
        };
        (pick(&indices[..train_len]), pick(&indices[train_len..]))
    }
}

/// `(train, validation)` sizes: `floor(len * train_fraction)` and the rest.
pub fn split_sizes(len: usize, train_fraction: f32) -> (usize, usize) {
    let fraction = f64::from(train_fraction.clamp(0.0, 1.0));
    let train = ((len as f64 * fraction).floor() as usize).min(len);
    (train, len - train)
}

/// Visit order for one epoch: shuffled when `rng` is given, sequential otherwise.
pub fn epoch_order<R: Rng>(len: usize, rng: Option<&mut R>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    if let Some(rng) = rng {
        order.shuffle(rng);
    }
    order
}

/// Extracts and collates batches on a dedicated worker pool.
pub struct BatchLoader<'a> {
    extractor: &'a FeatureExtractor,
    collator: BatchCollator,
    batch_size: usize,
    pool: rayon::ThreadPool,
}

impl<'a> BatchLoader<'a> {
    pub fn new(
        extractor: &'a FeatureExtractor,
        batch_size: usize,
        num_workers: usize,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers.max(1))
            .thread_name(|i| format!("voxmood-features-{i}"))
            .build()?;
        let config = extractor.config();
        Ok(Self {
            extractor,
            collator: BatchCollator::new(config.mel_bins, config.frames),
            batch_size: batch_size.max(1),
            pool,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_batches(&self, len: usize) -> usize {
        len.div_ceil(self.batch_size)
    }

    /// Batches of `dataset` in `order`, loaded lazily one at a time.
    pub fn batches<'d>(
        &'d self,
        dataset: &'d AudioDataset,
        order: Vec<usize>,
    ) -> impl Iterator<Item = Result<Batch, BatchError>> + 'd {
        let batch_size = self.batch_size;
        (0..order.len().div_ceil(batch_size)).map(move |batch_idx| {
            let start = batch_idx * batch_size;
            let end = (start + batch_size).min(order.len());
            self.load_batch(dataset, &order[start..end])
        })
    }

    /// Extract the given items in parallel and collate them in the given order.
    pub fn load_batch(&self, dataset: &AudioDataset, indices: &[usize]) -> Result<Batch, BatchError> {
        let items = dataset.items();
        let samples: Vec<_> = self.pool.install(|| {
            indices
                .par_iter()
                .map(|&idx| {
                    let item = &items[idx];
                    (self.extractor.extract(&item.path), item.label)
                })
                .collect()
        });
        debug!("Loaded batch of {} samples", samples.len());
        self.collator.collate(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureConfig;

    fn dataset(len: usize) -> AudioDataset {
        AudioDataset::from_items(
            (0..len)
                .map(|i| DatasetItem {
                    path: PathBuf::from(format!("/missing/{i}.wav")),
                    label: i % 3,
                })
                .collect(),
        )
    }

    #[test]
    fn split_of_hundred_is_eighty_twenty() {
        let (train, val) = dataset(100).split(0.8, 42);
        assert_eq!((train.len(), val.len()), (80, 20));
    }

    #[test]
    fn split_sizes_always_cover_dataset() {
        for len in [0usize, 1, 7, 10, 33, 101] {
            let (train, val) = split_sizes(len, 0.8);
            assert_eq!(train + val, len);
        }
        assert_eq!(split_sizes(10, 0.8), (8, 2));
    }

    #[test]
    fn split_is_reproducible_and_disjoint() {
        let data = dataset(50);
        let (a_train, a_val) = data.split(0.8, 7);
        let (b_train, _) = data.split(0.8, 7);
        assert_eq!(a_train, b_train);
        for item in a_val.items() {
            assert!(!a_train.items().contains(item));
        }
    }

    #[test]
    fn encode_rejects_unknown_labels() {
        let labels = LabelEncoding::fit(["angry", "happy"]).unwrap();
        let clips = vec![
            LabeledClip {
                path: PathBuf::from("a.wav"),
                raw_label: "happy".into(),
            },
            LabeledClip {
                path: PathBuf::from("b.wav"),
                raw_label: "bored".into(),
            },
        ];
        assert!(matches!(
            AudioDataset::encode(&clips, &labels),
            Err(LabelError::UnknownLabel(label)) if label == "bored"
        ));
    }

    #[test]
    fn sources_resolve_hash_id_wav_paths() {
        let source = DataSource::new("meta.jsonl", "/data/audio");
        let record = SampleRecord {
            id: "abc123".into(),
            raw_label: "sad".into(),
        };
        assert_eq!(source.audio_path(&record), PathBuf::from("/data/audio/abc123.wav"));
    }

    #[test]
    fn sequential_order_is_identity() {
        assert_eq!(epoch_order::<StdRng>(4, None), vec![0, 1, 2, 3]);
        let mut rng = StdRng::seed_from_u64(1);
        let mut shuffled = epoch_order(20, Some(&mut rng));
        shuffled.sort_unstable();
        assert_eq!(shuffled, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn loader_keeps_order_and_fills_placeholders() {
        let extractor = FeatureExtractor::new(&FeatureConfig::default());
        let loader = BatchLoader::new(&extractor, 4, 3).unwrap();
        let data = dataset(10);
        let order: Vec<usize> = (0..10).rev().collect();
        let batches: Vec<Batch> = loader
            .batches(&data, order)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(batches.len(), loader.num_batches(10));
        assert_eq!(batches.iter().map(Batch::len).collect::<Vec<_>>(), vec![4, 4, 2]);
        assert_eq!(batches[0].labels(), &[0, 2, 1, 0]);
        assert_eq!(batches[0].shape(), [4, 1, 64, 300]);
        assert_eq!(extractor.stats().failed, 10);
        for batch in &batches {
            assert!(batch.features().iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn placeholder_rows_are_zero_next_to_decoded_rows() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&good, spec).unwrap();
        for i in 0..16_000 {
            let t = i as f32 / 16_000.0;
            writer
                .write_sample(((t * 440.0 * std::f32::consts::TAU).sin() * 8_000.0) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();

        let data = AudioDataset::from_items(vec![
            DatasetItem {
                path: dir.path().join("missing.wav"),
                label: 0,
            },
            DatasetItem {
                path: good,
                label: 1,
            },
        ]);
        let extractor = FeatureExtractor::new(&FeatureConfig::default());
        let loader = BatchLoader::new(&extractor, 2, 2).unwrap();
        let batch = loader.load_batch(&data, &[0, 1]).unwrap();
        assert!(batch.sample(0).iter().all(|&v| v == 0.0));
        assert!(batch.sample(1).iter().any(|&v| v != 0.0));
        assert_eq!(extractor.stats().failed, 1);
        assert_eq!(extractor.stats().succeeded, 1);
    }
}
