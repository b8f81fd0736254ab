//! Fixed-size image encode pool.
//!
//! Workers pull jobs from a bounded queue, encode to JPEG into a buffer they
//! own, and write the result into the scratch directory. Results come back on
//! a separate channel tagged with their slot, so callers see them in job order
//! no matter which worker finished first.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use tracing::trace;

use crate::error::{Error, Result};
use crate::model::ImageKey;

#[derive(Debug, Clone, Copy)]
pub(crate) struct EncodeSettings {
    pub quality: u8,
    /// Wider images are downscaled; zero disables the limit.
    pub max_width: u32,
}

/// An image waiting to be encoded to `path`.
pub(crate) struct EncodeJob {
    pub key: ImageKey,
    pub image: DynamicImage,
    pub path: PathBuf,
}

/// An image that has been written to the scratch directory.
#[derive(Debug, Clone)]
pub(crate) struct EncodedImage {
    pub key: ImageKey,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub downscaled: bool,
}

type Outcome = (usize, Result<EncodedImage>);

/// Handle for submitting batches to the running workers.
pub(crate) struct EncodePool {
    jobs: Sender<(usize, EncodeJob)>,
    results: Receiver<Outcome>,
}

/// Run `f` with a pool of `workers` encode threads.
///
/// The workers are joined before this returns.
pub(crate) fn with_pool<T, F>(workers: usize, settings: EncodeSettings, f: F) -> Result<T>
where
    F: FnOnce(&EncodePool) -> Result<T>,
{
    let workers = workers.max(1);
    let (job_tx, job_rx) = bounded::<(usize, EncodeJob)>(workers * 2);
    let (result_tx, result_rx) = unbounded::<Outcome>();

    thread::scope(|scope| {
        for _ in 0..workers {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            scope.spawn(move || worker_loop(settings, jobs, results));
        }
        drop(job_rx);
        drop(result_tx);

        let pool = EncodePool {
            jobs: job_tx,
            results: result_rx,
        };
        let out = f(&pool);
        // Closing the queue lets the workers exit so the scope can join them.
        drop(pool);
        out
    })
}

impl EncodePool {
    /// Encode a batch and wait for all of it.
    ///
    /// Results are returned in job order. Every result is drained even after a
    /// failure; the error of the earliest failing job is returned.
    pub fn encode_all(&self, jobs: Vec<EncodeJob>) -> Result<Vec<EncodedImage>> {
        let count = jobs.len();
        for (slot, job) in jobs.into_iter().enumerate() {
            self.jobs
                .send((slot, job))
                .map_err(|_| Error::WorkerPool("job queue closed".to_string()))?;
        }

        let mut slots: Vec<Option<EncodedImage>> = (0..count).map(|_| None).collect();
        let mut failure: Option<(usize, Error)> = None;
        for _ in 0..count {
            let (slot, outcome) = self
                .results
                .recv()
                .map_err(|_| Error::WorkerPool("result channel closed".to_string()))?;
            match outcome {
                Ok(encoded) => slots[slot] = Some(encoded),
                Err(e) => {
                    if failure.as_ref().is_none_or(|(first, _)| slot < *first) {
                        failure = Some((slot, e));
                    }
                }
            }
        }

        if let Some((_, e)) = failure {
            return Err(e);
        }
        slots
            .into_iter()
            .map(|s| s.ok_or_else(|| Error::WorkerPool("missing encode result".to_string())))
            .collect()
    }
}

fn worker_loop(
    settings: EncodeSettings,
    jobs: Receiver<(usize, EncodeJob)>,
    results: Sender<Outcome>,
) {
    let mut buffer = Vec::new();
    for (slot, job) in jobs.iter() {
        let key = job.key.clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            encode_to_file(job, settings, &mut buffer)
        }))
        .unwrap_or_else(|_| Err(Error::WorkerPool(format!("encoder panicked on {key}"))));
        if results.send((slot, outcome)).is_err() {
            break;
        }
    }
}

fn encode_to_file(
    job: EncodeJob,
    settings: EncodeSettings,
    buffer: &mut Vec<u8>,
) -> Result<EncodedImage> {
    let (image, downscaled) = fit_width(job.image, settings.max_width);
    let (width, height) = (image.width(), image.height());

    buffer.clear();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut *buffer, settings.quality);
        let encoded = if image.color().has_color() {
            encoder.encode_image(&image.to_rgb8())
        } else {
            encoder.encode_image(&image.to_luma8())
        };
        encoded.map_err(|source| Error::Encode {
            image: job.key.clone(),
            source,
        })?;
    }
    fs::write(&job.path, &buffer)?;
    trace!(image = %job.key, width, height, bytes = buffer.len(), "encoded image");

    Ok(EncodedImage {
        key: job.key,
        path: job.path,
        width,
        height,
        downscaled,
    })
}

/// Downscale to `max_width` keeping the aspect ratio. Returns whether the
/// image was resized.
pub(crate) fn fit_width(image: DynamicImage, max_width: u32) -> (DynamicImage, bool) {
    if max_width == 0 || image.width() <= max_width {
        return (image, false);
    }
    let height = (u64::from(image.height()) * u64::from(max_width) / u64::from(image.width()))
        .max(1) as u32;
    (
        image.resize_exact(max_width, height, FilterType::Lanczos3),
        true,
    )
}
