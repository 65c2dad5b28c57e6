//! Background image decoder.
//!
//! Requests go over a crossbeam channel to a coordinator thread that
//! decodes batches on the rayon pool. Results come back over a bounded
//! channel the UI drains once per frame. The core never sees a failure:
//! a broken image is logged and simply never produces a result.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use hashbrown::HashSet;
use image::imageops::FilterType;
use parking_lot::Mutex;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};

use crate::geometry::Size;
use crate::media::Source;

/// Decoded images held in the channel awaiting upload.
const MAX_PENDING_RESULTS: usize = 32;
const MAX_BATCH: usize = 16;

/// How closely the decoded pixels must match the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    /// Downscaled to the requested target; good enough at fit scale.
    Inexact,
    /// Original pixels, for zooming in.
    Exact,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodeRequest {
    pub identity: String,
    /// Bounding box for `Inexact` decodes.
    pub target: Option<Size>,
    pub precision: Precision,
}

/// RGBA pixels ready for upload.
#[derive(Clone)]
pub struct DecodedImage {
    pub identity: String,
    pub precision: Precision,
    /// Size of the original image, independent of any downscaling.
    pub intrinsic: Size,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("identity", &self.identity)
            .field("precision", &self.precision)
            .field("intrinsic", &self.intrinsic)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed identity {0:?}")]
    BadIdentity(String),
    #[error("unsupported file type: {}", .0.display())]
    Unsupported(PathBuf),
    #[error("could not read image header of {}: {source}", path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: imagesize::ImageError,
    },
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

type Key = (String, Precision);

pub struct DecodeWorker {
    request_tx: Sender<DecodeRequest>,
    result_rx: Receiver<DecodedImage>,
    in_flight: Arc<Mutex<HashSet<Key>>>,
    shutdown: Arc<AtomicBool>,
}

impl DecodeWorker {
    /// Spawn the coordinator. `max_side` caps every decoded dimension, the
    /// largest texture the renderer accepts.
    pub fn new(max_side: u32) -> std::io::Result<Self> {
        let (request_tx, request_rx) = crossbeam_channel::bounded::<DecodeRequest>(256);
        let (result_tx, result_rx) = crossbeam_channel::bounded::<DecodedImage>(MAX_PENDING_RESULTS);
        let in_flight = Arc::new(Mutex::new(HashSet::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let in_flight_clone = Arc::clone(&in_flight);
        let shutdown_clone = Arc::clone(&shutdown);
        std::thread::Builder::new()
            .name("decode-coordinator".into())
            .spawn(move || coordinator_loop(request_rx, result_tx, in_flight_clone, shutdown_clone, max_side))?;

        Ok(Self {
            request_tx,
            result_rx,
            in_flight,
            shutdown,
        })
    }

    /// Queue a decode. Returns `false` when the same identity and precision
    /// is already in flight or the queue is full.
    pub fn request(&self, request: DecodeRequest) -> bool {
        let key = (request.identity.clone(), request.precision);
        if !self.in_flight.lock().insert(key.clone()) {
            return false;
        }
        match self.request_tx.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(req)) | Err(TrySendError::Disconnected(req)) => {
                debug!(identity = %req.identity, "decode queue unavailable; dropping request");
                self.in_flight.lock().remove(&key);
                false
            }
        }
    }

    pub fn is_in_flight(&self, identity: &str, precision: Precision) -> bool {
        self.in_flight.lock().contains(&(identity.to_owned(), precision))
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Drain up to `max` finished decodes.
    pub fn poll(&self, max: usize) -> Vec<DecodedImage> {
        self.result_rx.try_iter().take(max).collect()
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

fn coordinator_loop(
    request_rx: Receiver<DecodeRequest>,
    result_tx: Sender<DecodedImage>,
    in_flight: Arc<Mutex<HashSet<Key>>>,
    shutdown: Arc<AtomicBool>,
    max_side: u32,
) {
    let mut batch: Vec<DecodeRequest> = Vec::with_capacity(MAX_BATCH);

    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        batch.clear();
        match request_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(req) => batch.push(req),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
        while batch.len() < MAX_BATCH {
            match request_rx.try_recv() {
                Ok(req) => batch.push(req),
                Err(_) => break,
            }
        }

        // Low-res first: they gate what is visible at all.
        batch.sort_by_key(|r| r.precision == Precision::Exact);

        let results: Vec<(Key, Option<DecodedImage>)> = batch
            .par_iter()
            .map(|req| {
                let key = (req.identity.clone(), req.precision);
                if shutdown.load(Ordering::Relaxed) {
                    return (key, None);
                }
                match decode(req, max_side) {
                    Ok(img) => (key, Some(img)),
                    Err(e) => {
                        warn!(identity = %req.identity, "decode failed: {e}");
                        (key, None)
                    }
                }
            })
            .collect();

        for (key, decoded) in results {
            in_flight.lock().remove(&key);
            let Some(decoded) = decoded else {
                continue;
            };
            match result_tx.try_send(decoded) {
                Ok(()) => {}
                // Dropped; the UI re-requests once it notices the gap.
                Err(TrySendError::Full(_)) => debug!(identity = %key.0, "result channel full"),
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// Decode one request on the calling thread.
pub fn decode(request: &DecodeRequest, max_side: u32) -> Result<DecodedImage, DecodeError> {
    let source =
        Source::from_identity(&request.identity).ok_or_else(|| DecodeError::BadIdentity(request.identity.clone()))?;

    let bound = match (request.precision, request.target) {
        (Precision::Inexact, Some(target)) if !target.is_empty() => {
            let w = (target.width as u32).min(max_side.max(1));
            let h = (target.height as u32).min(max_side.max(1));
            (w, h)
        }
        _ => (max_side.max(1), max_side.max(1)),
    };

    let (intrinsic, rgba) = match source {
        Source::Synthetic { size, rgb } => {
            let (w, h) = fit_within(size.width as u32, size.height as u32, bound);
            (size, render_gradient(w, h, rgb))
        }
        Source::File(path) => {
            let intrinsic = probe(&path)?;
            let img = image::open(&path)?;
            let img = if img.width() > bound.0 || img.height() > bound.1 {
                img.resize(bound.0, bound.1, FilterType::Triangle)
            } else {
                img
            };
            (intrinsic, img.into_rgba8())
        }
    };

    Ok(DecodedImage {
        identity: request.identity.clone(),
        precision: request.precision,
        intrinsic,
        width: rgba.width(),
        height: rgba.height(),
        pixels: rgba.into_raw(),
    })
}

/// Header-only size probe.
pub fn probe(path: &Path) -> Result<Size, DecodeError> {
    if !crate::media::is_supported_image(path) {
        return Err(DecodeError::Unsupported(path.to_path_buf()));
    }
    let dims = imagesize::size(path).map_err(|source| DecodeError::Probe {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Size::new(dims.width as i32, dims.height as i32))
}

fn fit_within(width: u32, height: u32, bound: (u32, u32)) -> (u32, u32) {
    if width <= bound.0 && height <= bound.1 {
        return (width.max(1), height.max(1));
    }
    let scale = (bound.0 as f64 / width as f64).min(bound.1 as f64 / height as f64);
    let w = ((width as f64) * scale).round().max(1.0) as u32;
    let h = ((height as f64) * scale).round().max(1.0) as u32;
    (w, h)
}

fn render_gradient(width: u32, height: u32, rgb: [u8; 3]) -> image::RgbaImage {
    image::RgbaImage::from_fn(width, height, |x, y| {
        let fx = x as f32 / width.max(1) as f32;
        let fy = y as f32 / height.max(1) as f32;
        let shade = 0.55 + 0.45 * (1.0 - (fx + fy) / 2.0);
        // Faint diagonal bands make pan and zoom visible.
        let band = if ((x + y) / 48) % 2 == 0 { 1.0 } else { 0.92 };
        let c = |v: u8| ((v as f32) * shade * band).clamp(0.0, 255.0) as u8;
        image::Rgba([c(rgb[0]), c(rgb[1]), c(rgb[2]), 255])
    })
}
