//! Frame sources and the producer thread that feeds them into a channel

use anyhow::{bail, Context, Result};
use crossbeam_channel::{bounded, Receiver, TrySendError};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::CapturedFrame;

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Something that produces frames at a steady rate
pub trait FrameSource: Send {
    /// Next frame, or `None` once the source is exhausted
    fn next_frame(&mut self) -> Result<Option<Arc<RgbImage>>>;

    /// Delay between frames
    fn interval(&self) -> Duration;
}

/// Replays the images of a directory, sorted by file name.
///
/// Frames are decoded on demand. Only the last decoded frame is kept, so a
/// single looping image is not decoded again on every tick.
pub struct ReplaySource {
    paths: Vec<PathBuf>,
    last: Option<(usize, Arc<RgbImage>)>,
    position: usize,
    interval: Duration,
    looping: bool,
}

impl ReplaySource {
    /// Collect the images in `dir`. Fails when there are none.
    pub fn from_dir(dir: &Path, fps: u32, looping: bool) -> Result<Self> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {:?}", dir))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image(path))
            .collect();
        paths.sort();

        if paths.is_empty() {
            bail!("No images found in {:?}", dir);
        }

        info!("Replaying {} frames from {:?} at {} fps", paths.len(), dir, fps.max(1));

        Ok(Self {
            paths,
            last: None,
            position: 0,
            interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            looping,
        })
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<Arc<RgbImage>>> {
        if self.position >= self.paths.len() {
            if !self.looping {
                return Ok(None);
            }
            self.position = 0;
        }

        let idx = self.position;
        self.position += 1;

        if let Some((last_idx, image)) = &self.last {
            if *last_idx == idx {
                return Ok(Some(image.clone()));
            }
        }

        let path = &self.paths[idx];
        let image = Arc::new(
            image::open(path)
                .with_context(|| format!("Failed to decode frame {:?}", path))?
                .to_rgb8(),
        );
        self.last = Some((idx, image.clone()));
        Ok(Some(image))
    }

    fn interval(&self) -> Duration {
        self.interval
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Handle to a running producer thread. Stops and joins it on drop.
pub struct SourceHandle {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SourceHandle {
    /// Signal the producer to stop and wait for it
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run `source` on its own thread, sending frames into a bounded channel of
/// `capacity`. Frames that do not fit are dropped rather than queued.
pub fn spawn_source(mut source: Box<dyn FrameSource>, capacity: usize) -> (Receiver<CapturedFrame>, SourceHandle) {
    let (tx, rx) = bounded(capacity.max(1));
    let stop = Arc::new(AtomicBool::new(false));

    let flag = stop.clone();
    let handle = std::thread::spawn(move || {
        debug!("Frame source thread starting");
        let mut sequence = 0u64;
        let mut dropped = 0u64;

        while !flag.load(Ordering::SeqCst) {
            let image = match source.next_frame() {
                Ok(Some(image)) => image,
                Ok(None) => {
                    info!("Frame source exhausted after {} frames", sequence);
                    break;
                }
                Err(e) => {
                    warn!("Frame source failed: {:#}", e);
                    break;
                }
            };

            sequence += 1;
            match tx.try_send(CapturedFrame::new(image, sequence)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    trace!("Consumer busy, dropped frame #{}", sequence);
                }
                Err(TrySendError::Disconnected(_)) => break,
            }

            std::thread::sleep(source.interval());
        }

        debug!("Frame source thread exiting ({} frames, {} dropped)", sequence, dropped);
    });

    (
        rx,
        SourceHandle {
            stop,
            handle: Some(handle),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::time::Instant;
    use tempfile::tempdir;

    /// Emits `total` 1x1 frames whose red channel is the frame number
    struct Counter {
        next: u8,
        total: u8,
    }

    impl FrameSource for Counter {
        fn next_frame(&mut self) -> Result<Option<Arc<RgbImage>>> {
            if self.next >= self.total {
                return Ok(None);
            }
            self.next += 1;
            Ok(Some(Arc::new(RgbImage::from_pixel(1, 1, Rgb([self.next, 0, 0])))))
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(1)
        }
    }

    fn write_frame(dir: &Path, name: &str, value: u8) {
        RgbImage::from_pixel(2, 2, Rgb([value, value, value]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_replay_sorted_and_looping() {
        let dir = tempdir().unwrap();
        write_frame(dir.path(), "b.png", 20);
        write_frame(dir.path(), "a.png", 10);
        std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let mut source = ReplaySource::from_dir(dir.path(), 10, true).unwrap();
        assert_eq!(source.interval(), Duration::from_millis(100));

        let values: Vec<u8> = (0..3)
            .map(|_| source.next_frame().unwrap().unwrap().get_pixel(0, 0).0[0])
            .collect();
        assert_eq!(values, vec![10, 20, 10]);
    }

    #[test]
    fn test_replay_decodes_on_each_pass() {
        let dir = tempdir().unwrap();
        write_frame(dir.path(), "a.png", 10);
        write_frame(dir.path(), "b.png", 20);

        let mut source = ReplaySource::from_dir(dir.path(), 10, true).unwrap();
        let first = source.next_frame().unwrap().unwrap();
        source.next_frame().unwrap();

        // a second pass reads the file again instead of a retained copy
        write_frame(dir.path(), "a.png", 99);
        let again = source.next_frame().unwrap().unwrap();
        assert_eq!(again.get_pixel(0, 0).0[0], 99);
        assert!(!Arc::ptr_eq(&first, &again));
    }

    #[test]
    fn test_single_looping_frame_reused() {
        let dir = tempdir().unwrap();
        write_frame(dir.path(), "only.png", 7);

        let mut source = ReplaySource::from_dir(dir.path(), 10, true).unwrap();
        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_replay_without_loop_ends() {
        let dir = tempdir().unwrap();
        write_frame(dir.path(), "only.png", 1);

        let mut source = ReplaySource::from_dir(dir.path(), 30, false).unwrap();
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_replay_empty_dir_rejected() {
        let dir = tempdir().unwrap();
        assert!(ReplaySource::from_dir(dir.path(), 30, true).is_err());
        assert!(ReplaySource::from_dir(&dir.path().join("missing"), 30, true).is_err());
    }

    #[test]
    fn test_spawned_source_delivers_in_order() {
        let (rx, _handle) = spawn_source(Box::new(Counter { next: 0, total: 3 }), 8);

        let frames: Vec<CapturedFrame> = rx.iter().collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames.iter().map(|f| f.sequence).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(frames[2].image.get_pixel(0, 0).0[0], 3);
    }

    #[test]
    fn test_full_channel_drops_frames() {
        let (rx, mut handle) = spawn_source(Box::new(Counter { next: 0, total: 50 }), 1);

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        handle.stop();

        // nothing was consumed, so only the first frame fit
        let frames: Vec<CapturedFrame> = rx.try_iter().collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].sequence, 1);
    }

    #[test]
    fn test_stop_ends_endless_source() {
        let dir = tempdir().unwrap();
        write_frame(dir.path(), "loop.png", 5);
        let source = ReplaySource::from_dir(dir.path(), 200, true).unwrap();

        let (rx, mut handle) = spawn_source(Box::new(source), 2);
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());

        handle.stop();
        assert!(!handle.is_running());
    }
}
