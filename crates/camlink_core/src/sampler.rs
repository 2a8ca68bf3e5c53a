//! Frame-by-frame sampling of a source camera.
//!
//! The host's current time is global state. [`TimeGuard`] records it on
//! creation and puts it back when dropped, so every exit path of a scan
//! (success, error, cancellation, panic unwind) restores it.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::camera::CameraSample;
use crate::error::{CameraLinkError, Result};
use crate::host::{CameraNode, CameraSource};
use crate::range::ExportRange;

/// Upper bound on the sample buffer reserved up front.
const PREALLOCATED_FRAMES: usize = 4096;

/// Scoped borrow of a source host that restores its current time on drop.
pub struct TimeGuard<'a, S: CameraSource + ?Sized> {
    source: &'a mut S,
    saved: f64,
}

impl<'a, S: CameraSource + ?Sized> TimeGuard<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        let saved = source.current_time();
        Self { source, saved }
    }

    /// Time that will be restored.
    pub fn saved_time(&self) -> f64 {
        self.saved
    }
}

impl<S: CameraSource + ?Sized> Deref for TimeGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &*self.source
    }
}

impl<S: CameraSource + ?Sized> DerefMut for TimeGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut *self.source
    }
}

impl<S: CameraSource + ?Sized> Drop for TimeGuard<'_, S> {
    fn drop(&mut self) {
        self.source.set_current_time(self.saved);
        log::debug!("Restored source time to {}", self.saved);
    }
}

/// Samples a camera node over an [`ExportRange`].
pub struct Sampler<'c> {
    range: ExportRange,
    cancel: Option<&'c AtomicBool>,
}

impl<'c> Sampler<'c> {
    pub fn new(range: ExportRange) -> Self {
        Self { range, cancel: None }
    }

    /// Check `flag` between frames; once set, sampling stops with `Cancelled`.
    pub fn with_cancel_flag(mut self, flag: &'c AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Record one sample per frame of the range.
    ///
    /// Output length is always `range.frame_count()`.
    pub fn sample<S: CameraSource + ?Sized>(&self, source: &mut S, node: &CameraNode) -> Result<Vec<CameraSample>> {
        self.range.validate()?;

        let total = self.range.frame_count();
        let mut samples = Vec::with_capacity(total.min(PREALLOCATED_FRAMES));
        let mut host = TimeGuard::new(source);

        for frame in self.range.frames() {
            if self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                log::warn!("Sampling cancelled at frame {} ({}/{})", frame, samples.len(), total);
                return Err(CameraLinkError::Cancelled {
                    completed: samples.len(),
                    total,
                });
            }

            host.set_current_time(frame as f64);
            samples.push(CameraSample {
                frame,
                xform: host.world_xform(node)?,
                lens: host.lens(node)?,
            });
        }

        log::debug!("Sampled {} frames of {}", samples.len(), node.transform);
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::{InMemorySource, SourceScene};

    fn source() -> InMemorySource {
        let json = r#"{
            "current_time": 42,
            "cameras": [{ "transform": "|cam", "keys": [
                { "frame": 0, "lens": { "focal_length": 10.0 } },
                { "frame": 100, "lens": { "focal_length": 110.0 } }
            ]}]
        }"#;
        InMemorySource::from_json_str(json).unwrap()
    }

    #[test]
    fn test_sample_count_and_values() {
        let mut src = source();
        let node = src.resolve_camera(Some("cam")).unwrap();
        let range = ExportRange::new(0, 349, 30).unwrap();

        let samples = Sampler::new(range).sample(&mut src, &node).unwrap();
        assert_eq!(samples.len(), 12);
        assert_eq!(samples[1].frame, 30);
        assert!((samples[1].lens.focal_length - 40.0).abs() < 1e-9);
        assert_eq!(src.current_time(), 42.0);
    }

    #[test]
    fn test_guard_restores_time() {
        let mut src = source();
        {
            let mut guard = TimeGuard::new(&mut src);
            guard.set_current_time(7.0);
            assert_eq!(guard.current_time(), 7.0);
            assert_eq!(guard.saved_time(), 42.0);
        }
        assert_eq!(src.current_time(), 42.0);
    }

    #[test]
    fn test_cancel_restores_time() {
        let mut src = source();
        let node = src.resolve_camera(Some("cam")).unwrap();
        let flag = AtomicBool::new(true);

        let err = Sampler::new(ExportRange::new(1, 10, 1).unwrap())
            .with_cancel_flag(&flag)
            .sample(&mut src, &node)
            .unwrap_err();
        assert!(matches!(err, CameraLinkError::Cancelled { completed: 0, total: 10 }));
        assert_eq!(src.current_time(), 42.0);
    }

    #[test]
    fn test_missing_node_restores_time() {
        let mut src = InMemorySource::new(SourceScene {
            current_time: 5.0,
            ..Default::default()
        });
        let ghost = CameraNode {
            transform: "|ghost".into(),
            shape: "|ghost|ghostShape".into(),
        };
        let err = Sampler::new(ExportRange::new(1, 3, 1).unwrap())
            .sample(&mut src, &ghost)
            .unwrap_err();
        assert!(matches!(err, CameraLinkError::Resolution { .. }));
        assert_eq!(src.current_time(), 5.0);
    }
}
