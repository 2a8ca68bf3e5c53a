//! Export frame range.

use serde::{Deserialize, Serialize};

use crate::error::{CameraLinkError, Result};

/// Inclusive frame range sampled every `step` frames.
///
/// `end` is sampled only when it lands on a step boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRange {
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

impl ExportRange {
    /// Build and validate a range.
    pub fn new(start: i64, end: i64, step: i64) -> Result<Self> {
        let range = Self { start, end, step };
        range.validate()?;
        Ok(range)
    }

    /// Check `start <= end`, `step >= 1` and that the frame count fits in `usize`.
    pub fn validate(&self) -> Result<()> {
        let reason = if self.end < self.start {
            "end frame must be >= start frame"
        } else if self.step < 1 {
            "step must be >= 1"
        } else if self.checked_frame_count().is_none() {
            "range spans too many frames"
        } else {
            return Ok(());
        };

        Err(CameraLinkError::Range {
            start: self.start,
            end: self.end,
            step: self.step,
            reason: reason.to_string(),
        })
    }

    fn checked_frame_count(&self) -> Option<usize> {
        let span = self.end.checked_sub(self.start)?.max(0);
        let count = (span / self.step.max(1)).checked_add(1)?;
        usize::try_from(count).ok()
    }

    /// `floor((end - start) / step) + 1`, saturating for ranges that fail
    /// [`validate`](Self::validate).
    pub fn frame_count(&self) -> usize {
        self.checked_frame_count().unwrap_or(usize::MAX)
    }

    /// Frames to sample, in increasing order.
    pub fn frames(&self) -> impl Iterator<Item = i64> {
        let ExportRange { start, step, .. } = *self;
        (0..self.frame_count() as i64).map(move |i| start + i * step)
    }

    /// Frame of the last sample.
    pub fn last_frame(&self) -> i64 {
        self.start + (self.frame_count() as i64 - 1) * self.step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_count_formula() {
        for (start, end, step) in [(1, 100, 1), (0, 349, 30), (10, 10, 1), (-5, 5, 3), (1, 2, 5)] {
            let range = ExportRange::new(start, end, step).unwrap();
            let expected = ((end - start) / step) as usize + 1;
            assert_eq!(range.frame_count(), expected);
            assert_eq!(range.frames().count(), expected);
        }
    }

    #[test]
    fn test_end_only_on_step_boundary() {
        let range = ExportRange::new(1, 10, 4).unwrap();
        assert_eq!(range.frames().collect::<Vec<_>>(), vec![1, 5, 9]);
        assert_eq!(range.last_frame(), 9);

        let range = ExportRange::new(1, 9, 4).unwrap();
        assert_eq!(range.frames().collect::<Vec<_>>(), vec![1, 5, 9]);
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(matches!(ExportRange::new(10, 1, 1), Err(CameraLinkError::Range { .. })));
        assert!(matches!(ExportRange::new(1, 10, 0), Err(CameraLinkError::Range { .. })));
        assert!(matches!(ExportRange::new(1, 10, -2), Err(CameraLinkError::Range { .. })));
    }

    #[test]
    fn test_extreme_ranges() {
        assert!(matches!(
            ExportRange::new(i64::MIN, i64::MAX, 1),
            Err(CameraLinkError::Range { reason, .. }) if reason.contains("too many frames")
        ));
        assert!(ExportRange::new(i64::MIN, i64::MAX, 2).is_err());
        assert!(ExportRange::new(0, i64::MAX, 1).is_err());

        let unchecked = ExportRange {
            start: i64::MIN,
            end: i64::MAX,
            step: 1,
        };
        assert_eq!(unchecked.frame_count(), usize::MAX);

        let wide = ExportRange::new(i64::MAX - 10, i64::MAX, 5).unwrap();
        assert_eq!(wide.frames().collect::<Vec<_>>(), vec![i64::MAX - 10, i64::MAX - 5, i64::MAX]);
        assert_eq!(wide.last_frame(), i64::MAX);
    }
}
