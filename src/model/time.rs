//! Minute-resolution case time.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Wall-clock minute (from midnight) at which every case starts.
const CASE_CLOCK_START: u32 = 8 * 60;

/// Minutes elapsed since the start of the case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimePoint(pub u32);

impl TimePoint {
    pub fn minutes(self) -> u32 {
        self.0
    }

    pub fn plus(self, minutes: u32) -> Self {
        Self(self.0 + minutes)
    }

    /// "HH:MM" on the case clock, for prose.
    pub fn clock(self) -> String {
        let total = CASE_CLOCK_START + self.0;
        format!("{:02}:{:02}", (total / 60) % 24, total % 60)
    }
}

impl std::fmt::Display for TimePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.clock())
    }
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    start: TimePoint,
    end: TimePoint,
}

impl TimeWindow {
    pub fn new(start: TimePoint, end: TimePoint) -> Result<Self> {
        if start > end {
            return Err(Error::Other(format!(
                "time window start {} is after end {}",
                start.0, end.0
            )));
        }
        Ok(Self { start, end })
    }

    /// Construct from raw minutes, clamping `end` up to `start`.
    pub fn from_minutes(start: u32, end: u32) -> Self {
        Self {
            start: TimePoint(start),
            end: TimePoint(end.max(start)),
        }
    }

    pub fn start(&self) -> TimePoint {
        self.start
    }

    pub fn end(&self) -> TimePoint {
        self.end
    }

    pub fn duration(&self) -> u32 {
        self.end.0 - self.start.0
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, t: TimePoint) -> bool {
        self.start <= t && t < self.end
    }

    /// Does this window fully cover `other`?
    pub fn covers(&self, other: &TimeWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The shared part of two windows, if any.
    pub fn intersection(&self, other: &TimeWindow) -> Option<TimeWindow> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(TimeWindow { start, end })
    }

    /// Parts of `self` not covered by `cut`: zero, one or two windows.
    pub fn subtract(&self, cut: &TimeWindow) -> Vec<TimeWindow> {
        if !self.overlaps(cut) {
            return vec![*self];
        }
        let mut rest = Vec::with_capacity(2);
        if self.start < cut.start {
            rest.push(TimeWindow {
                start: self.start,
                end: cut.start,
            });
        }
        if cut.end < self.end {
            rest.push(TimeWindow {
                start: cut.end,
                end: self.end,
            });
        }
        rest
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start.clock(), self.end.clock())
    }
}

/// Total minutes of `window` covered by the union of `parts`.
pub fn covered_minutes(window: &TimeWindow, parts: &[TimeWindow]) -> u32 {
    let mut clipped: Vec<TimeWindow> = parts
        .iter()
        .filter_map(|p| p.intersection(window))
        .collect();
    clipped.sort_by_key(|w| w.start);

    let mut total = 0;
    let mut cursor = window.start;
    for w in clipped {
        let start = w.start.max(cursor);
        if w.end > start {
            total += w.end.0 - start.0;
            cursor = w.end;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_window() {
        assert!(TimeWindow::new(TimePoint(10), TimePoint(5)).is_err());
        assert!(TimeWindow::new(TimePoint(5), TimePoint(5)).is_ok());
    }

    #[test]
    fn half_open_bounds() {
        let w = TimeWindow::from_minutes(10, 20);
        assert!(w.contains(TimePoint(10)));
        assert!(!w.contains(TimePoint(20)));
        assert!(!w.overlaps(&TimeWindow::from_minutes(20, 30)));
    }

    #[test]
    fn subtract_splits_around_cut() {
        let w = TimeWindow::from_minutes(0, 100);
        let rest = w.subtract(&TimeWindow::from_minutes(40, 60));
        assert_eq!(
            rest,
            vec![TimeWindow::from_minutes(0, 40), TimeWindow::from_minutes(60, 100)]
        );
    }

    #[test]
    fn covered_minutes_merges_overlaps() {
        let w = TimeWindow::from_minutes(10, 50);
        let parts = [
            TimeWindow::from_minutes(0, 20),
            TimeWindow::from_minutes(15, 25),
            TimeWindow::from_minutes(40, 90),
        ];
        assert_eq!(covered_minutes(&w, &parts), 15 + 10);
    }

    #[test]
    fn clock_formats_from_eight() {
        assert_eq!(TimePoint(0).clock(), "08:00");
        assert_eq!(TimePoint(75).clock(), "09:15");
    }
}
