use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    pub time: f64,
    pub value: f64,
}

impl ControlPoint {
    pub fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

/// Piecewise-linear curve through user placed control points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointCurve {
    points: Vec<ControlPoint>,
}

impl PointCurve {
    pub fn new(points: impl IntoIterator<Item = ControlPoint>) -> Self {
        let mut curve = Self::default();
        for point in points {
            curve.add_point(point);
        }
        curve
    }

    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }

    /// Inserts `point` keeping the points ordered by time. A point sharing
    /// its time with existing ones goes after them.
    pub fn add_point(&mut self, point: ControlPoint) {
        let index = self.points.partition_point(|p| p.time <= point.time);
        self.points.insert(index, point);
    }

    pub fn remove_point(&mut self, index: usize) -> Option<ControlPoint> {
        (index < self.points.len()).then(|| self.points.remove(index))
    }

    /// Value at `time`, clamped to the first/last point outside the covered
    /// range. `None` when the curve has no points or `time` is not finite.
    pub fn evaluate(&self, time: f64) -> Option<f64> {
        if !time.is_finite() {
            return None;
        }
        let first = self.points.first()?;
        let last = self.points.last()?;
        if time <= first.time {
            return Some(first.value);
        }
        if time >= last.time {
            return Some(last.value);
        }

        let upper = self.points.partition_point(|p| p.time <= time);
        let (a, b) = (self.points[upper - 1], self.points[upper]);
        let span = b.time - a.time;
        if span <= f64::EPSILON {
            return Some(b.value);
        }
        Some(a.value + (b.value - a.value) * (time - a.time) / span)
    }

    /// Re-sorts after points were edited in place or restored from a file.
    pub(crate) fn normalize(&mut self) {
        self.points
            .retain(|p| p.time.is_finite() && p.value.is_finite());
        self.points.sort_by(|a, b| a.time.total_cmp(&b.time));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve() -> PointCurve {
        PointCurve::new([
            ControlPoint::new(2.0, 10.0),
            ControlPoint::new(0.0, 0.0),
            ControlPoint::new(4.0, 0.0),
        ])
    }

    #[test]
    fn keeps_points_sorted() {
        let times: Vec<_> = curve().points().iter().map(|p| p.time).collect();
        assert_eq!(times, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn interpolates_between_bracketing_points() {
        let curve = curve();
        assert_eq!(curve.evaluate(1.0), Some(5.0));
        assert_eq!(curve.evaluate(3.0), Some(5.0));
        assert_eq!(curve.evaluate(2.0), Some(10.0));
    }

    #[test]
    fn clamps_outside_range() {
        let curve = curve();
        assert_eq!(curve.evaluate(-3.0), Some(0.0));
        assert_eq!(curve.evaluate(99.0), Some(0.0));
        assert_eq!(PointCurve::default().evaluate(1.0), None);
    }

    #[test]
    fn non_finite_time_has_no_value() {
        let curve = curve();
        assert_eq!(curve.evaluate(f64::NAN), None);
        assert_eq!(curve.evaluate(f64::INFINITY), None);
        assert_eq!(curve.evaluate(f64::NEG_INFINITY), None);
    }

    #[test]
    fn removes_points_by_index() {
        let mut curve = curve();
        assert_eq!(curve.remove_point(1), Some(ControlPoint::new(2.0, 10.0)));
        assert_eq!(curve.remove_point(7), None);
        assert_eq!(curve.evaluate(2.0), Some(0.0));
    }
}
