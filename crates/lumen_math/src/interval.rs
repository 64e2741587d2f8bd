/// A closed range of ray parameters `[min, max]`.
///
/// Traversal carries one of these down the tree and shrinks `max` as
/// closer hits are found.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f32,
    pub max: f32,
}

impl Interval {
    /// Create a new interval given min and max values.
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Returns the size of the interval (max - min).
    pub fn size(&self) -> f32 {
        self.max - self.min
    }

    /// Returns true if the interval contains no values.
    pub fn is_empty(&self) -> bool {
        !(self.min <= self.max)
    }

    /// Returns true if x is strictly within the interval (min, max) (exclusive).
    pub fn surrounds(&self, x: f32) -> bool {
        self.min < x && x < self.max
    }

    /// Same interval with `max` lowered to `t`.
    pub fn clip_max(&self, t: f32) -> Interval {
        Interval::new(self.min, self.max.min(t))
    }

    /// Creates an interval that surrounds two other intervals.
    pub fn surrounding(a: &Interval, b: &Interval) -> Interval {
        Interval::new(a.min.min(b.min), a.max.max(b.max))
    }

    /// An empty interval (min > max, contains nothing).
    pub const EMPTY: Interval = Interval {
        min: f32::INFINITY,
        max: f32::NEG_INFINITY,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_size() {
        let interval = Interval::new(2.0, 7.0);
        assert_eq!(interval.size(), 5.0);
    }

    #[test]
    fn test_interval_surrounds() {
        let interval = Interval::new(0.0, 10.0);

        // Exclusive bounds - endpoints NOT included
        assert!(!interval.surrounds(0.0));
        assert!(!interval.surrounds(10.0));
        assert!(interval.surrounds(5.0));
        assert!(!interval.surrounds(-0.1));
    }

    #[test]
    fn test_interval_clip_max() {
        let interval = Interval::new(0.0, 10.0);
        assert_eq!(interval.clip_max(4.0), Interval::new(0.0, 4.0));
        assert_eq!(interval.clip_max(40.0), interval);
    }

    #[test]
    fn test_interval_empty() {
        assert!(Interval::EMPTY.is_empty());
        assert!(Interval::new(f32::NAN, 1.0).is_empty());
        assert!(!Interval::new(1.0, 1.0).is_empty());
    }

    #[test]
    fn test_interval_surrounding() {
        let joined = Interval::surrounding(&Interval::EMPTY, &Interval::new(-1.0, 2.0));
        assert_eq!(joined, Interval::new(-1.0, 2.0));
    }
}
