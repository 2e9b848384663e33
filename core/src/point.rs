use nalgebra::Point2;

/// A 2D image coordinate in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2f {
    pub x: f32,
    pub y: f32,
}

impl Point2f {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Coordinate scaled by a uniform factor (pyramid level changes).
    pub fn scaled(&self, scale: f32) -> Self {
        Self::new(self.x * scale, self.y * scale)
    }

    pub fn pt(&self) -> Point2<f32> {
        Point2::new(self.x, self.y)
    }
}

impl From<(f32, f32)> for Point2f {
    fn from((x, y): (f32, f32)) -> Self {
        Self::new(x, y)
    }
}

impl From<Point2f> for Point2<f32> {
    fn from(p: Point2f) -> Self {
        Point2::new(p.x, p.y)
    }
}

/// Index-aligned result of a sparse correspondence search.
///
/// `points[i]` is the right-image match for input point `i`; it is only
/// meaningful when `status[i]` is true.
#[derive(Debug, Clone)]
pub struct Correspondences {
    pub points: Vec<Point2f>,
    pub status: Vec<bool>,
}

impl Correspondences {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.status.iter().filter(|&&s| s).count()
    }

    /// Iterate over the indices and matches of valid points only.
    pub fn iter_valid(&self) -> impl Iterator<Item = (usize, Point2f)> + '_ {
        self.points
            .iter()
            .zip(self.status.iter())
            .enumerate()
            .filter_map(|(i, (&p, &s))| s.then_some((i, p)))
    }
}

/// Index-aligned result of sparse point tracking, with optional per-point
/// tracking error.
#[derive(Debug, Clone)]
pub struct TrackedPoints {
    pub points: Vec<Point2f>,
    pub status: Vec<bool>,
    pub errors: Option<Vec<f32>>,
}

impl TrackedPoints {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.status.iter().filter(|&&s| s).count()
    }
}
