use glam::Vec3;
use serde::{
    Deserialize,
    Serialize,
};


#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::unit()
    }
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn unit() -> Self {
        Self::new(Vec3::splat(-1.0), Vec3::ONE)
    }

    pub fn zeroed() -> Self {
        Self::new(Vec3::ZERO, Vec3::ZERO)
    }

    /// tight bounds of `points`, or the unit box when empty
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut points = points.into_iter();

        let Some(first) = points.next() else {
            return Self::unit();
        };

        let mut aabb = Self::new(first, first);
        for point in points {
            aabb.grow(point);
        }
        aabb
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn radius(&self) -> f32 {
        self.size().length() * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn grow(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn grow_union(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grow_is_monotonic() {
        let mut aabb = Aabb::zeroed();
        aabb.grow(Vec3::new(1.0, -2.0, 0.5));
        aabb.grow(Vec3::new(0.2, 0.0, 0.0));

        assert_eq!(aabb.min, Vec3::new(0.0, -2.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 0.0, 0.5));
    }

    #[test]
    fn test_from_points() {
        let aabb = Aabb::from_points([
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(3.0, 4.0, 0.0),
        ]);

        assert_eq!(aabb.center(), Vec3::new(1.0, 2.0, 0.0));
        assert_eq!(aabb.size(), Vec3::new(4.0, 4.0, 0.0));
        assert!((aabb.radius() - 8.0_f32.sqrt()).abs() < 1e-6);

        assert_eq!(Aabb::from_points(std::iter::empty()), Aabb::unit());
    }

    #[test]
    fn test_grow_union() {
        let mut a = Aabb::zeroed();
        a.grow_union(&Aabb::unit());
        assert_eq!(a, Aabb::unit());
    }
}
