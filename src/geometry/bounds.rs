use crate::{Float, Point2f, Point2i, Point3f, Vec2f, Vec3f, INFINITY};
use crate::geometry::Ray;
use cgmath::{EuclideanSpace, InnerSpace};
use std::mem::swap;

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Bounds2i {
    pub min: Point2i,
    pub max: Point2i,
}

impl Bounds2i {
    pub fn with_bounds(min: Point2i, max: Point2i) -> Self {
        Self { min, max }
    }

    pub fn area(&self) -> i32 {
        let d = self.max - self.min;
        d.x * d.y
    }

    pub fn intersection(&self, other: &Bounds2i) -> Bounds2i {
        Self {
            min: Point2i::new(self.min.x.max(other.min.x), self.min.y.max(other.min.y)),
            max: Point2i::new(self.max.x.min(other.max.x), self.max.y.min(other.max.y)),
        }
    }

    pub fn contains(&self, p: Point2i) -> bool {
        p.x >= self.min.x && p.x < self.max.x && p.y >= self.min.y && p.y < self.max.y
    }

    pub fn iter_points(self) -> impl Iterator<Item = (i32, i32)> {
        let (x1, x2, y1, y2) = (self.min.x, self.max.x, self.min.y, self.max.y);
        (y1..y2).flat_map(move |y| (x1..x2).map(move |x| (x, y)))
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Bounds2f {
    pub min: Point2f,
    pub max: Point2f,
}

impl Bounds2f {
    pub fn with_bounds(min: Point2f, max: Point2f) -> Self {
        Self { min, max }
    }

    pub fn diagonal(&self) -> Vec2f {
        self.max - self.min
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Bounds3f {
    pub min: Point3f,
    pub max: Point3f,
}

impl Bounds3f {
    pub fn empty() -> Self {
        Self {
            min: Point3f::new(INFINITY, INFINITY, INFINITY),
            max: Point3f::new(-INFINITY, -INFINITY, -INFINITY),
        }
    }

    pub fn with_bounds(min: Point3f, max: Point3f) -> Self {
        Self { min, max }
    }

    pub fn join(&self, other: &Bounds3f) -> Bounds3f {
        Self {
            min: Point3f::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3f::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    pub fn join_point(&self, p: Point3f) -> Bounds3f {
        Self {
            min: Point3f::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z)),
            max: Point3f::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z)),
        }
    }

    pub fn centroid(&self) -> Point3f {
        self.min.midpoint(self.max)
    }

    pub fn diagonal(&self) -> Vec3f {
        self.max - self.min
    }

    pub fn surface_area(&self) -> Float {
        let d = self.diagonal();
        if d.x < 0.0 || d.y < 0.0 || d.z < 0.0 {
            return 0.0;
        }
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    pub fn max_extent(&self) -> usize {
        let d = self.diagonal();
        if d.x > d.y && d.x > d.z {
            0
        } else if d.y > d.z {
            1
        } else {
            2
        }
    }

    /// The sphere enclosing the bounds. Used to define the "area" of
    /// environmental lights.
    pub fn bounding_sphere(&self) -> (Point3f, Float) {
        let center = self.centroid();
        let radius = (self.max - center).magnitude();
        (center, radius)
    }

    pub fn intersect_p(&self, ray: &Ray) -> Option<(Float, Float)> {
        let mut t0 = ray.mint;
        let mut t1 = ray.maxt;
        for i in 0..3 {
            let inv_dir = 1.0 / ray.d[i];
            let mut t_near = (self.min[i] - ray.o[i]) * inv_dir;
            let mut t_far = (self.max[i] - ray.o[i]) * inv_dir;
            if t_near > t_far {
                swap(&mut t_near, &mut t_far);
            }
            t0 = t0.max(t_near);
            t1 = t1.min(t_far);
            if t0 > t1 {
                return None;
            }
        }
        Some((t0, t1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds3_intersect() {
        let b = Bounds3f::with_bounds(point3f!(-1, -1, -1), point3f!(1, 1, 1));
        let r = Ray::new(point3f!(0, 0, -5), vec3f!(0, 0, 1));
        let (t0, t1) = b.intersect_p(&r).unwrap();
        approx::assert_abs_diff_eq!(t0, 4.0, epsilon = 1e-5);
        approx::assert_abs_diff_eq!(t1, 6.0, epsilon = 1e-5);

        let miss = Ray::new(point3f!(0, 5, -5), vec3f!(0, 0, 1));
        assert!(b.intersect_p(&miss).is_none());
    }

    #[test]
    fn test_bounds2i_iter() {
        let b = Bounds2i::with_bounds(Point2i::new(0, 0), Point2i::new(2, 2));
        let pts: Vec<_> = b.iter_points().collect();
        assert_eq!(pts.len(), 4);
        assert_eq!(pts[0], (0, 0));
        assert_eq!(pts[3], (1, 1));
    }

    #[test]
    fn test_bounding_sphere() {
        let b = Bounds3f::with_bounds(point3f!(-1, -1, -1), point3f!(1, 1, 1));
        let (c, r) = b.bounding_sphere();
        assert_eq!(c, point3f!(0, 0, 0));
        approx::assert_abs_diff_eq!(r, 3.0f32.sqrt(), epsilon = 1e-6);
    }
}
