use crate::geometry::{Ray, Transform};
use crate::sampling::concentric_sample_disk;
use crate::{Float, Point2f, Point3f, Vec3f, INFINITY};
use cgmath::InnerSpace;

/// Perspective camera with an optional thin lens. Both directions of the
/// mapping are exposed: film to ray for eye paths, and lens-plus-direction
/// back to raster coordinates for light-tracing splats.
#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    pub position: Point3f,
    pub target: Point3f,
    pub up: Vec3f,
    pub fov_deg: Float,
    pub lens_radius: Float,
    pub focal_distance: Float,
    pub clip_hither: Float,
    pub clip_yon: Float,
    pub film_width: u32,
    pub film_height: u32,
    pub screen_window: [Float; 4],

    camera_to_world: Transform,
    raster_to_camera: Transform,
    camera_to_raster: Transform,
    dir: Vec3f,
    pixel_area: Float,
}

impl PerspectiveCamera {
    pub fn new(
        position: Point3f,
        target: Point3f,
        up: Vec3f,
        fov_deg: Float,
        film_width: u32,
        film_height: u32,
    ) -> Self {
        let mut cam = Self {
            position,
            target,
            up,
            fov_deg,
            lens_radius: 0.0,
            focal_distance: 10.0,
            clip_hither: 1e-3,
            clip_yon: 1e30,
            film_width,
            film_height,
            screen_window: Self::auto_screen_window(film_width, film_height),
            camera_to_world: Transform::IDENTITY,
            raster_to_camera: Transform::IDENTITY,
            camera_to_raster: Transform::IDENTITY,
            dir: Vec3f::new(0.0, 0.0, 1.0),
            pixel_area: 1.0,
        };
        cam.update();
        cam
    }

    fn auto_screen_window(width: u32, height: u32) -> [Float; 4] {
        let aspect = width as Float / height as Float;
        if aspect >= 1.0 {
            [-aspect, aspect, -1.0, 1.0]
        } else {
            [-1.0, 1.0, -1.0 / aspect, 1.0 / aspect]
        }
    }

    /// Recomputes the projection chain; called after any camera edit.
    pub fn update(&mut self) {
        self.camera_to_world = Transform::camera_look_at(self.position, self.target, self.up);
        self.dir = (self.target - self.position).normalize();

        let [x0, x1, y0, y1] = self.screen_window;
        let screen_to_raster = Transform::scale(self.film_width as Float, self.film_height as Float, 1.0)
            * Transform::scale(1.0 / (x1 - x0), 1.0 / (y0 - y1), 1.0)
            * Transform::translate(vec3f!(-x0, -y1, 0.0));

        let camera_to_screen = Transform::perspective(self.fov_deg, self.clip_hither, self.clip_yon);
        self.camera_to_raster = screen_to_raster * camera_to_screen;
        self.raster_to_camera = self.camera_to_raster.inverse();

        // area of one pixel on the z=1 image plane, for BDPT camera pdfs
        let mut p_min = self.raster_to_camera.transform_point(point3f!(0, 0, 0));
        let mut p_max = self.raster_to_camera.transform_point(point3f!(
            self.film_width,
            self.film_height,
            0
        ));
        p_min /= p_min.z;
        p_max /= p_max.z;
        let image_area = ((p_max.x - p_min.x) * (p_max.y - p_min.y)).abs();
        self.pixel_area = image_area / (self.film_width as Float * self.film_height as Float);
    }

    pub fn direction(&self) -> Vec3f {
        self.dir
    }

    /// Area of a single pixel projected to unit distance; combined with
    /// cos^3 terms this yields the camera importance pdf.
    pub fn pixel_area(&self) -> Float {
        self.pixel_area
    }

    /// Generates the eye ray through the film point; `u1, u2` perturb the
    /// lens position when depth of field is enabled.
    pub fn generate_ray(&self, film_x: Float, film_y: Float, u1: Float, u2: Float) -> Ray {
        let p_camera = self
            .raster_to_camera
            .transform_point(point3f!(film_x, film_y, 0.0));
        let mut origin = Point3f::new(0.0, 0.0, 0.0);
        let mut dir = Vec3f::new(p_camera.x, p_camera.y, p_camera.z).normalize();

        if self.lens_radius > 0.0 {
            let lens = concentric_sample_disk(Point2f::new(u1, u2)) * self.lens_radius;
            let ft = self.focal_distance / dir.z;
            let p_focus = Point3f::new(dir.x * ft, dir.y * ft, dir.z * ft);
            origin = Point3f::new(lens.x, lens.y, 0.0);
            dir = (p_focus - origin).normalize();
        }

        let ray = Ray {
            o: origin,
            d: dir,
            mint: self.clip_hither,
            maxt: self.clip_yon,
        };
        self.camera_to_world.transform_ray(&ray)
    }

    /// Samples a point on the lens in world space.
    pub fn sample_lens(&self, u1: Float, u2: Float) -> Point3f {
        let lens = if self.lens_radius > 0.0 {
            concentric_sample_disk(Point2f::new(u1, u2)) * self.lens_radius
        } else {
            Point2f::new(0.0, 0.0)
        };
        self.camera_to_world
            .transform_point(Point3f::new(lens.x, lens.y, 0.0))
    }

    /// Projects a lens point plus outgoing direction back to the raster
    /// position it exposes. `None` when the direction misses the film or
    /// the hit distance is clipped.
    pub fn get_sample_position(
        &self,
        lens_point: Point3f,
        dir: Vec3f,
        distance: Float,
    ) -> Option<(Float, Float)> {
        let cos_i = dir.dot(self.dir);
        if cos_i <= 0.0 {
            return None;
        }
        if distance.is_finite() {
            let depth = distance * cos_i;
            if depth < self.clip_hither || depth > self.clip_yon {
                return None;
            }
        }

        let along = if self.lens_radius > 0.0 {
            self.focal_distance / cos_i
        } else {
            1.0
        };
        let p_world = lens_point + dir * along;
        let p_camera = self
            .camera_to_world
            .inverse()
            .transform_point(p_world);
        let p_raster = self.camera_to_raster.transform_point(p_camera);

        let (x, y) = (p_raster.x, p_raster.y);
        if x < 0.0 || x >= self.film_width as Float || y < 0.0 || y >= self.film_height as Float {
            return None;
        }
        Some((x, y))
    }

    /// Visibility ray toward a scene point, used for light-to-eye
    /// connections.
    pub fn eye_ray_to(&self, lens_point: Point3f, target: Point3f) -> (Ray, Float) {
        let to_target = target - lens_point;
        let distance = to_target.magnitude();
        let dir = to_target / distance;
        (Ray::segment(lens_point, dir, distance), distance)
    }
}

impl PerspectiveCamera {
    pub fn default_for_film(width: u32, height: u32) -> Self {
        Self::new(
            point3f!(0, 0, -5),
            point3f!(0, 0, 0),
            vec3f!(0, 1, 0),
            45.0,
            width,
            height,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_camera() -> PerspectiveCamera {
        PerspectiveCamera::new(
            point3f!(0, 0, -3),
            point3f!(0, 0, 0),
            vec3f!(0, 1, 0),
            60.0,
            640,
            480,
        )
    }

    #[test]
    fn test_center_ray_points_at_target() {
        let cam = test_camera();
        let ray = cam.generate_ray(320.0, 240.0, 0.5, 0.5);
        approx::assert_abs_diff_eq!(ray.d.z, 1.0, epsilon = 1e-3);
        approx::assert_abs_diff_eq!(ray.o.z, -3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_sample_position_round_trip() {
        let cam = test_camera();
        let film_x = 123.0;
        let film_y = 321.0;
        let ray = cam.generate_ray(film_x, film_y, 0.5, 0.5);
        let (x, y) = cam
            .get_sample_position(ray.o, ray.d, INFINITY)
            .expect("ray must project back onto the film");
        approx::assert_abs_diff_eq!(x, film_x, epsilon = 0.1);
        approx::assert_abs_diff_eq!(y, film_y, epsilon = 0.1);
    }

    #[test]
    fn test_backward_direction_rejected() {
        let cam = test_camera();
        assert!(cam
            .get_sample_position(cam.position, vec3f!(0, 0, -1), INFINITY)
            .is_none());
    }

    #[test]
    fn test_pixel_area_positive() {
        let cam = test_camera();
        assert!(cam.pixel_area() > 0.0);
    }
}
