use crate::bsdf::hitpoint::HitPoint;
use crate::geometry::{Bounds3f, Ray, Transform};
use crate::material::MaterialIndex;
use crate::{Float, Normal3, Point2f, Point3f, RayHit, Spectrum, Vec2f, Vec3f};
use cgmath::InnerSpace;

/// An indexed triangle mesh with optional per-vertex shading attributes.
/// Instance transforms are baked into the vertex data at scene build, so
/// the intersection code never sees a transform.
#[derive(Debug, Clone)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub normals: Option<Vec<Normal3>>,
    pub uvs: Option<Vec<Vec2f>>,
    pub colors: Option<Vec<Spectrum>>,
    pub alphas: Option<Vec<Float>>,
    pub triangles: Vec<[u32; 3]>,
    pub material: MaterialIndex,
}

impl TriangleMesh {
    pub fn new(vertices: Vec<Point3f>, triangles: Vec<[u32; 3]>, material: MaterialIndex) -> Self {
        Self {
            vertices,
            normals: None,
            uvs: None,
            colors: None,
            alphas: None,
            triangles,
            material,
        }
    }

    pub fn apply_transform(&mut self, t: &Transform) {
        for v in &mut self.vertices {
            *v = t.transform_point(*v);
        }
        if let Some(normals) = &mut self.normals {
            for n in normals.iter_mut() {
                *n = Normal3(t.transform_normal(*n).normalize());
            }
        }
    }

    pub fn tri_vertices(&self, tri_index: usize) -> (Point3f, Point3f, Point3f) {
        let [i0, i1, i2] = self.triangles[tri_index];
        (
            self.vertices[i0 as usize],
            self.vertices[i1 as usize],
            self.vertices[i2 as usize],
        )
    }

    pub fn tri_bounds(&self, tri_index: usize) -> Bounds3f {
        let (v0, v1, v2) = self.tri_vertices(tri_index);
        Bounds3f::empty().join_point(v0).join_point(v1).join_point(v2)
    }

    pub fn tri_area(&self, tri_index: usize) -> Float {
        let (v0, v1, v2) = self.tri_vertices(tri_index);
        0.5 * (v1 - v0).cross(v2 - v0).magnitude()
    }

    pub fn tri_geometric_normal(&self, tri_index: usize) -> Normal3 {
        let (v0, v1, v2) = self.tri_vertices(tri_index);
        Normal3((v1 - v0).cross(v2 - v0).normalize())
    }

    /// Möller-Trumbore, returning (t, b1, b2) within the ray extent.
    pub fn intersect_tri(&self, tri_index: usize, ray: &Ray) -> Option<(Float, Float, Float)> {
        let (v0, v1, v2) = self.tri_vertices(tri_index);
        let e1 = v1 - v0;
        let e2 = v2 - v0;
        let pvec = ray.d.cross(e2);
        let det = e1.dot(pvec);
        if det.abs() < 1e-10 {
            return None;
        }
        let inv_det = 1.0 / det;
        let tvec = ray.o - v0;
        let b1 = tvec.dot(pvec) * inv_det;
        if b1 < 0.0 || b1 > 1.0 {
            return None;
        }
        let qvec = tvec.cross(e1);
        let b2 = ray.d.dot(qvec) * inv_det;
        if b2 < 0.0 || b1 + b2 > 1.0 {
            return None;
        }
        let t = e2.dot(qvec) * inv_det;
        if t <= ray.mint || t >= ray.maxt {
            return None;
        }
        Some((t, b1, b2))
    }

    pub fn interpolate_normal(&self, tri_index: usize, b1: Float, b2: Float) -> Normal3 {
        match &self.normals {
            Some(normals) => {
                let [i0, i1, i2] = self.triangles[tri_index];
                let b0 = 1.0 - b1 - b2;
                Normal3(
                    (normals[i0 as usize].0 * b0
                        + normals[i1 as usize].0 * b1
                        + normals[i2 as usize].0 * b2)
                        .normalize(),
                )
            }
            None => self.tri_geometric_normal(tri_index),
        }
    }

    pub fn interpolate_uv(&self, tri_index: usize, b1: Float, b2: Float) -> Vec2f {
        match &self.uvs {
            Some(uvs) => {
                let [i0, i1, i2] = self.triangles[tri_index];
                let b0 = 1.0 - b1 - b2;
                uvs[i0 as usize] * b0 + uvs[i1 as usize] * b1 + uvs[i2 as usize] * b2
            }
            None => Vec2f::new(b1, b2),
        }
    }

    fn interpolate_color(&self, tri_index: usize, b1: Float, b2: Float) -> Spectrum {
        match &self.colors {
            Some(colors) => {
                let [i0, i1, i2] = self.triangles[tri_index];
                let b0 = 1.0 - b1 - b2;
                colors[i0 as usize] * b0 + colors[i1 as usize] * b1 + colors[i2 as usize] * b2
            }
            None => Spectrum::WHITE,
        }
    }

    fn interpolate_alpha(&self, tri_index: usize, b1: Float, b2: Float) -> Float {
        match &self.alphas {
            Some(alphas) => {
                let [i0, i1, i2] = self.triangles[tri_index];
                let b0 = 1.0 - b1 - b2;
                alphas[i0 as usize] * b0 + alphas[i1 as usize] * b1 + alphas[i2 as usize] * b2
            }
            None => 1.0,
        }
    }

    /// Tangent frame from the uv parameterization, or an arbitrary basis
    /// when the mesh has no uvs.
    fn dpdu_dpdv(&self, tri_index: usize, ns: Normal3) -> (Vec3f, Vec3f) {
        let (v0, v1, v2) = self.tri_vertices(tri_index);
        if let Some(uvs) = &self.uvs {
            let [i0, i1, i2] = self.triangles[tri_index];
            let uv0 = uvs[i0 as usize];
            let uv1 = uvs[i1 as usize];
            let uv2 = uvs[i2 as usize];
            let duv1 = uv1 - uv0;
            let duv2 = uv2 - uv0;
            let det = duv1.x * duv2.y - duv1.y * duv2.x;
            if det.abs() > 1e-10 {
                let inv_det = 1.0 / det;
                let dp1 = v1 - v0;
                let dp2 = v2 - v0;
                let dpdu = (dp1 * duv2.y - dp2 * duv1.y) * inv_det;
                let dpdv = (dp2 * duv1.x - dp1 * duv2.x) * inv_det;
                return (dpdu, dpdv);
            }
        }
        let (t, b) = crate::coordinate_system(ns.0);
        (t, b)
    }

    pub fn hit_point(
        &self,
        hit: RayHit,
        ray: &Ray,
        pass_through_event: Float,
        from_light: bool,
    ) -> HitPoint {
        let tri = hit.tri_index as usize;
        let p = ray.at(hit.t);
        let fixed_dir = -ray.d;

        let ng_raw = self.tri_geometric_normal(tri);
        let into_object = ray.d.dot(ng_raw.0) < 0.0;

        let ns_raw = self.interpolate_normal(tri, hit.b1, hit.b2);
        // orient both normals toward the incoming side
        let ng = ng_raw.faceforward(fixed_dir);
        let ns = ns_raw.faceforward(fixed_dir);

        let (dpdu, dpdv) = self.dpdu_dpdv(tri, ns);

        HitPoint {
            fixed_dir,
            p,
            uv: self.interpolate_uv(tri, hit.b1, hit.b2),
            ng,
            ns,
            dpdu,
            dpdv,
            color: self.interpolate_color(tri, hit.b1, hit.b2),
            alpha: self.interpolate_alpha(tri, hit.b1, hit.b2),
            pass_through_event,
            from_light,
            into_object,
            interior_volume: None,
            exterior_volume: None,
        }
    }

    /// Uniform point on a triangle; returns position, normal and uv there.
    pub fn sample_tri(&self, tri_index: usize, u: Point2f) -> (Point3f, Normal3, Vec2f) {
        let (b0, b1) = crate::sampling::uniform_sample_triangle(u);
        let b2 = 1.0 - b0 - b1;
        let (v0, v1, v2) = self.tri_vertices(tri_index);
        let p = Point3f::new(
            v0.x * b0 + v1.x * b1 + v2.x * b2,
            v0.y * b0 + v1.y * b1 + v2.y * b2,
            v0.z * b0 + v1.z * b1 + v2.z * b2,
        );
        // barycentrics are (b1, b2) relative to the intersection layout
        (p, self.interpolate_normal(tri_index, b1, b2), self.interpolate_uv(tri_index, b1, b2))
    }

    pub fn total_area(&self) -> Float {
        (0..self.triangles.len()).map(|i| self.tri_area(i)).sum()
    }

    /// Axis-aligned unit quad builders used by tests and the demo scenes.
    pub fn quad(p0: Point3f, p1: Point3f, p2: Point3f, p3: Point3f, material: MaterialIndex) -> Self {
        Self::new(vec![p0, p1, p2, p3], vec![[0, 1, 2], [0, 2, 3]], material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::InnerSpace;

    fn unit_quad() -> TriangleMesh {
        TriangleMesh::quad(
            point3f!(-1, -1, 0),
            point3f!(1, -1, 0),
            point3f!(1, 1, 0),
            point3f!(-1, 1, 0),
            0,
        )
    }

    #[test]
    fn test_intersect_hits_quad() {
        let mesh = unit_quad();
        let ray = Ray::new(point3f!(0.2, 0.1, -3), vec3f!(0, 0, 1));
        let hit = mesh.intersect_tri(0, &ray).or_else(|| mesh.intersect_tri(1, &ray));
        let (t, _, _) = hit.unwrap();
        approx::assert_abs_diff_eq!(t, 3.0, epsilon = 1e-4);
    }

    #[test]
    fn test_miss_outside_quad() {
        let mesh = unit_quad();
        let ray = Ray::new(point3f!(2.0, 0.0, -3), vec3f!(0, 0, 1));
        assert!(mesh.intersect_tri(0, &ray).is_none());
        assert!(mesh.intersect_tri(1, &ray).is_none());
    }

    #[test]
    fn test_area_of_quad() {
        let mesh = unit_quad();
        approx::assert_abs_diff_eq!(mesh.total_area(), 4.0, epsilon = 1e-5);
    }

    #[test]
    fn test_hit_point_orientation() {
        let mesh = unit_quad();
        let ray = Ray::new(point3f!(0, 0, 3), vec3f!(0, 0, -1));
        let (t, b1, b2) = mesh
            .intersect_tri(0, &ray)
            .or_else(|| mesh.intersect_tri(1, &ray))
            .unwrap();
        let hit = RayHit { t, b1, b2, mesh_index: 0, tri_index: 0 };
        let hp = mesh.hit_point(hit, &ray, 0.5, false);
        // normal faces back along the ray
        assert!(hp.ng.dot(vec3f!(0, 0, 1)) > 0.0);
    }

    #[test]
    fn test_sample_tri_on_surface() {
        let mesh = unit_quad();
        let (p, n, _) = mesh.sample_tri(0, Point2f::new(0.3, 0.7));
        approx::assert_abs_diff_eq!(p.z, 0.0, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(n.magnitude(), 1.0, epsilon = 1e-5);
    }
}
