use crate::geometry::{Bounds3f, Ray};
use crate::scene::mesh::TriangleMesh;
use crate::{Float, Point3f, RayHit};

/// The scene's ray-intersection oracle: a flat BVH over every triangle of
/// every mesh. Rebuilt from scratch on geometry edits; queries are
/// read-only and shared across all workers and devices.
#[derive(Debug)]
pub struct Accelerator {
    nodes: Vec<BvhNode>,
    prims: Vec<PrimRef>,
    bounds: Bounds3f,
}

#[derive(Debug, Clone, Copy)]
struct PrimRef {
    mesh_index: u32,
    tri_index: u32,
    bounds: Bounds3f,
    centroid: Point3f,
}

#[derive(Debug)]
enum BvhNode {
    Interior {
        bounds: Bounds3f,
        right_child: usize,
        axis: usize,
    },
    Leaf {
        bounds: Bounds3f,
        first_prim: usize,
        prim_count: usize,
    },
}

const MAX_PRIMS_IN_LEAF: usize = 4;

impl Accelerator {
    pub fn build(meshes: &[TriangleMesh]) -> Self {
        let mut prims: Vec<PrimRef> = meshes
            .iter()
            .enumerate()
            .flat_map(|(mesh_index, mesh)| {
                (0..mesh.triangles.len()).map(move |tri_index| {
                    let bounds = mesh.tri_bounds(tri_index);
                    PrimRef {
                        mesh_index: mesh_index as u32,
                        tri_index: tri_index as u32,
                        bounds,
                        centroid: bounds.centroid(),
                    }
                })
            })
            .collect();

        let mut nodes = Vec::with_capacity(2 * prims.len().max(1));
        let bounds = if prims.is_empty() {
            Bounds3f::empty()
        } else {
            let n = prims.len();
            Self::build_recursive(&mut nodes, &mut prims, 0, n);
            match &nodes[0] {
                BvhNode::Interior { bounds, .. } | BvhNode::Leaf { bounds, .. } => *bounds,
            }
        };

        Self { nodes, prims, bounds }
    }

    fn build_recursive(
        nodes: &mut Vec<BvhNode>,
        prims: &mut [PrimRef],
        first: usize,
        count: usize,
    ) -> usize {
        let node_bounds = prims[first..first + count]
            .iter()
            .fold(Bounds3f::empty(), |b, p| b.join(&p.bounds));

        let node_index = nodes.len();
        if count <= MAX_PRIMS_IN_LEAF {
            nodes.push(BvhNode::Leaf { bounds: node_bounds, first_prim: first, prim_count: count });
            return node_index;
        }

        let centroid_bounds = prims[first..first + count]
            .iter()
            .fold(Bounds3f::empty(), |b, p| b.join_point(p.centroid));
        let axis = centroid_bounds.max_extent();
        let extent = centroid_bounds.diagonal()[axis];
        if extent < 1e-8 {
            nodes.push(BvhNode::Leaf { bounds: node_bounds, first_prim: first, prim_count: count });
            return node_index;
        }

        // median split on the widest centroid axis
        let mid = count / 2;
        prims[first..first + count].sort_unstable_by(|a, b| {
            a.centroid[axis].partial_cmp(&b.centroid[axis]).unwrap()
        });

        nodes.push(BvhNode::Interior { bounds: node_bounds, right_child: 0, axis });
        Self::build_recursive(nodes, prims, first, mid);
        let right = Self::build_recursive(nodes, prims, first + mid, count - mid);
        if let BvhNode::Interior { right_child, .. } = &mut nodes[node_index] {
            *right_child = right;
        }
        node_index
    }

    pub fn world_bounds(&self) -> Bounds3f {
        self.bounds
    }

    pub fn prim_count(&self) -> usize {
        self.prims.len()
    }

    /// Closest-hit query. Returns the miss sentinel when nothing is in
    /// `[mint, maxt]`.
    pub fn trace(&self, ray: &Ray, meshes: &[TriangleMesh]) -> RayHit {
        let mut hit = RayHit::MISS;
        if self.nodes.is_empty() {
            return hit;
        }

        let mut current_ray = *ray;
        let mut stack = [0usize; 64];
        let mut stack_len = 1;
        let neg_dir = [ray.d.x < 0.0, ray.d.y < 0.0, ray.d.z < 0.0];

        while stack_len > 0 {
            stack_len -= 1;
            let node_index = stack[stack_len];
            match &self.nodes[node_index] {
                BvhNode::Interior { bounds, right_child, axis } => {
                    if bounds.intersect_p(&current_ray).is_some() {
                        // visit the near side first
                        let (near, far) = if neg_dir[*axis] {
                            (*right_child, node_index + 1)
                        } else {
                            (node_index + 1, *right_child)
                        };
                        stack[stack_len] = far;
                        stack_len += 1;
                        stack[stack_len] = near;
                        stack_len += 1;
                    }
                }
                BvhNode::Leaf { bounds, first_prim, prim_count } => {
                    if bounds.intersect_p(&current_ray).is_none() {
                        continue;
                    }
                    for prim in &self.prims[*first_prim..*first_prim + *prim_count] {
                        let mesh = &meshes[prim.mesh_index as usize];
                        if let Some((t, b1, b2)) =
                            mesh.intersect_tri(prim.tri_index as usize, &current_ray)
                        {
                            current_ray.maxt = t;
                            hit = RayHit {
                                t,
                                b1,
                                b2,
                                mesh_index: prim.mesh_index,
                                tri_index: prim.tri_index,
                            };
                        }
                    }
                }
            }
        }
        hit
    }

    /// Any-hit query for visibility tests.
    pub fn trace_any(&self, ray: &Ray, meshes: &[TriangleMesh]) -> bool {
        !self.trace(ray, meshes).is_miss()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_quads() -> Vec<TriangleMesh> {
        vec![
            TriangleMesh::quad(
                point3f!(-1, -1, 0),
                point3f!(1, -1, 0),
                point3f!(1, 1, 0),
                point3f!(-1, 1, 0),
                0,
            ),
            TriangleMesh::quad(
                point3f!(-1, -1, 5),
                point3f!(1, -1, 5),
                point3f!(1, 1, 5),
                point3f!(-1, 1, 5),
                0,
            ),
        ]
    }

    #[test]
    fn test_returns_closest_hit() {
        let meshes = two_quads();
        let accel = Accelerator::build(&meshes);
        let ray = Ray::new(point3f!(0, 0, -3), vec3f!(0, 0, 1));
        let hit = accel.trace(&ray, &meshes);
        assert!(!hit.is_miss());
        approx::assert_abs_diff_eq!(hit.t, 3.0, epsilon = 1e-4);
        assert_eq!(hit.mesh_index, 0);
    }

    #[test]
    fn test_respects_mint() {
        let meshes = two_quads();
        let accel = Accelerator::build(&meshes);
        // start beyond the first quad: must find the second
        let ray = Ray::with_extent(point3f!(0, 0, -3), vec3f!(0, 0, 1), 4.0, 1000.0);
        let hit = accel.trace(&ray, &meshes);
        assert_eq!(hit.mesh_index, 1);
    }

    #[test]
    fn test_miss() {
        let meshes = two_quads();
        let accel = Accelerator::build(&meshes);
        let ray = Ray::new(point3f!(0, 5, -3), vec3f!(0, 0, 1));
        assert!(accel.trace(&ray, &meshes).is_miss());
    }

    #[test]
    fn test_many_triangles() {
        // grid of quads stresses the interior nodes
        let mut meshes = Vec::new();
        for i in 0..8 {
            for j in 0..8 {
                let x = i as Float * 2.0 - 8.0;
                let y = j as Float * 2.0 - 8.0;
                meshes.push(TriangleMesh::quad(
                    point3f!(x, y, 0),
                    point3f!(x + 1.0, y, 0),
                    point3f!(x + 1.0, y + 1.0, 0),
                    point3f!(x, y + 1.0, 0),
                    0,
                ));
            }
        }
        let accel = Accelerator::build(&meshes);
        assert_eq!(accel.prim_count(), 128);
        let ray = Ray::new(point3f!(-7.5, -7.5, -2), vec3f!(0, 0, 1));
        assert!(!accel.trace(&ray, &meshes).is_miss());
    }
}
