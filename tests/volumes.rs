//! Participating-media transport: engine cross-checks and the nested
//! priority rule end to end.

use lucent::camera::PerspectiveCamera;
use lucent::engine::{bidir, path, EngineCounters, RenderParams, SamplerType, WorkerContext};
use lucent::film::{Film, Filter};
use lucent::light::{LightSource, PointLight};
use lucent::material::{Material, MaterialBase, Materials, NullMaterial};
use lucent::sampler::MetropolisSharedState;
use lucent::scene::mesh::TriangleMesh;
use lucent::scene::Scene;
use lucent::texture::{Texture, Textures};
use lucent::volume::{HomogeneousVolume, Volume, VolumeBase, Volumes};
use lucent::{point3f, vec3f, Float, Spectrum};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// A null-surface box filled with a scattering medium, lit from inside by
/// a point light, camera outside looking in.
fn fog_box_scene() -> Scene {
    let mut texs = Textures::new();
    let ior = texs.add(Texture::ConstFloat(1.0));
    let sigma_a = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.1)));
    let sigma_s = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.5)));
    let g = texs.add(Texture::ConstSpectrum(Spectrum::BLACK));

    let mut volumes = Volumes::new();
    let fog = volumes.add(Volume::Homogeneous(HomogeneousVolume {
        base: VolumeBase { ior, emission: None, priority: 1 },
        sigma_a,
        sigma_s,
        g,
        multi_scattering: false,
    }));

    let mut mats = Materials::new();
    let mut null_base = MaterialBase::default();
    null_base.interior_volume = Some(fog);
    let boundary = mats.add(Material::Null(NullMaterial::new(null_base)));

    // axis-aligned box [-1,1]^3 from 6 quads with outward normals
    let mut meshes = Vec::new();
    let quads: [[lucent::Point3f; 4]; 6] = [
        // -z face (outward -z)
        [point3f!(-1, -1, -1), point3f!(-1, 1, -1), point3f!(1, 1, -1), point3f!(1, -1, -1)],
        // +z face (outward +z)
        [point3f!(-1, -1, 1), point3f!(1, -1, 1), point3f!(1, 1, 1), point3f!(-1, 1, 1)],
        // -y
        [point3f!(-1, -1, -1), point3f!(1, -1, -1), point3f!(1, -1, 1), point3f!(-1, -1, 1)],
        // +y
        [point3f!(-1, 1, -1), point3f!(-1, 1, 1), point3f!(1, 1, 1), point3f!(1, 1, -1)],
        // -x
        [point3f!(-1, -1, -1), point3f!(-1, -1, 1), point3f!(-1, 1, 1), point3f!(-1, 1, -1)],
        // +x
        [point3f!(1, -1, -1), point3f!(1, 1, -1), point3f!(1, 1, 1), point3f!(1, -1, 1)],
    ];
    for q in quads.iter() {
        meshes.push(TriangleMesh::quad(q[0], q[1], q[2], q[3], boundary));
    }

    let camera = PerspectiveCamera::new(
        point3f!(0, 0, 4),
        point3f!(0, 0, 0),
        vec3f!(0, 1, 0),
        40.0,
        12,
        12,
    );
    let light = LightSource::Point(PointLight::new(point3f!(0, 0, 0), Spectrum::uniform(20.0)));
    Scene::build(camera, meshes, texs, mats, volumes, vec![light]).unwrap()
}

fn ctx_for(scene: Scene, film: Arc<Film>, seed: u64) -> WorkerContext {
    WorkerContext {
        scene: Arc::new(scene),
        film,
        params: RenderParams {
            sampler_type: SamplerType::Random,
            max_path_depth: 6,
            max_eye_depth: 6,
            max_light_depth: 6,
            seed,
            ..Default::default()
        },
        thread_index: 0,
        interrupt: Arc::new(AtomicBool::new(false)),
        counters: Arc::new(EngineCounters::default()),
        metropolis_shared: Arc::new(MetropolisSharedState::new()),
    }
}

fn center_mean(film: &Film) -> Float {
    let mut sum = 0.0;
    let mut n = 0;
    for y in 4..8 {
        for x in 4..8 {
            sum += film.pixel_rgb(x, y)[1];
            n += 1;
        }
    }
    sum / n as Float
}

/// The fog glows around the embedded light in both engines, and the two
/// estimates of the same transport agree within Monte-Carlo tolerance.
#[test]
fn path_and_bidir_agree_on_fog_box() {
    let samples = 12 * 12 * 300;

    let film_path = Arc::new(Film::new(12, 12, Filter::default_box()));
    let ctx = ctx_for(fog_box_scene(), film_path.clone(), 11);
    path::render_samples(&ctx, samples);

    let film_bidir = Arc::new(Film::new(12, 12, Filter::default_box()));
    let ctx = ctx_for(fog_box_scene(), film_bidir.clone(), 23);
    bidir::render_samples(&ctx, samples);

    let mean_path = center_mean(&film_path);
    let mean_bidir = center_mean(&film_bidir);

    assert!(mean_path > 0.0, "path tracing lost the in-fog light");
    assert!(mean_bidir > 0.0, "bidir lost the in-fog light");
    let diff = (mean_path - mean_bidir).abs() / mean_path.max(mean_bidir);
    assert!(
        diff < 0.25,
        "engines disagree: path = {}, bidir = {}",
        mean_path,
        mean_bidir
    );
}

/// Nested dielectric boundaries: walking into a lower-priority interior
/// from a higher-priority medium must skip the inner boundary, so the
/// transmittance over the overlap equals the dominating volume alone.
#[test]
fn nested_volume_priority_transmittance() {
    use lucent::geometry::Ray;
    use lucent::volume::PathVolumeInfo;

    let mut texs = Textures::new();
    let ior = texs.add(Texture::ConstFloat(1.0));
    let thick = texs.add(Texture::ConstSpectrum(Spectrum::uniform(1.0)));
    let thin = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.1)));

    let mut volumes = Volumes::new();
    let outer = volumes.add(Volume::Clear(lucent::volume::ClearVolume {
        base: VolumeBase { ior, emission: None, priority: 10 },
        sigma_a: thick,
    }));
    let inner = volumes.add(Volume::Clear(lucent::volume::ClearVolume {
        base: VolumeBase { ior, emission: None, priority: 1 },
        sigma_a: thin,
    }));

    let mut mats = Materials::new();
    let mut outer_base = MaterialBase::default();
    outer_base.interior_volume = Some(outer);
    let outer_mat = mats.add(Material::Null(NullMaterial::new(outer_base)));
    let mut inner_base = MaterialBase::default();
    inner_base.interior_volume = Some(inner);
    let inner_mat = mats.add(Material::Null(NullMaterial::new(inner_base)));

    // outer slab boundary at z=0 (entering), inner boundary at z=1,
    // inner exit at z=2, outer exit at z=3
    let quad_at = |z: Float, flip: bool, m: usize| {
        if flip {
            TriangleMesh::quad(
                point3f!(-5, -5, z),
                point3f!(-5, 5, z),
                point3f!(5, 5, z),
                point3f!(5, -5, z),
                m,
            )
        } else {
            TriangleMesh::quad(
                point3f!(-5, -5, z),
                point3f!(5, -5, z),
                point3f!(5, 5, z),
                point3f!(-5, 5, z),
                m,
            )
        }
    };
    // emissive back wall so the scene has a light and the ray terminates
    let emit = texs.add(Texture::ConstSpectrum(Spectrum::WHITE));
    let kd = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.5)));
    let mut emit_base = MaterialBase::default();
    emit_base.emission = Some(emit);
    let wall =
        mats.add(Material::Matte(lucent::material::MatteMaterial::new(emit_base, kd)));

    let meshes = vec![
        quad_at(0.0, true, outer_mat),  // facing -z: entering at z=0
        quad_at(1.0, true, inner_mat),  // inner entry
        quad_at(2.0, false, inner_mat), // inner exit (facing +z)
        quad_at(3.0, false, outer_mat), // outer exit
        quad_at(4.0, true, wall),
    ];
    let camera = PerspectiveCamera::default_for_film(8, 8);
    let scene = Scene::build(camera, meshes, texs, mats, volumes, vec![]).unwrap();

    let mut vol_info = PathVolumeInfo::new();
    let mut ray = Ray::new(point3f!(0, 0, -1), vec3f!(0, 0, 1));
    let isect = scene.intersect(&scene, false, &mut vol_info, 0.5, &mut ray);

    assert!(isect.hit());
    let bsdf = isect.bsdf.unwrap();
    approx::assert_abs_diff_eq!(bsdf.p().z, 4.0, epsilon = 1e-4);

    // 3 units through the outer volume (sigma 1.0, z in [0, 3]): the
    // dominated inner volume must not substitute its thinner absorption
    // over the overlap
    let expected = (-3.0f32).exp();
    approx::assert_relative_eq!(isect.throughput.r(), expected, max_relative = 1e-3);
}
