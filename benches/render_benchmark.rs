use criterion::{criterion_group, criterion_main, Criterion};
use lucent::camera::PerspectiveCamera;
use lucent::engine::{bidir, path, EngineCounters, RenderParams, SamplerType, WorkerContext};
use lucent::film::{Film, Filter};
use lucent::material::{Material, MaterialBase, Materials, MatteMaterial, MirrorMaterial};
use lucent::sampler::MetropolisSharedState;
use lucent::scene::mesh::TriangleMesh;
use lucent::scene::Scene;
use lucent::texture::{Texture, Textures};
use lucent::volume::Volumes;
use lucent::{point3f, vec3f, Spectrum};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn bench_scene() -> Scene {
    let mut texs = Textures::new();
    let kd = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.7)));
    let emit = texs.add(Texture::ConstSpectrum(Spectrum::uniform(10.0)));
    let mirror_kr = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.9)));

    let mut mats = Materials::new();
    let matte = mats.add(Material::Matte(MatteMaterial::new(MaterialBase::default(), kd)));
    let mirror = mats.add(Material::Mirror(MirrorMaterial::new(
        MaterialBase::default(),
        mirror_kr,
    )));
    let mut emit_base = MaterialBase::default();
    emit_base.emission = Some(emit);
    let light_mat = mats.add(Material::Matte(MatteMaterial::new(emit_base, kd)));

    let mut meshes = vec![
        TriangleMesh::quad(
            point3f!(-4, -4, 0),
            point3f!(4, -4, 0),
            point3f!(4, 4, 0),
            point3f!(-4, 4, 0),
            matte,
        ),
        TriangleMesh::quad(
            point3f!(-1, -1, 6),
            point3f!(-1, 1, 6),
            point3f!(1, 1, 6),
            point3f!(1, -1, 6),
            light_mat,
        ),
        // mirror back wall for a specular transport component
        TriangleMesh::quad(
            point3f!(-4, -4, 0),
            point3f!(-4, 4, 0),
            point3f!(-4, 4, 6),
            point3f!(-4, -4, 6),
            mirror,
        ),
    ];
    // a small grid of diffuse boxes to give the accelerator real work
    for i in 0..4 {
        for j in 0..4 {
            let x = i as f32 - 2.0;
            let y = j as f32 - 2.0;
            meshes.push(TriangleMesh::quad(
                point3f!(x, y, 1),
                point3f!(x + 0.5, y, 1),
                point3f!(x + 0.5, y + 0.5, 1),
                point3f!(x, y + 0.5, 1),
                matte,
            ));
        }
    }

    let camera = PerspectiveCamera::new(
        point3f!(0, -6, 3),
        point3f!(0, 0, 1.5),
        vec3f!(0, 0, 1),
        55.0,
        64,
        64,
    );
    Scene::build(camera, meshes, texs, mats, Volumes::new(), vec![]).unwrap()
}

fn make_ctx(scene: Scene) -> WorkerContext {
    WorkerContext {
        scene: Arc::new(scene),
        film: Arc::new(Film::new(64, 64, Filter::default_box())),
        params: RenderParams {
            sampler_type: SamplerType::Random,
            max_path_depth: 5,
            max_eye_depth: 5,
            max_light_depth: 5,
            seed: 99,
            ..Default::default()
        },
        thread_index: 0,
        interrupt: Arc::new(AtomicBool::new(false)),
        counters: Arc::new(EngineCounters::default()),
        metropolis_shared: Arc::new(MetropolisSharedState::new()),
    }
}

fn bench_path_samples(c: &mut Criterion) {
    let ctx = make_ctx(bench_scene());
    c.bench_function("path_1k_samples", |b| {
        b.iter(|| path::render_samples(&ctx, 1000))
    });
}

fn bench_bidir_samples(c: &mut Criterion) {
    let ctx = make_ctx(bench_scene());
    c.bench_function("bidir_1k_samples", |b| {
        b.iter(|| bidir::render_samples(&ctx, 1000))
    });
}

criterion_group!(benches, bench_path_samples, bench_bidir_samples);
criterion_main!(benches);
