use crate::camera::PerspectiveCamera;
use crate::engine::{EngineType, RenderParams, SamplerType};
use crate::film::{Film, Filter};
use crate::geometry::Transform;
use crate::light::{
    ConstantInfiniteLight, DistantLight, InfiniteLight, LightSource, MapPointLight, PointLight,
    ProjectionLight, SharpDistantLight, Sky2Light, SkyLight, SpotLight, SunLight,
};
use crate::material::{
    ArchGlassMaterial, CarPaintMaterial, ClothMaterial, GlassMaterial, Glossy2Material, Material,
    MaterialBase, Materials, MatteMaterial, MatteTranslucentMaterial, Metal2Material,
    MirrorMaterial, MixMaterial, NullMaterial, RoughGlassMaterial, VelvetMaterial,
};
use crate::material::cloth::{preset_default_repeats, ClothPreset};
use crate::material::carpaint::car_paint_preset;
use crate::scene::mesh::TriangleMesh;
use crate::scene::Scene;
use crate::texture::{
    get_image_map, BrickTexture, ImageMapTexture, Texture, TextureIndex, Textures, UvMapping,
};
use crate::volume::{
    ClearVolume, HeterogeneousVolume, HomogeneousVolume, Volume, VolumeBase, Volumes,
};
use crate::{Float, Point3f, Spectrum, Vec2f, Vec3f};
use anyhow::{anyhow, bail, Context};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Ordered key/value property store, the textual scene/config interface.
/// Values keep their raw string form; typed access goes through the
/// getters.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: HashMap<String, String>,
    order: Vec<String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut props = Self::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let eq = line
                .find('=')
                .ok_or_else(|| anyhow!("malformed property at line {}: {:?}", line_no + 1, line))?;
            let key = line[..eq].trim();
            let value = line[eq + 1..].trim();
            if key.is_empty() {
                bail!("empty property key at line {}", line_no + 1);
            }
            props.set(key, value);
        }
        Ok(props)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Unable to read properties file {:?}", path.as_ref()))?;
        Self::parse(&text)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        if !self.values.contains_key(key) {
            self.order.push(key.to_string());
        }
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    pub fn get_float(&self, key: &str, default: Float) -> Float {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }

    pub fn get_floats(&self, key: &str) -> Option<Vec<Float>> {
        self.get(key).map(|v| {
            v.split_whitespace()
                .filter_map(|t| t.parse().ok())
                .collect()
        })
    }

    pub fn get_vec3(&self, key: &str, default: Vec3f) -> Vec3f {
        match self.get_floats(key) {
            Some(v) if v.len() >= 3 => Vec3f::new(v[0], v[1], v[2]),
            _ => default,
        }
    }

    pub fn get_point(&self, key: &str, default: Point3f) -> Point3f {
        let v = self.get_vec3(key, Vec3f::new(default.x, default.y, default.z));
        Point3f::new(v.x, v.y, v.z)
    }

    pub fn get_spectrum(&self, key: &str, default: Spectrum) -> Spectrum {
        match self.get_floats(key) {
            Some(v) if v.len() >= 3 => Spectrum::new(v[0], v[1], v[2]),
            Some(v) if v.len() == 1 => Spectrum::uniform(v[0]),
            _ => default,
        }
    }

    /// Distinct middle names under `prefix.`, in first-seen order:
    /// `scene.textures.<name>....`
    pub fn sub_names(&self, prefix: &str) -> Vec<String> {
        let full_prefix = format!("{}.", prefix);
        let mut names = Vec::new();
        for key in &self.order {
            if let Some(rest) = key.strip_prefix(&full_prefix) {
                let name = rest.split('.').next().unwrap_or("");
                if !name.is_empty() && !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }
}

/// The render configuration: scene plus engine/film/sampler parameters,
/// all built from one property set.
pub struct RenderConfig {
    pub scene: Scene,
    pub film: Arc<Film>,
    pub params: RenderParams,
}

impl RenderConfig {
    pub fn from_properties(props: &Properties) -> anyhow::Result<Self> {
        let width = props.get_int("film.width", 640).max(1) as u32;
        let height = props.get_int("film.height", 480).max(1) as u32;

        let filter_name = props.get_string("film.filter.type", "BOX");
        let filter = Filter::from_name(&filter_name)
            .ok_or_else(|| anyhow!("unknown film filter type {:?}", filter_name))?;
        let film = Arc::new(Film::new(width, height, filter));

        let scene = build_scene(props, width, height)?;
        let params = build_params(props)?;

        Ok(Self { scene, film, params })
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let props = Properties::load(path)?;
        Self::from_properties(&props)
    }
}

fn build_params(props: &Properties) -> anyhow::Result<RenderParams> {
    let engine_name = props.get_string("renderengine.type", "PATHCPU");
    let engine_type = EngineType::from_name(&engine_name)
        .ok_or_else(|| anyhow!("unknown render engine type {:?}", engine_name))?;
    if engine_name != "PATHCPU"
        && engine_name != "LIGHTCPU"
        && engine_name != "BIDIRCPU"
        && engine_name != "BIDIRHYBRID"
    {
        warn!(
            requested = %engine_name,
            resolved = ?engine_type,
            "engine type resolved to its CPU equivalent"
        );
    }

    let sampler_name = props.get_string("sampler.type", "RANDOM");
    let sampler_type = SamplerType::from_name(&sampler_name)
        .ok_or_else(|| anyhow!("unknown sampler type {:?}", sampler_name))?;

    let max_depth = props.get_int("path.maxdepth", 6).max(1) as u32;
    let mut params = RenderParams {
        engine_type,
        sampler_type,
        max_path_depth: max_depth,
        max_eye_depth: props.get_int("light.maxdepth", max_depth as i64).max(1) as u32,
        max_light_depth: props.get_int("light.maxdepth", max_depth as i64).max(1) as u32,
        rr_depth: props.get_int("path.russianroulette.depth", 3).max(1) as u32,
        rr_cap: props.get_float("path.russianroulette.cap", 0.125),
        seed: props.get_int("renderengine.seed", 1).max(0) as u64,
        large_step_rate: props.get_float("sampler.largesteprate", 0.4),
        max_consecutive_reject: props.get_int("sampler.maxconsecutivereject", 512).max(1) as u32,
        image_mutation_rate: props.get_float("sampler.imagemutationrate", 0.1),
        ..Default::default()
    };
    params.max_eye_depth = params.max_eye_depth.max(params.max_path_depth);
    params.max_light_depth = params.max_light_depth.max(params.max_path_depth);

    if props.has("native.threads.count") {
        params.worker_count = props.get_int("native.threads.count", 1).max(1) as usize;
    }
    let halt_time = props.get_float("batch.halttime", 0.0);
    if halt_time > 0.0 {
        params.halt_time = Some(Duration::from_secs_f64(halt_time as f64));
    }
    let halt_spp = props.get_float("batch.haltspp", 0.0);
    if halt_spp > 0.0 {
        params.halt_spp = Some(halt_spp);
    }
    let halt_threshold = props.get_float("batch.haltthreshold", 0.0);
    if halt_threshold > 0.0 {
        params.halt_threshold = Some(halt_threshold);
    }
    Ok(params)
}

fn build_camera(props: &Properties, width: u32, height: u32) -> PerspectiveCamera {
    let lookat = props.get_floats("scene.camera.lookat").unwrap_or_default();
    let (position, target) = if lookat.len() >= 6 {
        (
            Point3f::new(lookat[0], lookat[1], lookat[2]),
            Point3f::new(lookat[3], lookat[4], lookat[5]),
        )
    } else {
        (Point3f::new(0.0, 0.0, -5.0), Point3f::new(0.0, 0.0, 0.0))
    };
    let up = props.get_vec3("scene.camera.up", Vec3f::new(0.0, 1.0, 0.0));
    let fov = props.get_float("scene.camera.fov", 45.0);

    let mut camera = PerspectiveCamera::new(position, target, up, fov, width, height);
    camera.lens_radius = props.get_float("scene.camera.lensradius", 0.0);
    camera.focal_distance = props.get_float("scene.camera.focaldistance", 10.0);
    camera.clip_hither = props.get_float("scene.camera.cliphither", 1e-3);
    camera.clip_yon = props.get_float("scene.camera.clipyon", 1e30);
    if let Some(window) = props.get_floats("scene.camera.screenwindow") {
        if window.len() >= 4 {
            camera.screen_window = [window[0], window[1], window[2], window[3]];
        }
    }
    camera.update();
    camera
}

struct SceneTables {
    textures: Textures,
    texture_names: HashMap<String, TextureIndex>,
}

impl SceneTables {
    /// Texture references are either a named texture or an inline
    /// constant value.
    fn texture_ref(&mut self, props: &Properties, key: &str, default: Spectrum) -> TextureIndex {
        match props.get(key) {
            Some(value) => {
                if let Some(&index) = self.texture_names.get(value.trim()) {
                    index
                } else {
                    let spectrum = props.get_spectrum(key, default);
                    self.textures.add(Texture::ConstSpectrum(spectrum))
                }
            }
            None => self.textures.add(Texture::ConstSpectrum(default)),
        }
    }

    fn float_ref(&mut self, props: &Properties, key: &str, default: Float) -> TextureIndex {
        match props.get(key) {
            Some(value) => {
                if let Some(&index) = self.texture_names.get(value.trim()) {
                    index
                } else {
                    self.textures
                        .add(Texture::ConstFloat(props.get_float(key, default)))
                }
            }
            None => self.textures.add(Texture::ConstFloat(default)),
        }
    }
}

fn uv_mapping(props: &Properties, prefix: &str) -> UvMapping {
    UvMapping {
        u_scale: props.get_float(&format!("{}.mapping.uvscale.u", prefix), 1.0),
        v_scale: props.get_float(&format!("{}.mapping.uvscale.v", prefix), 1.0),
        u_delta: props.get_float(&format!("{}.mapping.uvdelta.u", prefix), 0.0),
        v_delta: props.get_float(&format!("{}.mapping.uvdelta.v", prefix), 0.0),
    }
}

fn build_textures(props: &Properties, tables: &mut SceneTables) -> anyhow::Result<()> {
    for name in props.sub_names("scene.textures") {
        let prefix = format!("scene.textures.{}", name);
        let tex_type = props.get_string(&format!("{}.type", prefix), "constfloat1");

        let child = |tables: &mut SceneTables, key: &str, default: Spectrum| -> TextureIndex {
            tables.texture_ref(props, &format!("{}.{}", prefix, key), default)
        };

        let tex = match tex_type.as_str() {
            "constfloat1" => {
                Texture::ConstFloat(props.get_float(&format!("{}.value", prefix), 1.0))
            }
            "constfloat3" => Texture::ConstSpectrum(
                props.get_spectrum(&format!("{}.value", prefix), Spectrum::WHITE),
            ),
            "imagemap" => {
                let file = props
                    .get(&format!("{}.file", prefix))
                    .ok_or_else(|| anyhow!("imagemap texture {:?} is missing .file", name))?;
                let gamma = props.get_float(&format!("{}.gamma", prefix), 2.2);
                let gain = props.get_float(&format!("{}.gain", prefix), 1.0);
                Texture::ImageMap(ImageMapTexture {
                    image: get_image_map(file, gamma)?,
                    mapping: uv_mapping(props, &prefix),
                    gain,
                })
            }
            "scale" => Texture::Scale {
                tex1: child(tables, "texture1", Spectrum::WHITE),
                tex2: child(tables, "texture2", Spectrum::WHITE),
            },
            "mix" => Texture::Mix {
                amount: tables.float_ref(props, &format!("{}.amount", prefix), 0.5),
                tex1: child(tables, "texture1", Spectrum::BLACK),
                tex2: child(tables, "texture2", Spectrum::WHITE),
            },
            "add" => Texture::Add {
                tex1: child(tables, "texture1", Spectrum::BLACK),
                tex2: child(tables, "texture2", Spectrum::BLACK),
            },
            "band" => {
                let amount = tables.float_ref(props, &format!("{}.amount", prefix), 0.5);
                let mut offsets = Vec::new();
                let mut values = Vec::new();
                let mut i = 0;
                while props.has(&format!("{}.offset{}", prefix, i)) {
                    offsets.push(props.get_float(&format!("{}.offset{}", prefix, i), 0.0));
                    values.push(
                        props.get_spectrum(&format!("{}.value{}", prefix, i), Spectrum::BLACK),
                    );
                    i += 1;
                }
                if offsets.len() < 2 {
                    bail!("band texture {:?} needs at least two offsets", name);
                }
                Texture::Band { amount, offsets, values }
            }
            "checkerboard2d" => Texture::Checkerboard2D {
                tex1: child(tables, "texture1", Spectrum::WHITE),
                tex2: child(tables, "texture2", Spectrum::BLACK),
                mapping: uv_mapping(props, &prefix),
            },
            "checkerboard3d" => Texture::Checkerboard3D {
                tex1: child(tables, "texture1", Spectrum::WHITE),
                tex2: child(tables, "texture2", Spectrum::BLACK),
                mapping: Transform::IDENTITY,
            },
            "fbm" => Texture::Fbm {
                octaves: props.get_int(&format!("{}.octaves", prefix), 8) as i32,
                omega: props.get_float(&format!("{}.roughness", prefix), 0.5),
                mapping: Transform::IDENTITY,
            },
            "wrinkled" => Texture::Wrinkled {
                octaves: props.get_int(&format!("{}.octaves", prefix), 8) as i32,
                omega: props.get_float(&format!("{}.roughness", prefix), 0.5),
                mapping: Transform::IDENTITY,
            },
            "windy" => Texture::Windy { mapping: Transform::IDENTITY },
            "marble" => Texture::Marble {
                octaves: props.get_int(&format!("{}.octaves", prefix), 8) as i32,
                omega: props.get_float(&format!("{}.roughness", prefix), 0.5),
                scale: props.get_float(&format!("{}.scale", prefix), 1.0),
                variation: props.get_float(&format!("{}.variation", prefix), 0.2),
                mapping: Transform::IDENTITY,
            },
            "dots" => Texture::Dots {
                inside: child(tables, "inside", Spectrum::WHITE),
                outside: child(tables, "outside", Spectrum::BLACK),
                mapping: uv_mapping(props, &prefix),
            },
            "brick" => Texture::Brick(BrickTexture {
                tex1: child(tables, "bricktex", Spectrum::uniform(0.7)),
                tex2: child(tables, "brickmodtex", Spectrum::WHITE),
                mortar: child(tables, "mortartex", Spectrum::uniform(0.2)),
                brick_width: props.get_float(&format!("{}.brickwidth", prefix), 0.3),
                brick_height: props.get_float(&format!("{}.brickheight", prefix), 0.1),
                brick_depth: props.get_float(&format!("{}.brickdepth", prefix), 0.15),
                mortar_size: props.get_float(&format!("{}.mortarsize", prefix), 0.01),
                mapping: Transform::IDENTITY,
            }),
            "uv" => Texture::Uv { mapping: uv_mapping(props, &prefix) },
            "hitpointcolor" => Texture::HitPointColor,
            "hitpointalpha" => Texture::HitPointAlpha,
            "fresnelapproxn" => Texture::FresnelApproxN(child(tables, "texture", Spectrum::uniform(0.5))),
            "fresnelapproxk" => Texture::FresnelApproxK(child(tables, "texture", Spectrum::uniform(0.5))),
            "normalmap" => Texture::NormalMap {
                tex: child(tables, "texture", Spectrum::new(0.5, 0.5, 1.0)),
                scale: props.get_float(&format!("{}.scale", prefix), 1.0),
            },
            other => bail!("unknown texture type {:?} for {:?}", other, name),
        };

        let index = tables.textures.add(tex);
        tables.texture_names.insert(name, index);
    }
    Ok(())
}

fn build_volumes(
    props: &Properties,
    tables: &mut SceneTables,
    volume_names: &mut HashMap<String, usize>,
    volumes: &mut Volumes,
) -> anyhow::Result<()> {
    for name in props.sub_names("scene.volumes") {
        let prefix = format!("scene.volumes.{}", name);
        let vol_type = props.get_string(&format!("{}.type", prefix), "clear");

        let base = VolumeBase {
            ior: tables.float_ref(props, &format!("{}.ior", prefix), 1.0),
            emission: if props.has(&format!("{}.emission", prefix)) {
                Some(tables.texture_ref(props, &format!("{}.emission", prefix), Spectrum::BLACK))
            } else {
                None
            },
            priority: props.get_int(&format!("{}.priority", prefix), 0) as i32,
        };
        let sigma_a = tables.texture_ref(props, &format!("{}.absorption", prefix), Spectrum::BLACK);

        let volume = match vol_type.as_str() {
            "clear" => Volume::Clear(ClearVolume { base, sigma_a }),
            "homogeneous" => Volume::Homogeneous(HomogeneousVolume {
                base,
                sigma_a,
                sigma_s: tables.texture_ref(
                    props,
                    &format!("{}.scattering", prefix),
                    Spectrum::BLACK,
                ),
                g: tables.texture_ref(props, &format!("{}.asymmetry", prefix), Spectrum::BLACK),
                multi_scattering: props.get_bool(&format!("{}.multiscattering", prefix), false),
            }),
            "heterogeneous" => {
                let step_size = props.get_float(&format!("{}.steps.size", prefix), 0.1);
                let max_steps = props.get_int(&format!("{}.steps.maxcount", prefix), 1024);
                // refuse silently-degenerate marching setups
                if step_size <= 0.0 {
                    bail!("heterogeneous volume {:?} has a zero step size", name);
                }
                if max_steps <= 0 {
                    bail!("heterogeneous volume {:?} has a zero max step count", name);
                }
                Volume::Heterogeneous(HeterogeneousVolume {
                    base,
                    sigma_a,
                    sigma_s: tables.texture_ref(
                        props,
                        &format!("{}.scattering", prefix),
                        Spectrum::BLACK,
                    ),
                    g: tables.texture_ref(props, &format!("{}.asymmetry", prefix), Spectrum::BLACK),
                    multi_scattering: props.get_bool(&format!("{}.multiscattering", prefix), false),
                    step_size,
                    max_steps: max_steps as u32,
                })
            }
            other => bail!("unknown volume type {:?} for {:?}", other, name),
        };
        let index = volumes.add(volume);
        volume_names.insert(name, index);
    }
    Ok(())
}

fn material_base(
    props: &Properties,
    prefix: &str,
    tables: &mut SceneTables,
    volume_names: &HashMap<String, usize>,
    id: u32,
) -> MaterialBase {
    let mut base = MaterialBase {
        id,
        ..Default::default()
    };
    if props.has(&format!("{}.emission", prefix)) {
        base.emission =
            Some(tables.texture_ref(props, &format!("{}.emission", prefix), Spectrum::WHITE));
        base.emission_gain =
            props.get_spectrum(&format!("{}.emission.gain", prefix), Spectrum::WHITE);
        base.emitted_power = props.get_float(&format!("{}.emission.power", prefix), 0.0);
        base.emitted_samples = props.get_int(&format!("{}.emission.samples", prefix), -1) as i32;
    }
    if props.has(&format!("{}.bumptex", prefix)) {
        base.bump = Some(tables.float_ref(props, &format!("{}.bumptex", prefix), 0.0));
        base.bump_sample_distance =
            props.get_float(&format!("{}.bumpsamplingdistance", prefix), 0.001);
    }
    if props.has(&format!("{}.normaltex", prefix)) {
        base.normal_map = Some(tables.texture_ref(
            props,
            &format!("{}.normaltex", prefix),
            Spectrum::new(0.5, 0.5, 1.0),
        ));
    }
    base.interior_volume = props
        .get(&format!("{}.volume.interior", prefix))
        .and_then(|n| volume_names.get(n.trim()).copied());
    base.exterior_volume = props
        .get(&format!("{}.volume.exterior", prefix))
        .and_then(|n| volume_names.get(n.trim()).copied());
    base.visibility.diffuse =
        props.get_bool(&format!("{}.visibility.indirect.diffuse.enable", prefix), true);
    base.visibility.glossy =
        props.get_bool(&format!("{}.visibility.indirect.glossy.enable", prefix), true);
    base.visibility.specular =
        props.get_bool(&format!("{}.visibility.indirect.specular.enable", prefix), true);
    base
}

fn build_materials(
    props: &Properties,
    tables: &mut SceneTables,
    volume_names: &HashMap<String, usize>,
    materials: &mut Materials,
    material_names: &mut HashMap<String, usize>,
) -> anyhow::Result<()> {
    let names = props.sub_names("scene.materials");

    // two passes so mix materials can reference any sibling by name
    for (id, name) in names.iter().enumerate() {
        let prefix = format!("scene.materials.{}", name);
        let mat_type = props.get_string(&format!("{}.type", prefix), "matte");
        let base = material_base(props, &prefix, tables, volume_names, id as u32);

        let spectrum_ref = |tables: &mut SceneTables, key: &str, default: Spectrum| {
            tables.texture_ref(props, &format!("{}.{}", prefix, key), default)
        };
        let float_ref = |tables: &mut SceneTables, key: &str, default: Float| {
            tables.float_ref(props, &format!("{}.{}", prefix, key), default)
        };

        let material = match mat_type.as_str() {
            "matte" => Material::Matte(MatteMaterial::new(
                base,
                spectrum_ref(tables, "kd", Spectrum::uniform(0.75)),
            )),
            "mirror" => Material::Mirror(MirrorMaterial::new(
                base,
                spectrum_ref(tables, "kr", Spectrum::WHITE),
            )),
            "glass" => Material::Glass(GlassMaterial::new(
                base,
                spectrum_ref(tables, "kr", Spectrum::WHITE),
                spectrum_ref(tables, "kt", Spectrum::WHITE),
                float_ref(tables, "exteriorior", 1.0),
                float_ref(tables, "interiorior", 1.5),
            )),
            "archglass" => Material::ArchGlass(ArchGlassMaterial::new(
                base,
                spectrum_ref(tables, "kr", Spectrum::WHITE),
                spectrum_ref(tables, "kt", Spectrum::WHITE),
                float_ref(tables, "exteriorior", 1.0),
                float_ref(tables, "interiorior", 1.5),
            )),
            "roughglass" => Material::RoughGlass(RoughGlassMaterial::new(
                base,
                spectrum_ref(tables, "kr", Spectrum::WHITE),
                spectrum_ref(tables, "kt", Spectrum::WHITE),
                float_ref(tables, "exteriorior", 1.0),
                float_ref(tables, "interiorior", 1.5),
                float_ref(tables, "uroughness", 0.1),
                float_ref(tables, "vroughness", 0.1),
            )),
            "mattetranslucent" => Material::MatteTranslucent(MatteTranslucentMaterial::new(
                base,
                spectrum_ref(tables, "kr", Spectrum::uniform(0.5)),
                spectrum_ref(tables, "kt", Spectrum::uniform(0.5)),
            )),
            "glossy2" => Material::Glossy2(Glossy2Material::new(
                base,
                spectrum_ref(tables, "kd", Spectrum::uniform(0.5)),
                spectrum_ref(tables, "ks", Spectrum::uniform(0.05)),
                float_ref(tables, "uroughness", 0.1),
                float_ref(tables, "vroughness", 0.1),
                spectrum_ref(tables, "ka", Spectrum::BLACK),
                float_ref(tables, "d", 0.0),
                props.get_bool(&format!("{}.multibounce", prefix), false),
            )),
            "metal2" => Material::Metal2(Metal2Material::new(
                base,
                spectrum_ref(tables, "n", Spectrum::uniform(0.5)),
                spectrum_ref(tables, "k", Spectrum::uniform(0.5)),
                float_ref(tables, "uroughness", 0.1),
                float_ref(tables, "vroughness", 0.1),
            )),
            "velvet" => Material::Velvet(VelvetMaterial {
                base,
                kd: spectrum_ref(tables, "kd", Spectrum::uniform(0.5)),
                p1: float_ref(tables, "p1", -2.0),
                p2: float_ref(tables, "p2", 20.0),
                p3: float_ref(tables, "p3", 2.0),
                thickness: float_ref(tables, "thickness", 0.1),
            }),
            "cloth" => {
                let preset_name = props.get_string(&format!("{}.preset", prefix), "denim");
                let preset = ClothPreset::from_name(&preset_name)
                    .ok_or_else(|| anyhow!("unknown cloth preset {:?}", preset_name))?;
                let (ru, rv) = preset_default_repeats(preset);
                Material::Cloth(ClothMaterial::new(
                    base,
                    preset,
                    spectrum_ref(tables, "warp_kd", Spectrum::uniform(0.5)),
                    spectrum_ref(tables, "warp_ks", Spectrum::uniform(0.1)),
                    spectrum_ref(tables, "weft_kd", Spectrum::uniform(0.5)),
                    spectrum_ref(tables, "weft_ks", Spectrum::uniform(0.1)),
                    props.get_float(&format!("{}.repeat_u", prefix), ru),
                    props.get_float(&format!("{}.repeat_v", prefix), rv),
                ))
            }
            "carpaint" => {
                let preset =
                    car_paint_preset(&props.get_string(&format!("{}.preset", prefix), "ford f8"));
                let default = |v: Option<[Float; 3]>| v.map(Spectrum::from);
                let kd = default(preset.map(|p| p.kd)).unwrap_or(Spectrum::uniform(0.1));
                let ks1 = default(preset.map(|p| p.ks1)).unwrap_or(Spectrum::uniform(0.05));
                let ks2 = default(preset.map(|p| p.ks2)).unwrap_or(Spectrum::uniform(0.05));
                let ks3 = default(preset.map(|p| p.ks3)).unwrap_or(Spectrum::uniform(0.05));
                Material::CarPaint(CarPaintMaterial {
                    base,
                    kd: spectrum_ref(tables, "kd", kd),
                    ks1: spectrum_ref(tables, "ks1", ks1),
                    ks2: spectrum_ref(tables, "ks2", ks2),
                    ks3: spectrum_ref(tables, "ks3", ks3),
                    r1: float_ref(tables, "r1", preset.map(|p| p.r1).unwrap_or(0.9)),
                    r2: float_ref(tables, "r2", preset.map(|p| p.r2).unwrap_or(0.9)),
                    r3: float_ref(tables, "r3", preset.map(|p| p.r3).unwrap_or(0.9)),
                    m1: float_ref(tables, "m1", preset.map(|p| p.m1).unwrap_or(0.3)),
                    m2: float_ref(tables, "m2", preset.map(|p| p.m2).unwrap_or(0.15)),
                    m3: float_ref(tables, "m3", preset.map(|p| p.m3).unwrap_or(0.015)),
                    ka: spectrum_ref(tables, "ka", Spectrum::BLACK),
                    depth: float_ref(tables, "d", 0.0),
                })
            }
            "null" => Material::Null(NullMaterial::new(base)),
            // mix resolved in the second pass; reserve the slot
            "mix" => Material::Null(NullMaterial::new(base)),
            other => bail!("unknown material type {:?} for {:?}", other, name),
        };

        let index = materials.add(material);
        material_names.insert(name.clone(), index);
    }

    // second pass: resolve mix materials now that all names are known
    for name in &names {
        let prefix = format!("scene.materials.{}", name);
        if props.get_string(&format!("{}.type", prefix), "matte") != "mix" {
            continue;
        }
        let index = material_names[name];
        let base = material_base(props, &prefix, tables, volume_names, index as u32);

        let lookup = |key: &str| -> anyhow::Result<usize> {
            let child = props
                .get(&format!("{}.{}", prefix, key))
                .ok_or_else(|| anyhow!("mix material {:?} is missing .{}", name, key))?;
            material_names
                .get(child.trim())
                .copied()
                .ok_or_else(|| anyhow!("mix material {:?} references unknown {:?}", name, child))
        };
        let material_a = lookup("material1")?;
        let material_b = lookup("material2")?;
        let amount = tables.float_ref(props, &format!("{}.amount", prefix), 0.5);
        materials.replace(
            index,
            Material::Mix(MixMaterial::new(base, amount, material_a, material_b)),
        );
    }

    Ok(())
}

fn build_lights(props: &Properties) -> anyhow::Result<Vec<LightSource>> {
    let mut lights = Vec::new();
    for name in props.sub_names("scene.lights") {
        let prefix = format!("scene.lights.{}", name);
        let light_type = props.get_string(&format!("{}.type", prefix), "point");
        let gain = props.get_spectrum(&format!("{}.gain", prefix), Spectrum::WHITE);

        let light = match light_type.as_str() {
            "point" => LightSource::Point(PointLight::new(
                props.get_point(&format!("{}.position", prefix), Point3f::new(0.0, 0.0, 0.0)),
                gain * props.get_spectrum(&format!("{}.color", prefix), Spectrum::WHITE),
            )),
            "mappoint" => {
                let file = props
                    .get(&format!("{}.mapfile", prefix))
                    .ok_or_else(|| anyhow!("mappoint light {:?} is missing .mapfile", name))?;
                LightSource::MapPoint(MapPointLight {
                    position: props
                        .get_point(&format!("{}.position", prefix), Point3f::new(0.0, 0.0, 0.0)),
                    emitted: gain
                        * props.get_spectrum(&format!("{}.color", prefix), Spectrum::WHITE),
                    map: get_image_map(file, 1.0)?,
                    light_to_world: Transform::IDENTITY,
                })
            }
            "spot" => LightSource::Spot(SpotLight::new(
                props.get_point(&format!("{}.position", prefix), Point3f::new(0.0, 0.0, 1.0)),
                props.get_point(&format!("{}.target", prefix), Point3f::new(0.0, 0.0, 0.0)),
                gain * props.get_spectrum(&format!("{}.color", prefix), Spectrum::WHITE),
                props.get_float(&format!("{}.coneangle", prefix), 30.0),
                props.get_float(&format!("{}.conedeltaangle", prefix), 5.0),
            )),
            "projection" => {
                let file = props
                    .get(&format!("{}.mapfile", prefix))
                    .ok_or_else(|| anyhow!("projection light {:?} is missing .mapfile", name))?;
                let position =
                    props.get_point(&format!("{}.position", prefix), Point3f::new(0.0, 0.0, 1.0));
                let target =
                    props.get_point(&format!("{}.target", prefix), Point3f::new(0.0, 0.0, 0.0));
                LightSource::Projection(ProjectionLight::new(
                    position,
                    gain * props.get_spectrum(&format!("{}.color", prefix), Spectrum::WHITE),
                    get_image_map(file, 2.2)?,
                    Transform::camera_look_at(position, target, Vec3f::new(0.0, 1.0, 0.0)).inverse(),
                    props.get_float(&format!("{}.fov", prefix), 45.0),
                ))
            }
            "distant" => LightSource::Distant(DistantLight::new(
                props.get_vec3(&format!("{}.direction", prefix), Vec3f::new(0.0, 0.0, -1.0)),
                gain * props.get_spectrum(&format!("{}.color", prefix), Spectrum::WHITE),
                props.get_float(&format!("{}.theta", prefix), 2.0),
            )),
            "sharpdistant" => LightSource::SharpDistant(SharpDistantLight::new(
                props.get_vec3(&format!("{}.direction", prefix), Vec3f::new(0.0, 0.0, -1.0)),
                gain * props.get_spectrum(&format!("{}.color", prefix), Spectrum::WHITE),
            )),
            "infinite" => {
                let file = props
                    .get(&format!("{}.file", prefix))
                    .ok_or_else(|| anyhow!("infinite light {:?} is missing .file", name))?;
                LightSource::Infinite(InfiniteLight::new(
                    get_image_map(file, props.get_float(&format!("{}.gamma", prefix), 1.0))?,
                    gain,
                    props.get_float(&format!("{}.shift.u", prefix), 0.0),
                    props.get_float(&format!("{}.shift.v", prefix), 0.0),
                ))
            }
            "constantinfinite" => LightSource::ConstantInfinite(ConstantInfiniteLight::new(
                props.get_spectrum(&format!("{}.color", prefix), Spectrum::WHITE),
                gain,
            )),
            "sky" => LightSource::Sky(SkyLight::new(
                props.get_vec3(&format!("{}.dir", prefix), Vec3f::new(0.0, 0.0, 1.0)),
                props.get_float(&format!("{}.turbidity", prefix), 2.2),
                gain,
            )),
            "sky2" => LightSource::Sky2(Sky2Light::new(
                props.get_vec3(&format!("{}.dir", prefix), Vec3f::new(0.0, 0.0, 1.0)),
                props.get_float(&format!("{}.turbidity", prefix), 2.2),
                gain,
                props.get_spectrum(&format!("{}.groundalbedo", prefix), Spectrum::BLACK),
            )),
            "sun" => LightSource::Sun(SunLight::new(
                props.get_vec3(&format!("{}.dir", prefix), Vec3f::new(0.0, 0.0, 1.0)),
                props.get_float(&format!("{}.turbidity", prefix), 2.2),
                props.get_float(&format!("{}.relsize", prefix), 1.0),
                gain,
            )),
            "triangle" => continue, // area lights come from emissive meshes
            other => bail!("unknown light type {:?} for {:?}", other, name),
        };
        lights.push(light);
    }
    Ok(lights)
}

fn object_transform(props: &Properties, prefix: &str) -> Transform {
    match props.get_floats(&format!("{}.transformation", prefix)) {
        Some(m) if m.len() >= 16 => {
            // column-major 4x4
            Transform::from_mat(cgmath::Matrix4::new(
                m[0], m[1], m[2], m[3],
                m[4], m[5], m[6], m[7],
                m[8], m[9], m[10], m[11],
                m[12], m[13], m[14], m[15],
            ))
        }
        _ => Transform::IDENTITY,
    }
}

fn build_objects(
    props: &Properties,
    material_names: &HashMap<String, usize>,
) -> anyhow::Result<Vec<TriangleMesh>> {
    let mut meshes = Vec::new();
    for name in props.sub_names("scene.objects") {
        let prefix = format!("scene.objects.{}", name);
        let material_name = props
            .get(&format!("{}.material", prefix))
            .ok_or_else(|| anyhow!("object {:?} is missing .material", name))?;
        let material = *material_names
            .get(material_name.trim())
            .ok_or_else(|| anyhow!("object {:?} references unknown material {:?}", name, material_name))?;

        let mut mesh = if let Some(file) = props.get(&format!("{}.ply", prefix)) {
            load_mesh_file(file, material)?
        } else {
            let vertices = props
                .get_floats(&format!("{}.vertices", prefix))
                .ok_or_else(|| anyhow!("object {:?} has neither .ply nor .vertices", name))?;
            let faces = props
                .get_floats(&format!("{}.faces", prefix))
                .ok_or_else(|| anyhow!("object {:?} is missing .faces", name))?;
            if vertices.len() % 3 != 0 || faces.len() % 3 != 0 {
                bail!("object {:?} has malformed vertex/face data", name);
            }
            let points: Vec<Point3f> = vertices
                .chunks(3)
                .map(|c| Point3f::new(c[0], c[1], c[2]))
                .collect();
            let tris: Vec<[u32; 3]> = faces
                .chunks(3)
                .map(|c| [c[0] as u32, c[1] as u32, c[2] as u32])
                .collect();
            for tri in &tris {
                for &i in tri {
                    if i as usize >= points.len() {
                        bail!("object {:?} face index {} out of range", name, i);
                    }
                }
            }
            TriangleMesh::new(points, tris, material)
        };

        mesh.apply_transform(&object_transform(props, &prefix));
        meshes.push(mesh);
    }
    Ok(meshes)
}

/// Loads an external mesh (Wavefront OBJ) as one triangle mesh.
fn load_mesh_file(file: &str, material: usize) -> anyhow::Result<TriangleMesh> {
    let (models, _) = tobj::load_obj(Path::new(file))
        .map_err(|e| anyhow!("Unable to load mesh {:?}: {:?}", file, e))?;
    let mut vertices = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    let mut triangles = Vec::new();

    for model in models {
        let mesh = model.mesh;
        let base = vertices.len() as u32;
        for v in mesh.positions.chunks(3) {
            vertices.push(Point3f::new(v[0], v[1], v[2]));
        }
        for n in mesh.normals.chunks(3) {
            normals.push(crate::Normal3::new(n[0], n[1], n[2]));
        }
        for t in mesh.texcoords.chunks(2) {
            uvs.push(Vec2f::new(t[0], t[1]));
        }
        for idx in mesh.indices.chunks(3) {
            triangles.push([base + idx[0], base + idx[1], base + idx[2]]);
        }
    }

    let mut result = TriangleMesh::new(vertices, triangles, material);
    if !normals.is_empty() && normals.len() == result.vertices.len() {
        result.normals = Some(normals);
    }
    if !uvs.is_empty() && uvs.len() == result.vertices.len() {
        result.uvs = Some(uvs);
    }
    Ok(result)
}

fn build_scene(props: &Properties, width: u32, height: u32) -> anyhow::Result<Scene> {
    let camera = build_camera(props, width, height);

    let mut tables = SceneTables {
        textures: Textures::new(),
        texture_names: HashMap::new(),
    };
    build_textures(props, &mut tables)?;

    let mut volumes = Volumes::new();
    let mut volume_names = HashMap::new();
    build_volumes(props, &mut tables, &mut volume_names, &mut volumes)?;

    let mut materials = Materials::new();
    let mut material_names = HashMap::new();
    build_materials(props, &mut tables, &volume_names, &mut materials, &mut material_names)?;

    let lights = build_lights(props)?;
    let meshes = build_objects(props, &material_names)?;

    info!(
        textures = tables.textures.len(),
        materials = materials.len(),
        volumes = volumes.len(),
        meshes = meshes.len(),
        lights = lights.len(),
        "scene tables built"
    );

    let mut scene = Scene::build(camera, meshes, tables.textures, materials, volumes, lights)?;

    scene.epsilon = props.get_float("scene.epsilon", scene.epsilon);
    scene.default_interior_volume = props
        .get("scene.world.volume.defaultinterior")
        .and_then(|n| volume_names.get(n.trim()).copied());
    scene.default_exterior_volume = props
        .get("scene.world.volume.defaultexterior")
        .and_then(|n| volume_names.get(n.trim()).copied());

    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_SCENE: &str = r#"
# a floor, one light, a camera
scene.camera.lookat = 0.0 0.0 4.0 0.0 0.0 0.0
scene.camera.fov = 60.0
scene.materials.white.type = matte
scene.materials.white.kd = 0.75 0.75 0.75
scene.objects.floor.material = white
scene.objects.floor.vertices = -5.0 -5.0 0.0 5.0 -5.0 0.0 5.0 5.0 0.0 -5.0 5.0 0.0
scene.objects.floor.faces = 0 1 2 0 2 3
scene.lights.lamp.type = point
scene.lights.lamp.position = 0.0 0.0 3.0
scene.lights.lamp.gain = 10.0 10.0 10.0
film.width = 32
film.height = 32
renderengine.type = PATHCPU
sampler.type = RANDOM
"#;

    #[test]
    fn test_parse_minimal_scene() {
        let props = Properties::parse(MINIMAL_SCENE).unwrap();
        assert_eq!(props.get_int("film.width", 0), 32);
        assert_eq!(props.sub_names("scene.objects"), vec!["floor"]);
        let config = RenderConfig::from_properties(&props).unwrap();
        assert_eq!(config.scene.meshes.len(), 1);
        assert_eq!(config.scene.light_defs.len(), 1);
        assert_eq!(config.params.engine_type, EngineType::PathCpu);
    }

    #[test]
    fn test_properties_round_trip_types() {
        let props = Properties::parse(
            "a.float = 1.5\na.int = 42\na.bool = 1\na.vec = 1.0 2.0 3.0\n",
        )
        .unwrap();
        assert_eq!(props.get_float("a.float", 0.0), 1.5);
        assert_eq!(props.get_int("a.int", 0), 42);
        assert!(props.get_bool("a.bool", false));
        assert_eq!(props.get_vec3("a.vec", Vec3f::new(0.0, 0.0, 0.0)).y, 2.0);
    }

    #[test]
    fn test_malformed_property_rejected() {
        assert!(Properties::parse("no equals sign here").is_err());
    }

    #[test]
    fn test_unknown_engine_rejected() {
        let mut props = Properties::parse(MINIMAL_SCENE).unwrap();
        props.set("renderengine.type", "MAGIC");
        assert!(RenderConfig::from_properties(&props).is_err());
    }

    #[test]
    fn test_undefined_material_reference_rejected() {
        let mut props = Properties::parse(MINIMAL_SCENE).unwrap();
        props.set("scene.objects.floor.material", "missing");
        assert!(RenderConfig::from_properties(&props).is_err());
    }

    #[test]
    fn test_zero_step_size_rejected() {
        let mut props = Properties::parse(MINIMAL_SCENE).unwrap();
        props.set("scene.volumes.fog.type", "heterogeneous");
        props.set("scene.volumes.fog.steps.size", "0.0");
        assert!(RenderConfig::from_properties(&props).is_err());
    }

    #[test]
    fn test_mix_material_by_name() {
        let mut props = Properties::parse(MINIMAL_SCENE).unwrap();
        props.set("scene.materials.shiny.type", "mirror");
        props.set("scene.materials.blend.type", "mix");
        props.set("scene.materials.blend.material1", "white");
        props.set("scene.materials.blend.material2", "shiny");
        props.set("scene.materials.blend.amount", "0.3");
        props.set("scene.objects.floor.material", "blend");
        let config = RenderConfig::from_properties(&props).unwrap();
        let mesh_mat = config.scene.meshes[0].material;
        assert!(matches!(
            config.scene.materials.get(mesh_mat),
            Material::Mix(_)
        ));
    }
}
