use clap::{App, Arg};
use indicatif::{ProgressBar, ProgressStyle};
use lucent::config::RenderConfig;
use lucent::engine::RenderEngine;
use std::time::Duration;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let matches = App::new("lucent")
        .about("Physically-based light transport renderer")
        .arg(
            Arg::with_name("config")
                .help("Render configuration properties file")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .default_value("render.png"),
        )
        .arg(
            Arg::with_name("threads")
                .short("t")
                .long("threads")
                .takes_value(true),
        )
        .get_matches();

    let config_path = matches.value_of("config").unwrap();
    let output_path = matches.value_of("output").unwrap().to_string();

    let config = match RenderConfig::load(config_path) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("configuration error: {:#}", err);
            std::process::exit(1);
        }
    };

    let mut params = config.params;
    if let Some(threads) = matches.value_of("threads").and_then(|t| t.parse().ok()) {
        params.worker_count = threads;
    }
    // default halt so a bare run terminates
    if params.halt_time.is_none() && params.halt_spp.is_none() && params.halt_threshold.is_none() {
        params.halt_spp = Some(64.0);
    }

    let film = config.film.clone();
    let mut engine = RenderEngine::new(config.scene, film.clone(), params);
    engine.start();

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner().template("{spinner} {msg} [{elapsed_precise}]"),
    );

    let stats = loop {
        std::thread::sleep(Duration::from_millis(500));
        let stats = engine.statistics();
        progress.set_message(&format!(
            "{:.1} samples/sec | {:.1}M rays/sec | {:.1} spp",
            stats.samples_per_second,
            stats.rays_per_second / 1e6,
            stats.samples_per_pixel,
        ));
        progress.tick();

        let done_time = params
            .halt_time
            .map(|t| stats.elapsed >= t)
            .unwrap_or(false);
        let done_spp = params
            .halt_spp
            .map(|s| stats.samples_per_pixel >= s)
            .unwrap_or(false);
        let done_convergence = params
            .halt_threshold
            .map(|t| film.convergence(t) >= 1.0)
            .unwrap_or(false);
        if done_time || done_spp || done_convergence {
            engine.stop();
            break stats;
        }
    };
    progress.finish_and_clear();

    println!(
        "rendered {} samples in {:.1}s ({:.1} spp)",
        stats.total_samples,
        stats.elapsed.as_secs_f64(),
        stats.samples_per_pixel,
    );

    // tone-map to 8-bit with a simple gamma for preview output
    let hdr = film.to_image_buffer();
    let (w, h) = hdr.dimensions();
    let mut out = image::ImageBuffer::new(w, h);
    for (x, y, pixel) in hdr.enumerate_pixels() {
        let to_u8 = |v: f32| (v.max(0.0).powf(1.0 / 2.2).min(1.0) * 255.0) as u8;
        out.put_pixel(
            x,
            y,
            image::Rgb([to_u8(pixel[0]), to_u8(pixel[1]), to_u8(pixel[2])]),
        );
    }
    if let Err(err) = out.save(&output_path) {
        eprintln!("failed to save {}: {}", output_path, err);
        std::process::exit(1);
    }
    println!("wrote {}", output_path);
}
