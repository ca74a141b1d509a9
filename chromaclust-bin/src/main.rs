//! Extract dominant color palettes from images and group images by palette similarity.

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::pedantic,
    clippy::cargo,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::unwrap_in_result,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice,
    missing_docs,
    clippy::missing_docs_in_private_items,
    rustdoc::all,
    clippy::float_cmp_const,
    clippy::lossy_float_literal
)]
#![allow(
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::unreadable_literal
)]

mod cli;
mod output;
mod template;

use cli::{ClusterArgs, Command, ExtractArgs, KmeansArgs, Options};
use output::{FileSink, JsonStore, OutputTargets};

use std::{
    io::{self, BufWriter},
    num::NonZeroUsize,
    process::ExitCode,
    time::Instant,
};

use chromaclust::{ClusterOptions, ExtractOptions, Pipeline, PipelineOptions, RunSummary};
use anyhow::{bail, Context as _};
use clap::Parser;
use image::RgbaImage;
use log::{debug, info, warn};

/// Record the running time of an expression and log the elapsed time
macro_rules! time {
    ($name: expr, $func_call: expr) => {{
        let start = Instant::now();
        let result = $func_call;
        debug!("{} took {}ms", $name, start.elapsed().as_millis());
        result
    }};
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = Options::parse();

    let result = match options.command {
        Command::Extract(args) => extract(args),
        Command::Cluster(args) => cluster(args),
    };

    // Returning Result<_> uses Debug printing instead of Display
    if let Err(e) = result {
        eprintln!("{e:#}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// The pipeline options shared by both subcommands
fn pipeline_options(kmeans: &KmeansArgs, k: usize) -> PipelineOptions {
    let defaults = PipelineOptions::default();
    PipelineOptions {
        workers: kmeans.parallel.map_or(defaults.workers, NonZeroUsize::get),
        extract: ExtractOptions {
            k,
            weights: kmeans.weights(),
            kmeans: kmeans.kmeans(),
            empty_fill: kmeans.empty_fill,
            hue_mean: kmeans.hue_mean(),
        },
        ..defaults
    }
}

/// Warn about the images that were skipped
fn report(summary: &RunSummary) {
    info!(
        "{} palettes extracted, {} reused",
        summary.extracted, summary.reused
    );
    if !summary.failures.is_empty() {
        warn!("{} images were skipped", summary.failures.len());
    }
}

/// Extract and print the palette of each image
fn extract(args: ExtractArgs) -> anyhow::Result<()> {
    let targets = OutputTargets {
        png: args.out_png,
        png_block: args.out_png_height,
        txt: args.out_txt,
        preview: args.preview,
        ..OutputTargets::default()
    };
    targets.validate(false)?;

    let store = JsonStore {
        input: None,
        output: args.out_json,
        k: args.k,
        n: None,
    };
    store.validate()?;

    let pipeline = Pipeline::new(pipeline_options(&args.kmeans, args.k));
    let mut sink = FileSink::new(targets, args.k, None, BufWriter::new(io::stdout()));

    let summary = time!(
        "Palette extraction",
        pipeline.run(&args.images, &load_image, &store, &mut sink)
    )?;

    report(&summary);
    Ok(())
}

/// Extract the palette of each image, group the images, and print the clustering
fn cluster(args: ClusterArgs) -> anyhow::Result<()> {
    let targets = OutputTargets {
        png: args.out_png,
        png_block: args.out_cluster_png_height,
        cluster_png: args.out_cluster_png,
        cluster_png_block: args.out_cluster_png_height,
        summary_json: args.out_summary_json,
        shell: args.out_shell,
        ..OutputTargets::default()
    };
    targets.validate(true)?;

    let store = JsonStore {
        input: args.in_json,
        output: args.out_json,
        k: args.k,
        n: Some(args.n),
    };
    store.validate()?;

    let mut images = args.images;
    if let Some(pattern) = &args.glob {
        expand_glob(&mut images, pattern)?;
    }
    if images.is_empty() {
        bail!("no images to cluster");
    }

    let mut options = pipeline_options(&args.kmeans, args.k);
    options.cluster = Some(ClusterOptions {
        n: args.n,
        kmeans: args.kmeans.kmeans(),
        empty_fill: args.kmeans.empty_fill,
        hue_mean: args.kmeans.hue_mean(),
    });

    let pipeline = Pipeline::new(options);
    let mut sink = FileSink::new(targets, args.k, Some(args.n), BufWriter::new(io::stdout()));

    let summary = time!(
        "Clustering",
        pipeline.run(&images, &load_image, &store, &mut sink)
    )?;

    report(&summary);
    Ok(())
}

/// Append the paths matching a glob pattern, in the order the pattern yields them
fn expand_glob(images: &mut Vec<String>, pattern: &str) -> anyhow::Result<()> {
    let paths = glob::glob(pattern).with_context(|| format!("invalid glob {pattern}"))?;

    let before = images.len();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => images.push(path.to_string_lossy().into_owned()),
            Ok(path) => debug!("skipping {}, not a file", path.display()),
            Err(e) => warn!("skipping {}: {}", e.path().display(), e.error()),
        }
    }

    if images.len() == before {
        warn!("no paths matched glob {pattern}");
    } else {
        debug!("glob {pattern} matched {} files", images.len() - before);
    }
    Ok(())
}

/// Load the image at the given path
#[cfg(feature = "avif")]
fn load_image(path: &str) -> chromaclust::Result<RgbaImage> {
    let bytes = time!(format!("Reading {path}"), std::fs::read(path))?;
    let image = if std::path::Path::new(path)
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("avif"))
    {
        libavif_image::read(&bytes)
            .map_err(|e| chromaclust::Error::Source(e.to_string().into()))?
            .into_rgba8()
    } else {
        time!(format!("Decoding {path}"), chromaclust::decode(&bytes))?
    };
    debug!("{path} is {}x{}", image.width(), image.height());
    Ok(image)
}

/// Load the image at the given path
#[cfg(not(feature = "avif"))]
fn load_image(path: &str) -> chromaclust::Result<RgbaImage> {
    let bytes = time!(format!("Reading {path}"), std::fs::read(path))?;
    let image = time!(format!("Decoding {path}"), chromaclust::decode(&bytes))?;
    debug!("{path} is {}x{}", image.width(), image.height());
    Ok(image)
}
