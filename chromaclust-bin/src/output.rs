//! Writing palettes, swatches, and cluster summaries to files and stdout,
//! and reading previously written palettes back

use crate::template::{Context, Field, Template};
use anyhow::{bail, Context as _};
use chromaclust::{rgb, swatch, ClusterReport, Palette, PaletteSink, PaletteStore};
use colored::Colorize;
use image::ImageFormat;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    process::Command,
};

/// A palette file, also printed as one line per image by `extract`
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteJson {
    /// Image path
    pub path: String,
    /// Hex colors
    pub palette: Vec<String>,
}

impl PaletteJson {
    /// The JSON form of an image's palette
    fn new(path: &str, palette: &Palette) -> Self {
        Self {
            path: path.to_owned(),
            palette: palette.to_hex(),
        }
    }
}

/// The clustering result, printed by `cluster`
#[derive(Debug, Serialize)]
struct SummaryJson<'a> {
    /// Hex colors of each centroid
    centroids: Vec<Vec<String>>,
    /// Image path -> label
    mapping: BTreeMap<&'a str, usize>,
}

/// Which files to write and how to name them
#[derive(Debug, Clone)]
pub struct OutputTargets {
    /// Swatch of each image's palette
    pub png: Option<Template>,
    /// Size of each color block in `png`
    pub png_block: u32,
    /// Hex colors of each image's palette, one per line
    pub txt: Option<Template>,
    /// Swatch of each cluster centroid
    pub cluster_png: Option<Template>,
    /// Size of each color block in `cluster_png`
    pub cluster_png_block: u32,
    /// JSON of the whole clustering
    pub summary_json: Option<Template>,
    /// Shell command to run for each image after clustering
    pub shell: Option<Template>,
    /// Print a swatch of each palette to stderr
    pub preview: bool,
}

impl Default for OutputTargets {
    fn default() -> Self {
        Self {
            png: None,
            png_block: 100,
            txt: None,
            cluster_png: None,
            cluster_png_block: 100,
            summary_json: None,
            shell: None,
            preview: false,
        }
    }
}

impl OutputTargets {
    /// Ensure every template only uses fields that will have a value
    pub fn validate(&self, clustering: bool) -> anyhow::Result<()> {
        let per_image = |field: Field| clustering || !matches!(field, Field::N | Field::Label);
        let per_cluster = |field: Field| !field.needs_path();
        let summary = |field: Field| !field.needs_path() && field != Field::Label;

        let checks: [(&str, &Option<Template>, &dyn Fn(Field) -> bool); 5] = [
            ("image PNG", &self.png, &per_image),
            ("text", &self.txt, &per_image),
            ("shell", &self.shell, &per_image),
            ("cluster PNG", &self.cluster_png, &per_cluster),
            ("summary JSON", &self.summary_json, &summary),
        ];

        for (name, template, available) in checks {
            if let Some(template) = template {
                template
                    .check(available)
                    .with_context(|| format!("invalid {name} template \"{template}\""))?;
            }
        }

        Ok(())
    }
}

/// Log an output error and carry on
fn log_failure(result: anyhow::Result<()>) {
    if let Err(e) = result {
        error!("{e:#}");
    }
}

/// Write a palette swatch as a PNG
fn write_png(template: &Template, context: &Context, palette: &Palette, block: u32) -> anyhow::Result<()> {
    let path = template.render(context)?;
    info!("writing {path}");
    swatch::render(palette, block)
        .save_with_format(&path, ImageFormat::Png)
        .with_context(|| format!("failed to write {path}"))
}

/// Write each hex color on its own line
fn write_txt(template: &Template, context: &Context, palette: &Palette) -> anyhow::Result<()> {
    let path = template.render(context)?;
    info!("writing {path}");
    let mut text = String::new();
    for hex in palette.to_hex() {
        text.push_str(&hex);
        text.push('\n');
    }
    std::fs::write(&path, text).with_context(|| format!("failed to write {path}"))
}

/// Serialize a value to a JSON file
fn write_json(template: &Template, context: &Context, value: &impl Serialize) -> anyhow::Result<()> {
    let path = template.render(context)?;
    info!("writing {path}");
    let file = File::create(&path).with_context(|| format!("failed to create {path}"))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).with_context(|| format!("failed to write {path}"))?;
    writer.flush().with_context(|| format!("failed to write {path}"))
}

/// Run a command through `$SHELL -c` (or `sh -c` if `$SHELL` is not set)
fn run_shell(template: &Template, context: &Context) -> anyhow::Result<()> {
    let command = template.render(context)?;
    let shell = std::env::var_os("SHELL").unwrap_or_else(|| "sh".into());

    info!("running {command}");
    let status = Command::new(&shell)
        .arg("-c")
        .arg(&command)
        .status()
        .with_context(|| format!("failed to run {}", shell.to_string_lossy()))?;

    if !status.success() {
        bail!("`{command}` failed with {status}");
    }
    Ok(())
}

/// Print a true color swatch of the palette to stderr
fn preview(path: &str, palette: &Palette) {
    let swatch = palette
        .iter()
        .map(|color| "   ".on_truecolor(color.red, color.green, color.blue).to_string())
        .collect::<String>();

    eprintln!("{swatch} {path}");
}

/// Writes every output for a run
///
/// Without clustering, each palette is written as soon as it arrives
/// and printed to `out` as a JSON line.
/// With clustering, the outputs are written once the labels are known
/// and the clustering is printed to `out` as a single JSON object.
pub struct FileSink<W> {
    /// What to write
    targets: OutputTargets,
    /// Palette size
    k: usize,
    /// Number of image clusters, if clustering
    n: Option<usize>,
    /// Where to print results
    out: W,
}

impl<W: Write + Send> FileSink<W> {
    /// Create a sink printing results to `out`
    pub fn new(targets: OutputTargets, k: usize, n: Option<usize>, out: W) -> Self {
        Self { targets, k, n, out }
    }

    /// The template context for an image or cluster
    fn context<'a>(&self, path: Option<&'a str>, label: Option<usize>) -> Context<'a> {
        Context {
            path,
            k: self.k,
            n: self.n,
            label,
        }
    }

    /// Take back the output stream
    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> PaletteSink for FileSink<W> {
    fn palette(&mut self, id: &str, palette: &Palette) -> io::Result<()> {
        if self.targets.preview {
            preview(id, palette);
        }

        if self.n.is_some() {
            return Ok(());
        }

        let context = self.context(Some(id), None);

        if let Some(template) = &self.targets.png {
            log_failure(write_png(template, &context, palette, self.targets.png_block));
        }
        if let Some(template) = &self.targets.txt {
            log_failure(write_txt(template, &context, palette));
        }

        serde_json::to_writer(&mut self.out, &PaletteJson::new(id, palette))?;
        writeln!(self.out)
    }

    fn clusters(&mut self, report: &ClusterReport) -> io::Result<()> {
        if self.n.is_none() {
            return Ok(());
        }
        let targets = &self.targets;

        if let Some(template) = &targets.cluster_png {
            for (label, centroid) in report.centroids.iter().enumerate() {
                let context = self.context(None, Some(label));
                log_failure(write_png(template, &context, centroid, targets.cluster_png_block));
            }
        }

        if let Some(template) = &targets.png {
            for image in &report.images {
                let context = self.context(Some(&image.id), Some(image.label));
                log_failure(write_png(template, &context, &image.palette, targets.png_block));
            }
        }

        if let Some(template) = &targets.shell {
            for image in &report.images {
                let context = self.context(Some(&image.id), Some(image.label));
                log_failure(run_shell(template, &context));
            }
        }

        let summary = SummaryJson {
            centroids: report.centroids.iter().map(Palette::to_hex).collect(),
            mapping: report.mapping(),
        };

        if let Some(template) = &targets.summary_json {
            let context = self.context(None, None);
            log_failure(write_json(template, &context, &summary));
        }

        serde_json::to_writer(&mut self.out, &summary)?;
        writeln!(self.out)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Reads and writes palette JSON files next to the images
#[derive(Debug, Clone)]
pub struct JsonStore {
    /// Where to look for existing palettes
    pub input: Option<Template>,
    /// Where to save new palettes
    pub output: Option<Template>,
    /// Palette size
    pub k: usize,
    /// Number of image clusters, if clustering
    pub n: Option<usize>,
}

impl JsonStore {
    /// Ensure the templates only use fields that will have a value
    pub fn validate(&self) -> anyhow::Result<()> {
        let available = |field: Field| field != Field::Label && (field != Field::N || self.n.is_some());
        for (name, template) in [("input JSON", &self.input), ("output JSON", &self.output)] {
            if let Some(template) = template {
                template
                    .check(available)
                    .with_context(|| format!("invalid {name} template \"{template}\""))?;
            }
        }
        Ok(())
    }

    /// The template context for an image
    fn context<'a>(&self, id: &'a str) -> Context<'a> {
        Context {
            path: Some(id),
            k: self.k,
            n: self.n,
            label: None,
        }
    }

    /// Read a palette file, `None` if it does not exist
    fn read(&self, template: &Template, id: &str) -> anyhow::Result<Option<Palette>> {
        let path = template.render(&self.context(id))?;
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("failed to open {path}")),
        };

        info!("loading {path}");
        let json: PaletteJson =
            serde_json::from_reader(BufReader::new(file)).with_context(|| format!("failed to parse {path}"))?;

        let palette = Palette::from_hex(&json.palette).with_context(|| format!("bad color in {path}"))?;

        // Extracted palettes are always opaque
        Ok(Some(Palette::new(
            palette
                .into_colors()
                .into_iter()
                .map(|c| rgb(c.red, c.green, c.blue))
                .collect(),
        )))
    }
}

impl PaletteStore for JsonStore {
    fn load(&self, id: &str) -> Option<Palette> {
        let template = self.input.as_ref()?;
        match self.read(template, id) {
            Ok(Some(palette)) => Some(palette),
            Ok(None) => {
                debug!("no stored palette for {id}");
                None
            }
            Err(e) => {
                warn!("ignoring the stored palette for {id}: {e:#}");
                None
            }
        }
    }

    fn save(&self, id: &str, palette: &Palette) -> io::Result<()> {
        let Some(template) = &self.output else {
            return Ok(());
        };

        write_json(template, &self.context(id), &PaletteJson::new(id, palette))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("{e:#}")))
    }
}
