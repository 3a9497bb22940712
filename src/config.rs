use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::compress::{DEFAULT_JPEG_QUALITY, DEFAULT_MAX_WIDTH};
use crate::generate::DEFAULT_LOCATION;

/// Draft file name patterns, in lookup order.
const DRAFT_PREFIX: &str = "初稿：";
const DRAFT_FALLBACK: &str = "初稿_新.html";
const PROMPTS_FILE: &str = "image_prompts.yaml";
const IMAGES_DIR: &str = "images";

/// Shared promotional asset, relative to the project root (two levels above
/// the keyword folder).
const FIXED_ASSET_RELATIVE: &str = "00.共通素材/daikichi_kyusyu.png";

#[derive(Parser, Debug, Default, Clone)]
#[command(name = "h2img", about = "Generate and insert section images for a draft HTML article", version)]
pub struct CliArgs {
    /// Keyword folder containing the draft HTML and image_prompts.yaml
    #[arg(value_name = "FOLDER")]
    pub folder: PathBuf,

    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "H2IMG_FIXED_ASSET",
        value_name = "FILE",
        help = "Shared asset substituted for use_fixed placeholders"
    )]
    pub fixed_asset: Option<PathBuf>,

    #[arg(
        long,
        env = "H2IMG_MODEL",
        value_name = "MODEL",
        help = "Use a single Imagen model id instead of the fallback chain"
    )]
    pub model: Option<String>,

    #[arg(
        long,
        env = "GOOGLE_CLOUD_PROJECT",
        value_name = "PROJECT",
        help = "Google Cloud project used for image generation"
    )]
    pub project: Option<String>,

    #[arg(
        long,
        env = "H2IMG_LOCATION",
        value_name = "LOCATION",
        help = "Vertex AI location (Imagen is most reliable in us-central1)"
    )]
    pub location: Option<String>,

    #[arg(
        long,
        env = "H2IMG_JPEG_QUALITY",
        value_name = "N",
        help = "JPEG quality for compressed output (1-100)",
        value_parser = clap::value_parser!(u8)
    )]
    pub jpeg_quality: Option<u8>,

    #[arg(
        long,
        env = "H2IMG_MAX_WIDTH",
        value_name = "PX",
        help = "Maximum output image width in pixels",
        value_parser = clap::value_parser!(u32)
    )]
    pub max_width: Option<u32>,

    #[arg(long, help = "Scan and plan only; no API calls, no writes")]
    pub dry_run: bool,
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    fixed_asset: Option<PathBuf>,
    model: Option<String>,
    project: Option<String>,
    location: Option<String>,
    jpeg_quality: Option<u8>,
    max_width: Option<u32>,
}

/// Fully resolved job configuration: folder layout plus generation settings.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub folder: PathBuf,
    pub html_path: PathBuf,
    pub prompts_path: PathBuf,
    pub images_dir: PathBuf,
    pub fixed_asset: Option<PathBuf>,
    pub model: Option<String>,
    pub project: Option<String>,
    pub location: String,
    pub access_token: Option<String>,
    pub jpeg_quality: u8,
    pub max_width: u32,
    pub dry_run: bool,
}

impl JobConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            folder,
            config,
            fixed_asset: cli_fixed_asset,
            model: cli_model,
            project: cli_project,
            location: cli_location,
            jpeg_quality: cli_jpeg_quality,
            max_width: cli_max_width,
            dry_run,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            fixed_asset: file_fixed_asset,
            model: file_model,
            project: file_project,
            location: file_location,
            jpeg_quality: file_jpeg_quality,
            max_width: file_max_width,
        } = file_config;

        anyhow::ensure!(
            folder.is_dir(),
            "keyword folder {:?} does not exist or is not a directory",
            folder
        );

        let html_path = locate_draft(&folder)?;
        let prompts_path = folder.join(PROMPTS_FILE);
        anyhow::ensure!(
            prompts_path.is_file(),
            "{PROMPTS_FILE} not found in {:?}",
            folder
        );

        let images_dir = folder.join(IMAGES_DIR);
        fs::create_dir_all(&images_dir)
            .with_context(|| format!("failed to create output directory {:?}", images_dir))?;

        // An explicitly configured asset is kept even if currently missing
        // (the pipeline reports the read failure); the default is only used
        // when it actually exists.
        let fixed_asset = cli_fixed_asset
            .or(file_fixed_asset)
            .or_else(|| default_fixed_asset(&folder).filter(|path| path.is_file()));

        // clap resolves GOOGLE_CLOUD_PROJECT at parse time, before the
        // folder's .env has been loaded; check again here.
        let project = cli_project
            .or(file_project)
            .or_else(|| std::env::var("GOOGLE_CLOUD_PROJECT").ok());
        let access_token = std::env::var("GOOGLE_CLOUD_ACCESS_TOKEN").ok();

        let location = cli_location
            .or(file_location)
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string());

        let jpeg_quality = cli_jpeg_quality
            .or(file_jpeg_quality)
            .unwrap_or(DEFAULT_JPEG_QUALITY);
        let max_width = cli_max_width.or(file_max_width).unwrap_or(DEFAULT_MAX_WIDTH);

        Ok(Self {
            folder,
            html_path,
            prompts_path,
            images_dir,
            fixed_asset,
            model: cli_model.or(file_model),
            project,
            location,
            access_token,
            jpeg_quality,
            max_width,
            dry_run,
        })
    }

    /// Fail-fast checks before any work happens.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            (1..=100).contains(&self.jpeg_quality),
            "jpeg quality must be between 1 and 100, got {}",
            self.jpeg_quality
        );
        anyhow::ensure!(self.max_width > 0, "max width must be nonzero");
        anyhow::ensure!(
            self.html_path.is_file(),
            "draft HTML {:?} disappeared after discovery",
            self.html_path
        );
        Ok(())
    }

    /// Relative path recorded into the rewritten document.
    pub fn relative_image_path(&self, id: &str) -> String {
        format!("{IMAGES_DIR}/{id}.jpg")
    }

    pub fn output_path(&self, id: &str) -> PathBuf {
        self.images_dir.join(format!("{id}.jpg"))
    }

    /// Pre-compression artifact a previous interrupted run may have left.
    pub fn raw_output_path(&self, id: &str) -> PathBuf {
        self.images_dir.join(format!("{id}.png"))
    }
}

/// Load `.env` files the way the drafting workflow expects: one next to the
/// invocation directory, one inside the keyword folder. Both optional.
pub fn load_env_files(folder: &Path) {
    let _ = dotenv::dotenv();
    let _ = dotenv::from_path(folder.join(".env"));
}

fn locate_draft(folder: &Path) -> Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(folder)
        .with_context(|| format!("failed to read keyword folder {:?}", folder))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(DRAFT_PREFIX) && name.ends_with(".html"))
        })
        .collect();
    candidates.sort();

    if let Some(first) = candidates.into_iter().next() {
        return Ok(first);
    }

    let fallback = folder.join(DRAFT_FALLBACK);
    anyhow::ensure!(
        fallback.is_file(),
        "no draft HTML ({DRAFT_PREFIX}*.html or {DRAFT_FALLBACK}) found in {:?}",
        folder
    );
    Ok(fallback)
}

fn default_fixed_asset(folder: &Path) -> Option<PathBuf> {
    // Keyword folders live at <project root>/<campaign>/<keyword>.
    let project_root = folder.parent()?.parent()?;
    Some(project_root.join(FIXED_ASSET_RELATIVE))
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}
