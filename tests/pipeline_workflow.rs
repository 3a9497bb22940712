use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_matches::assert_matches;
use async_trait::async_trait;
use h2img::{CliArgs, ImageGenerator, JobConfig, PipelineError, run_job};

/// Generator double that hands back a valid PNG and counts invocations.
struct CountingGenerator {
    calls: AtomicUsize,
    bytes: Vec<u8>,
}

impl CountingGenerator {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            bytes: png_fixture(),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for CountingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<Vec<u8>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.bytes.clone())
    }
}

struct FailingGenerator;

#[async_trait]
impl ImageGenerator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<Vec<u8>, PipelineError> {
        Err(PipelineError::generation("quota exceeded"))
    }
}

fn png_fixture() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(32, 18, image::Rgb([200, 180, 40]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode fixture");
    out.into_inner()
}

const DRAFT: &str = concat!(
    "<p>リード文</p>\n",
    "<h2>一万円札の見分け方</h2>\n",
    r#"<img class="aligncenter size-full" src="" alt="一万円札の見分け方のイメージ" />"#,
    "\n<p>本文その一</p>\n",
    "<h2>高価買取のご案内</h2>\n",
    r#"<img class="aligncenter size-full" src="" alt="高価買取のご案内のイメージ" />"#,
    "\n<p>締めの文章</p>\n",
);

const PROMPTS_TWO_SECTIONS: &str = "\
currency_mode: true
prompts:
  - id: h2_01
    h2: 一万円札の見分け方
    alt: 一万円札の見分け方のイメージ
    yaml: |
      subject: a banknote under a magnifying glass
      style: studio light
  - id: h2_02
    h2: 高価買取のご案内
    alt: 高価買取のご案内のイメージ
    use_fixed: true
    yaml: |
      subject: unused when fixed
";

struct Fixture {
    _tempdir: tempfile::TempDir,
    folder: PathBuf,
    asset: PathBuf,
}

fn seed(draft: &str, prompts: &str) -> Fixture {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let folder = tempdir.path().join("kw");
    fs::create_dir_all(&folder).expect("folder");
    fs::write(folder.join("初稿：テスト.html"), draft).expect("draft");
    fs::write(folder.join("image_prompts.yaml"), prompts).expect("prompts");
    let asset = tempdir.path().join("daikichi_kyusyu.png");
    fs::write(&asset, png_fixture()).expect("asset");
    Fixture {
        _tempdir: tempdir,
        folder,
        asset,
    }
}

fn config_for(fixture: &Fixture) -> JobConfig {
    let args = CliArgs {
        folder: fixture.folder.clone(),
        fixed_asset: Some(fixture.asset.clone()),
        ..CliArgs::default()
    };
    let config = JobConfig::from_args(args).expect("config");
    config.validate().expect("valid");
    config
}

fn draft_contents(folder: &Path) -> String {
    fs::read_to_string(folder.join("初稿：テスト.html")).expect("draft")
}

#[tokio::test]
async fn two_section_example_generates_one_and_copies_one() {
    let fixture = seed(DRAFT, PROMPTS_TWO_SECTIONS);
    let config = config_for(&fixture);
    let generator = CountingGenerator::new();

    let report = run_job(&config, &generator).await.expect("run");

    assert_eq!(generator.calls(), 1);
    assert_eq!(report.sections, 2);
    assert_eq!(report.placeholders, 2);
    assert_eq!(report.generated, 1);
    assert_eq!(report.fixed, 1);
    assert_eq!(report.rewritten, 2);

    assert!(config.output_path("h2_01").is_file());
    assert!(config.output_path("h2_02").is_file());

    let html = draft_contents(&fixture.folder);
    assert!(html.contains(r#"src="images/h2_01.jpg" alt="一万円札の見分け方のイメージ""#));
    assert!(html.contains(r#"src="images/h2_02.jpg" alt="高価買取のご案内のイメージ""#));
}

#[tokio::test]
async fn one_generation_call_per_plain_placeholder() {
    let plain_prompts = PROMPTS_TWO_SECTIONS.replace("    use_fixed: true\n", "");
    let fixture = seed(DRAFT, &plain_prompts);
    let config = config_for(&fixture);
    let generator = CountingGenerator::new();

    let report = run_job(&config, &generator).await.expect("run");

    assert_eq!(generator.calls(), 2);
    assert_eq!(report.generated, 2);
    assert_eq!(report.fixed, 0);
}

#[tokio::test]
async fn use_fixed_never_triggers_generation() {
    let all_fixed = PROMPTS_TWO_SECTIONS.replace(
        "    yaml: |\n      subject: a banknote under a magnifying glass\n      style: studio light\n",
        "    use_fixed: true\n    yaml: |\n      subject: unused\n",
    );
    let fixture = seed(DRAFT, &all_fixed);
    let config = config_for(&fixture);
    let generator = CountingGenerator::new();

    let report = run_job(&config, &generator).await.expect("run");

    assert_eq!(generator.calls(), 0);
    assert_eq!(report.fixed, 2);
}

#[tokio::test]
async fn existing_output_is_reused_without_generation() {
    let fixture = seed(DRAFT, PROMPTS_TWO_SECTIONS);
    let config = config_for(&fixture);

    // Pre-populate the first output as a previous run would have left it.
    fs::write(config.output_path("h2_01"), png_fixture()).expect("pre-seed");

    let generator = CountingGenerator::new();
    let report = run_job(&config, &generator).await.expect("run");

    assert_eq!(generator.calls(), 0);
    assert_eq!(report.reused, 1);
    assert_eq!(report.fixed, 1);
    assert_eq!(report.generated, 0);
}

#[tokio::test]
async fn leftover_raw_image_is_recompressed_not_regenerated() {
    let fixture = seed(DRAFT, PROMPTS_TWO_SECTIONS);
    let config = config_for(&fixture);
    fs::write(config.raw_output_path("h2_01"), png_fixture()).expect("raw leftover");

    let generator = CountingGenerator::new();
    let report = run_job(&config, &generator).await.expect("run");

    assert_eq!(generator.calls(), 0);
    assert_eq!(report.reused, 1);
    assert!(config.output_path("h2_01").is_file());
    assert!(!config.raw_output_path("h2_01").exists());
}

#[tokio::test]
async fn non_placeholder_content_is_byte_identical() {
    let fixture = seed(DRAFT, PROMPTS_TWO_SECTIONS);
    let config = config_for(&fixture);
    let generator = CountingGenerator::new();

    run_job(&config, &generator).await.expect("run");

    let restored = draft_contents(&fixture.folder)
        .replace("images/h2_01.jpg", "")
        .replace("images/h2_02.jpg", "");
    assert_eq!(restored, DRAFT);
}

#[tokio::test]
async fn missing_prompt_entry_aborts_with_section_name() {
    let one_entry = "\
prompts:
  - id: h2_01
    h2: 一万円札の見分け方
    alt: 一万円札の見分け方のイメージ
    yaml: \"subject: x\"
";
    let fixture = seed(DRAFT, one_entry);
    let config = config_for(&fixture);
    let generator = CountingGenerator::new();

    let err = run_job(&config, &generator).await.unwrap_err();
    let pipeline_err = err.downcast_ref::<PipelineError>().expect("typed error");
    assert_matches!(pipeline_err, PipelineError::PromptMap { detail } if detail.contains("高価買取のご案内"));
    // Fail-fast: nothing was generated or written.
    assert_eq!(generator.calls(), 0);
    assert_eq!(draft_contents(&fixture.folder), DRAFT);
}

#[tokio::test]
async fn generation_failure_aborts_and_leaves_draft_untouched() {
    let fixture = seed(DRAFT, PROMPTS_TWO_SECTIONS);
    let config = config_for(&fixture);

    let err = run_job(&config, &FailingGenerator).await.unwrap_err();
    let pipeline_err = err.downcast_ref::<PipelineError>().expect("typed error");
    assert_eq!(pipeline_err.category(), "generation_error");
    assert_eq!(draft_contents(&fixture.folder), DRAFT);
}

#[tokio::test]
async fn use_fixed_without_asset_is_an_error() {
    let fixture = seed(DRAFT, PROMPTS_TWO_SECTIONS);
    let mut config = config_for(&fixture);
    config.fixed_asset = None;

    let err = run_job(&config, &CountingGenerator::new()).await.unwrap_err();
    let pipeline_err = err.downcast_ref::<PipelineError>().expect("typed error");
    assert_matches!(pipeline_err, PipelineError::PromptMap { .. });
}

#[tokio::test]
async fn dry_run_writes_nothing_and_calls_nothing() {
    let fixture = seed(DRAFT, PROMPTS_TWO_SECTIONS);
    let mut config = config_for(&fixture);
    config.dry_run = true;
    let generator = CountingGenerator::new();

    let report = run_job(&config, &generator).await.expect("run");

    assert_eq!(generator.calls(), 0);
    assert_eq!(report.rewritten, 0);
    assert!(!config.output_path("h2_01").exists());
    assert_eq!(draft_contents(&fixture.folder), DRAFT);
}

#[tokio::test]
async fn rerun_after_success_reuses_everything() {
    let fixture = seed(DRAFT, PROMPTS_TWO_SECTIONS);
    let config = config_for(&fixture);

    let first = CountingGenerator::new();
    run_job(&config, &first).await.expect("first run");
    let after_first = draft_contents(&fixture.folder);

    let second = CountingGenerator::new();
    let report = run_job(&config, &second).await.expect("second run");

    assert_eq!(second.calls(), 0);
    assert_eq!(report.reused, 2);
    // Placeholders are already filled, so the rewrite pass changes nothing.
    assert_eq!(draft_contents(&fixture.folder), after_first);
}
