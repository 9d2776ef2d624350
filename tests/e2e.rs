//! End-to-end integration tests for dmx-grabber.
//!
//! These drive the full session pipeline (enumeration, scheduling, the
//! ordered sink and the resume protocol) with synthetic rasteriser and
//! decoder adapters, so no pdfium library and no real PDF files are needed.
//! The fake rasteriser encodes `filename|page` into the pixels of the page
//! image; the fake decoder reads it back, which makes the decoded payloads
//! a faithful fingerprint of which page produced which output line.

use dmx_grabber::{
    load_progress, run, GrabConfig, GrabError, PageRasterizer, Roi, SymbolDecoder,
};
use image::{DynamicImage, RgbImage};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ── Fake adapters ────────────────────────────────────────────────────────────

struct FakeRasterizer {
    pages: HashMap<String, usize>,
}

impl FakeRasterizer {
    fn new(pages: &[(&str, usize)]) -> Arc<Self> {
        Arc::new(Self {
            pages: pages
                .iter()
                .map(|(name, count)| (name.to_string(), *count))
                .collect(),
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

impl PageRasterizer for FakeRasterizer {
    fn page_count(&self, path: &Path) -> Result<usize, GrabError> {
        self.pages
            .get(&file_name(path))
            .copied()
            .ok_or_else(|| GrabError::CorruptPdf {
                path: path.to_path_buf(),
                detail: "not in fixture".into(),
            })
    }

    fn render(
        &self,
        path: &Path,
        page_index: usize,
        _dpi: u32,
        _clip: Option<Roi>,
    ) -> Result<DynamicImage, GrabError> {
        let label = format!("{}|{}", file_name(path), page_index + 1);
        let bytes = label.into_bytes();
        let img = RgbImage::from_fn(64, 1, |x, _| {
            let v = bytes.get(x as usize).copied().unwrap_or(0);
            image::Rgb([v, 0, 0])
        });
        Ok(DynamicImage::ImageRgb8(img))
    }
}

/// Decodes the label planted by [`FakeRasterizer`]. A configurable prefix
/// turns the label into whatever payload shape a test needs.
struct FakeDecoder {
    payload_prefix: &'static str,
    stagger: bool,
}

impl SymbolDecoder for FakeDecoder {
    fn decode(
        &self,
        image: &DynamicImage,
        _timeout_ms: u64,
        _max_codes: usize,
    ) -> Result<Vec<Vec<u8>>, GrabError> {
        let rgb = image.to_rgb8();
        let bytes: Vec<u8> = (0..rgb.width())
            .map(|x| rgb.get_pixel(x, 0)[0])
            .take_while(|&b| b != 0)
            .collect();
        let label = String::from_utf8(bytes).unwrap();
        if self.stagger {
            let (_, page) = label.rsplit_once('|').unwrap();
            let millis = (page.parse::<u64>().unwrap() * 5) % 11;
            std::thread::sleep(Duration::from_millis(millis));
        }
        Ok(vec![format!("{}{}", self.payload_prefix, label).into_bytes()])
    }
}

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Create stub `.pdf` files (content never read by the fakes) and a config
/// wired to the fake adapters.
fn setup(
    fixture: &[(&str, usize)],
    workers: usize,
    payload_prefix: &'static str,
) -> (TempDir, PathBuf, GrabConfig) {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input");
    fs::create_dir(&input).unwrap();
    for (name, _) in fixture {
        fs::write(input.join(name), b"stub").unwrap();
    }
    let output = dir.path().join("out/results.csv");

    let config = GrabConfig::builder()
        .input_dir(&input)
        .output(&output)
        .workers(workers)
        .rasterizer(FakeRasterizer::new(fixture))
        .decoder(Arc::new(FakeDecoder {
            payload_prefix,
            stagger: workers > 1,
        }))
        .build()
        .unwrap();

    (dir, output, config)
}

fn output_lines(output: &Path) -> Vec<String> {
    fs::read_to_string(output)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

// ── Ordering ─────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn multiworker_output_is_in_file_then_page_order() {
    let fixture = [("alpha.pdf", 3), ("beta.pdf", 3)];
    let (_dir, output, config) = setup(&fixture, 4, "");

    let stats = run(config).await.unwrap();

    assert_eq!(
        output_lines(&output),
        vec![
            "alpha.pdf|1",
            "alpha.pdf|2",
            "alpha.pdf|3",
            "beta.pdf|1",
            "beta.pdf|2",
            "beta.pdf|3",
        ]
    );
    assert_eq!(stats.total_files, 2);
    assert_eq!(stats.processed_files, 2);
    assert_eq!(stats.total_pages, 6);
    assert_eq!(stats.pages_processed, 6);
    assert_eq!(stats.total_codes, 6);
    assert_eq!(stats.pages_empty, 0);
    assert!(!stats.interrupted);

    // Every processed page is in the sidecar.
    let done = load_progress(&output).unwrap();
    assert_eq!(done.len(), 6);
    for (name, count) in fixture {
        for page in 1..=count {
            assert!(done.contains(&(name.to_string(), page)));
        }
    }
}

#[tokio::test]
async fn single_worker_matches_multiworker_output() {
    let fixture = [("alpha.pdf", 2), ("beta.pdf", 2)];

    let (_d1, out1, config1) = setup(&fixture, 1, "");
    run(config1).await.unwrap();

    let (_d2, out2, config2) = setup(&fixture, 3, "");
    run(config2).await.unwrap();

    assert_eq!(output_lines(&out1), output_lines(&out2));
}

// ── Resume ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn limit_then_resume_equals_one_uninterrupted_run() {
    let fixture = [("alpha.pdf", 3), ("beta.pdf", 3)];

    // Session 1: stop after 2 pages (same resume path an interrupt takes).
    let (dir, output, base_config) = setup(&fixture, 2, "");
    let config1 = GrabConfig::builder()
        .input_dir(&base_config.input_dir)
        .output(&output)
        .workers(2)
        .limit(Some(2))
        .rasterizer(Arc::clone(base_config.rasterizer.as_ref().unwrap()))
        .decoder(Arc::clone(base_config.decoder.as_ref().unwrap()))
        .build()
        .unwrap();
    let stats1 = run(config1).await.unwrap();
    assert_eq!(stats1.pages_processed, 2);
    assert_eq!(output_lines(&output), vec!["alpha.pdf|1", "alpha.pdf|2"]);

    let done = load_progress(&output).unwrap();
    assert_eq!(done.len(), 2);
    assert!(done.contains(&("alpha.pdf".to_string(), 1)));
    assert!(done.contains(&("alpha.pdf".to_string(), 2)));

    // Session 2: resume processes only the remaining 4 pages, in order.
    let config2 = GrabConfig::builder()
        .input_dir(&base_config.input_dir)
        .output(&output)
        .workers(2)
        .resume(true)
        .rasterizer(Arc::clone(base_config.rasterizer.as_ref().unwrap()))
        .decoder(Arc::clone(base_config.decoder.as_ref().unwrap()))
        .build()
        .unwrap();
    let stats2 = run(config2).await.unwrap();
    assert_eq!(stats2.resumed_from, 2);
    assert_eq!(stats2.pages_processed, 4);

    // Combined output equals a single uninterrupted run.
    let (_d3, reference, config3) = setup(&fixture, 2, "");
    run(config3).await.unwrap();
    assert_eq!(output_lines(&output), output_lines(&reference));

    drop(dir);
}

#[tokio::test]
async fn resume_with_everything_done_processes_nothing() {
    let fixture = [("alpha.pdf", 2)];
    let (_dir, output, config) = setup(&fixture, 1, "");
    run(config.clone()).await.unwrap();
    let before = output_lines(&output);

    let rerun = GrabConfig::builder()
        .input_dir(&config.input_dir)
        .output(&output)
        .resume(true)
        .rasterizer(Arc::clone(config.rasterizer.as_ref().unwrap()))
        .decoder(Arc::clone(config.decoder.as_ref().unwrap()))
        .build()
        .unwrap();
    let stats = run(rerun).await.unwrap();

    assert_eq!(stats.pages_processed, 0);
    assert_eq!(stats.resumed_from, 2);
    assert_eq!(output_lines(&output), before);
}

// ── Normalisation through the full pipeline ──────────────────────────────────

#[tokio::test]
async fn codes_are_normalised_before_hitting_the_csv() {
    // The decoder emits a GS1 payload with a visible <GS> token; the CSV
    // must contain the canonical 0x1D form.
    let fixture = [("m.pdf", 1)];
    let (_dir, output, config) = setup(&fixture, 1, "010460123456789021SN<GS>91ABCD#");

    let stats = run(config).await.unwrap();
    assert_eq!(stats.total_codes, 1);

    let lines = output_lines(&output);
    assert_eq!(lines.len(), 1);
    assert!(
        lines[0].starts_with("010460123456789021SN\u{1D}91ABCD#"),
        "payload must be normalised, got {:?}",
        lines[0]
    );
}

#[tokio::test]
async fn no_parse_still_normalises() {
    let fixture = [("m.pdf", 1)];
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input");
    fs::create_dir(&input).unwrap();
    fs::write(input.join("m.pdf"), b"stub").unwrap();
    let output = dir.path().join("results.csv");

    let config = GrabConfig::builder()
        .input_dir(&input)
        .output(&output)
        .parse_marks(false)
        .rasterizer(FakeRasterizer::new(&fixture))
        .decoder(Arc::new(FakeDecoder {
            payload_prefix: "]d2010460123456789021XY\\x1d91QQQQ#",
            stagger: false,
        }))
        .build()
        .unwrap();

    run(config).await.unwrap();
    let lines = output_lines(&output);
    assert!(
        lines[0].starts_with("010460123456789021XY\u{1D}91QQQQ#"),
        "prefix stripped and token replaced even with --no-parse, got {:?}",
        lines[0]
    );
}

// ── Input validation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_input_dir_is_fatal() {
    let config = GrabConfig::builder()
        .input_dir("/definitely/not/a/dir")
        .build()
        .unwrap();
    let err = run(config).await.unwrap_err();
    assert!(matches!(err, GrabError::InputDirMissing { .. }));
}

#[tokio::test]
async fn directory_without_pdfs_is_fatal() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

    let config = GrabConfig::builder()
        .input_dir(dir.path())
        .output(dir.path().join("results.csv"))
        .build()
        .unwrap();
    let err = run(config).await.unwrap_err();
    assert!(matches!(err, GrabError::NoPdfsFound { .. }));
}

#[tokio::test]
async fn unreadable_file_is_recorded_and_skipped() {
    // ghost.pdf exists on disk but the rasteriser cannot open it.
    let fixture = [("alpha.pdf", 2)];
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input");
    fs::create_dir(&input).unwrap();
    fs::write(input.join("alpha.pdf"), b"stub").unwrap();
    fs::write(input.join("ghost.pdf"), b"stub").unwrap();
    let output = dir.path().join("results.csv");

    let config = GrabConfig::builder()
        .input_dir(&input)
        .output(&output)
        .rasterizer(FakeRasterizer::new(&fixture))
        .decoder(Arc::new(FakeDecoder {
            payload_prefix: "",
            stagger: false,
        }))
        .build()
        .unwrap();

    let stats = run(config).await.unwrap();
    assert_eq!(stats.total_files, 2);
    assert_eq!(stats.files_with_errors, 1);
    assert_eq!(stats.pages_processed, 2);
    assert!(stats.errors.iter().any(|e| e.contains("ghost.pdf")));
    assert_eq!(output_lines(&output), vec!["alpha.pdf|1", "alpha.pdf|2"]);
}

#[tokio::test]
async fn non_csv_output_suffix_is_rewritten() {
    let fixture = [("alpha.pdf", 1)];
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input");
    fs::create_dir(&input).unwrap();
    fs::write(input.join("alpha.pdf"), b"stub").unwrap();

    let config = GrabConfig::builder()
        .input_dir(&input)
        .output(dir.path().join("results.xlsx"))
        .rasterizer(FakeRasterizer::new(&fixture))
        .decoder(Arc::new(FakeDecoder {
            payload_prefix: "",
            stagger: false,
        }))
        .build()
        .unwrap();

    run(config).await.unwrap();
    assert!(dir.path().join("results.csv").exists());
    assert!(!dir.path().join("results.xlsx").exists());
}
