//! End-to-end pipeline tests against stand-in tools.
//!
//! Run with: `cargo test --test pipeline`

#![cfg(unix)]

mod common;

use common::{
    config, fake_office, fake_pdf, fake_pdf_with_gap, invoked, job_dirs, tools, FIXTURE_HEIGHT,
    FIXTURE_WIDTH,
};
use edgequake_doc2img::{
    ConversionProgressCallback, Converter, Doc2ImgError, DocumentFormat, ErrorKind, OfficeKind,
    StageKind,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn page_numbers(output: &edgequake_doc2img::ConversionOutput) -> Vec<usize> {
    output.pages.iter().map(|p| p.page).collect()
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn office_document_converts_then_rasterizes() {
    let root = tempfile::tempdir().unwrap();
    let uploads = root.path().join("uploads");
    let converter = Converter::new(config(&uploads).build().unwrap()).unwrap();

    let output = converter
        .run(&fake_office(3), "report.docx", None)
        .await
        .expect("conversion should succeed");

    assert_eq!(page_numbers(&output), vec![1, 2, 3]);
    assert_eq!(
        output.format,
        DocumentFormat::OfficeDocument(OfficeKind::WordProcessing)
    );
    assert!(output.stats.office_duration_ms.is_some());
    assert_eq!(output.stats.page_count, 3);
    for page in &output.pages {
        assert_eq!(page.mime_type, "image/png");
        assert_eq!((page.width, page.height), (FIXTURE_WIDTH, FIXTURE_HEIGHT));
        assert!(page.bytes.starts_with(b"\x89PNG"));
    }

    assert!(invoked(&uploads, "soffice"));
    assert!(invoked(&uploads, "pdftoppm"));
    assert!(job_dirs(&uploads).is_empty(), "workspace must be removed");
}

#[tokio::test]
async fn hanging_converter_times_out_and_cleans_up() {
    let root = tempfile::tempdir().unwrap();
    let uploads = root.path().join("uploads");
    let cfg = config(&uploads)
        .soffice_path(&tools().soffice_hang)
        .office_timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    let converter = Converter::new(cfg).unwrap();

    let start = Instant::now();
    let err = converter
        .run(&fake_office(2), "slides.pptx", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConversionTimeout);
    assert_eq!(err.stage(), Some(StageKind::OfficeToPdf));
    assert!(
        start.elapsed() < Duration::from_secs(5),
        "took {:?}",
        start.elapsed()
    );
    assert!(!invoked(&uploads, "pdftoppm"));
    assert!(job_dirs(&uploads).is_empty());
}

#[tokio::test]
async fn unsupported_input_launches_nothing() {
    let root = tempfile::tempdir().unwrap();
    let uploads = root.path().join("uploads");
    let converter = Converter::new(config(&uploads).build().unwrap()).unwrap();

    let err = converter
        .run(b"meeting notes\n", "notes.txt", Some("text/plain"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ValidationError);
    assert!(matches!(err, Doc2ImgError::UnsupportedFormat { .. }));
    assert!(!invoked(&uploads, "soffice"));
    assert!(!invoked(&uploads, "pdftoppm"));
    assert!(job_dirs(&uploads).is_empty());
}

#[tokio::test]
async fn pdf_skips_office_stage() {
    let root = tempfile::tempdir().unwrap();
    let uploads = root.path().join("uploads");
    let converter = Converter::new(config(&uploads).build().unwrap()).unwrap();

    let output = converter.run(&fake_pdf(5), "doc.pdf", None).await.unwrap();

    assert_eq!(page_numbers(&output), vec![1, 2, 3, 4, 5]);
    assert_eq!(output.format, DocumentFormat::Pdf);
    assert_eq!(output.stats.office_duration_ms, None);
    assert!(!invoked(&uploads, "soffice"));
    assert!(invoked(&uploads, "pdftoppm"));
    assert!(job_dirs(&uploads).is_empty());
}

#[tokio::test]
async fn corrupt_pdf_fails_in_rasterization() {
    let root = tempfile::tempdir().unwrap();
    let uploads = root.path().join("uploads");
    let converter = Converter::new(config(&uploads).build().unwrap()).unwrap();

    let err = converter
        .run(b"%PDF-1.4\ngarbage", "corrupt.pdf", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConversionFailed);
    assert_eq!(err.stage(), Some(StageKind::PdfToImages));
    let msg = err.to_string();
    assert!(msg.contains("rasterization"), "got: {msg}");
    assert!(msg.contains("exit code 1"), "got: {msg}");
    assert!(msg.contains("trailer"), "got: {msg}");
    assert!(job_dirs(&uploads).is_empty());

    let public = err.public_message();
    assert!(public.contains("<workspace>/source.pdf"), "got: {public}");
    assert!(
        !public.contains(&*uploads.to_string_lossy()),
        "server path leaked: {public}"
    );
}

#[tokio::test]
async fn hanging_rasterizer_times_out_and_cleans_up() {
    let root = tempfile::tempdir().unwrap();
    let uploads = root.path().join("uploads");
    let cfg = config(&uploads)
        .pdftoppm_path(&tools().pdftoppm_hang)
        .raster_timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    let converter = Converter::new(cfg).unwrap();

    let start = Instant::now();
    let err = converter
        .run(&fake_pdf(3), "stuck.pdf", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConversionTimeout);
    assert_eq!(err.stage(), Some(StageKind::PdfToImages));
    assert!(
        start.elapsed() < Duration::from_secs(5),
        "took {:?}",
        start.elapsed()
    );
    assert!(job_dirs(&uploads).is_empty());
}

// ── Invariants ───────────────────────────────────────────────────────────

#[tokio::test]
async fn same_input_twice_gives_same_page_count() {
    let root = tempfile::tempdir().unwrap();
    let uploads = root.path().join("uploads");
    let converter = Converter::new(config(&uploads).build().unwrap()).unwrap();

    let a = converter.run(&fake_office(4), "deck.pptx", None).await.unwrap();
    let b = converter.run(&fake_office(4), "deck.pptx", None).await.unwrap();
    assert_eq!(a.pages.len(), b.pages.len());
    assert_ne!(a.job_id, b.job_id);
}

#[tokio::test]
async fn double_digit_page_numbers_sort_numerically() {
    let root = tempfile::tempdir().unwrap();
    let uploads = root.path().join("uploads");
    let converter = Converter::new(config(&uploads).build().unwrap()).unwrap();

    let output = converter.run(&fake_pdf(12), "long.pdf", None).await.unwrap();
    assert_eq!(page_numbers(&output), (1..=12).collect::<Vec<_>>());
}

#[tokio::test]
async fn missing_page_fails_the_job() {
    let root = tempfile::tempdir().unwrap();
    let uploads = root.path().join("uploads");
    let converter = Converter::new(config(&uploads).build().unwrap()).unwrap();

    let err = converter
        .run(&fake_pdf_with_gap(4, 2), "partial.pdf", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConversionFailed);
    assert!(err.to_string().contains("not contiguous"), "got: {err}");
    assert!(job_dirs(&uploads).is_empty());
}

#[tokio::test]
async fn converter_without_output_is_conversion_failure() {
    let root = tempfile::tempdir().unwrap();
    let uploads = root.path().join("uploads");
    let cfg = config(&uploads)
        .soffice_path(&tools().soffice_silent)
        .build()
        .unwrap();
    let converter = Converter::new(cfg).unwrap();

    let err = converter
        .run(&fake_office(1), "locked.docx", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConversionFailed);
    assert_eq!(err.stage(), Some(StageKind::OfficeToPdf));
    assert!(job_dirs(&uploads).is_empty());
}

#[tokio::test]
async fn mime_type_routes_extensionless_upload() {
    let root = tempfile::tempdir().unwrap();
    let uploads = root.path().join("uploads");
    let converter = Converter::new(config(&uploads).build().unwrap()).unwrap();

    let pptx = "application/vnd.openxmlformats-officedocument.presentationml.presentation";
    let output = converter
        .run(&fake_office(2), "upload", Some(pptx))
        .await
        .unwrap();
    assert_eq!(page_numbers(&output), vec![1, 2]);
    assert!(invoked(&uploads, "soffice"));
}

#[tokio::test]
async fn concurrent_jobs_are_isolated() {
    let root = tempfile::tempdir().unwrap();
    let uploads = root.path().join("uploads");
    let cfg = config(&uploads).max_concurrent_conversions(2).build().unwrap();
    let converter = Arc::new(Converter::new(cfg).unwrap());

    let handles: Vec<_> = (1..=6)
        .map(|n| {
            let c = Arc::clone(&converter);
            tokio::spawn(async move {
                let name = format!("doc{n}.docx");
                c.run(&fake_office(n), &name, None).await
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let output = handle.await.unwrap().unwrap();
        assert_eq!(output.pages.len(), i + 1);
    }
    assert!(job_dirs(&uploads).is_empty());
}

// ── Progress events ──────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ConversionProgressCallback for Recorder {
    fn on_job_start(&self, _job_id: &str, filename: &str) {
        self.events.lock().unwrap().push(format!("start {filename}"));
    }

    fn on_stage_start(&self, _job_id: &str, stage: StageKind) {
        self.events.lock().unwrap().push(format!("stage {stage:?}"));
    }

    fn on_stage_complete(&self, _job_id: &str, stage: StageKind, _elapsed_ms: u64) {
        self.events.lock().unwrap().push(format!("done {stage:?}"));
    }

    fn on_job_complete(&self, _job_id: &str, page_count: usize) {
        self.events.lock().unwrap().push(format!("complete {page_count}"));
    }

    fn on_job_failed(&self, _job_id: &str, kind: ErrorKind, _message: &str) {
        self.events.lock().unwrap().push(format!("failed {kind}"));
    }
}

#[tokio::test]
async fn progress_events_follow_the_pipeline() {
    let root = tempfile::tempdir().unwrap();
    let uploads = root.path().join("uploads");
    let recorder = Arc::new(Recorder::default());
    let cfg = config(&uploads)
        .progress_callback(recorder.clone() as Arc<dyn ConversionProgressCallback>)
        .build()
        .unwrap();
    let converter = Converter::new(cfg).unwrap();

    converter.run(&fake_office(2), "a.odt", None).await.unwrap();
    converter.run(b"x", "b.txt", None).await.unwrap_err();

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start a.odt",
            "stage OfficeToPdf",
            "done OfficeToPdf",
            "stage PdfToImages",
            "done PdfToImages",
            "complete 2",
            "start b.txt",
            "failed ValidationError",
        ]
    );
}
