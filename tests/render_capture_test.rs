//! Render-capture procedure against scripted sessions

mod common;

use common::{CallLog, FailAt, MockLauncher, MockSession, SessionScript};
use render_exporter::render::engine::CONTENT_HEIGHT_SCRIPT;
use render_exporter::{
    BrowserRenderer, CaptureSettings, DriverPool, ExportError, ExportFormat, RenderCapture,
    RenderTarget, render::render_capture,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tempfile::TempDir;

const URL: &str = "http://exporter.test/exporter/exp-insight-9";

fn target(width: u32) -> RenderTarget {
    RenderTarget {
        url: URL.to_string(),
        viewport_width_initial: width,
        readiness_selector: ".InsightCard".to_string(),
    }
}

fn fast_settings() -> CaptureSettings {
    CaptureSettings {
        readiness_timeout: Duration::from_millis(100),
        poll_interval: Duration::from_millis(1),
    }
}

fn session(script: SessionScript) -> (MockSession, CallLog) {
    let calls = CallLog::default();
    let session = MockSession::new(1, script, Arc::clone(&calls), Arc::new(AtomicBool::new(true)));
    (session, calls)
}

fn scratch_path(dir: &TempDir, ext: &str) -> PathBuf {
    dir.path().join(format!("export-test.{ext}"))
}

#[tokio::test]
async fn test_capture_runs_steps_in_order() {
    let dir = TempDir::new().unwrap();
    let path = scratch_path(&dir, "png");
    let (session, calls) = session(SessionScript::default());

    let result = render_capture(&session, &target(800), ExportFormat::Png, &path, fast_settings())
        .await
        .unwrap();

    assert_eq!(result.bytes, b"PNGDATA");
    assert_eq!(result.content_type, "image/png");
    assert!(!path.exists());

    let calls = calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            "viewport:800x800".to_string(),
            format!("navigate:{URL}"),
            "find:.InsightCard".to_string(),
            "find:.InsightCard".to_string(),
            "find:.InsightCard".to_string(),
            format!("evaluate:{CONTENT_HEIGHT_SCRIPT}"),
            "viewport:800x1235".to_string(),
            "screenshot".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_capture_pdf_prints_page() {
    let dir = TempDir::new().unwrap();
    let path = scratch_path(&dir, "pdf");
    let (session, calls) = session(SessionScript {
        artifact: b"%PDF-1.7".to_vec(),
        checks_before_ready: 0,
        ..SessionScript::default()
    });

    let result = render_capture(&session, &target(1920), ExportFormat::Pdf, &path, fast_settings())
        .await
        .unwrap();

    assert_eq!(result.bytes, b"%PDF-1.7");
    assert_eq!(result.content_type, "application/pdf");
    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls.last().map(String::as_str), Some("pdf"));
    assert!(!calls.contains(&"screenshot".to_string()));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_csv_is_rejected_before_any_browser_call() {
    let dir = TempDir::new().unwrap();
    let path = scratch_path(&dir, "csv");
    let (session, calls) = session(SessionScript::default());

    let err = render_capture(&session, &target(800), ExportFormat::Csv, &path, fast_settings())
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::UnsupportedExportFormat(ref f) if f == "text/csv"));
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_scratch_file_removed_on_every_failure() {
    let cases = [
        (FailAt::BootstrapViewport, "browser_command"),
        (FailAt::Navigate, "navigation"),
        (FailAt::Readiness, "render_timeout"),
        (FailAt::ElementLookup, "browser_command"),
        (FailAt::Evaluate, "script_evaluation_failure"),
        (FailAt::ResizeViewport, "browser_command"),
        (FailAt::Capture, "capture_io_failure"),
    ];

    for (fail_at, expected_kind) in cases {
        let dir = TempDir::new().unwrap();
        let path = scratch_path(&dir, "png");
        // Leftover from a previous attempt at the same path
        std::fs::write(&path, b"stale").unwrap();

        let (session, _calls) = session(SessionScript {
            fail_at: Some(fail_at),
            ..SessionScript::default()
        });

        let err = render_capture(&session, &target(800), ExportFormat::Png, &path, fast_settings())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), expected_kind, "failure at {fail_at:?}");
        assert!(!path.exists(), "scratch file survived failure at {fail_at:?}");
    }
}

#[tokio::test]
async fn test_readiness_timeout_reports_selector() {
    let dir = TempDir::new().unwrap();
    let path = scratch_path(&dir, "png");
    let (session, calls) = session(SessionScript {
        fail_at: Some(FailAt::Readiness),
        ..SessionScript::default()
    });

    let err = render_capture(&session, &target(800), ExportFormat::Png, &path, fast_settings())
        .await
        .unwrap_err();

    match err {
        ExportError::RenderTimeout { url, selector, .. } => {
            assert_eq!(url, URL);
            assert_eq!(selector, ".InsightCard");
        }
        other => panic!("expected RenderTimeout, got {other:?}"),
    }

    let calls = calls.lock().unwrap().clone();
    assert!(calls.iter().filter(|c| c.starts_with("find:")).count() > 1);
    assert!(!calls.iter().any(|c| c.starts_with("evaluate:")));
    assert!(!calls.contains(&"screenshot".to_string()));
}

#[tokio::test]
async fn test_lookup_error_fails_without_waiting_out_timeout() {
    let dir = TempDir::new().unwrap();
    let path = scratch_path(&dir, "png");
    let (session, calls) = session(SessionScript {
        fail_at: Some(FailAt::ElementLookup),
        ..SessionScript::default()
    });
    let settings = CaptureSettings {
        readiness_timeout: Duration::from_secs(30),
        poll_interval: Duration::from_millis(1),
    };

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        render_capture(&session, &target(800), ExportFormat::Png, &path, settings),
    )
    .await
    .expect("lookup error must end the wait")
    .unwrap_err();

    assert!(matches!(err, ExportError::BrowserCommand(ref m) if m.contains("Target closed")));
    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls.iter().filter(|c| c.starts_with("find:")).count(), 1);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_non_numeric_height_fails_evaluation() {
    for height in [
        serde_json::json!(null),
        serde_json::json!("1200px"),
        serde_json::json!(0),
        serde_json::json!(-5),
    ] {
        let dir = TempDir::new().unwrap();
        let path = scratch_path(&dir, "png");
        let (session, calls) = session(SessionScript {
            content_height: height.clone(),
            checks_before_ready: 0,
            ..SessionScript::default()
        });

        let err = render_capture(&session, &target(800), ExportFormat::Png, &path, fast_settings())
            .await
            .unwrap_err();

        assert!(
            matches!(err, ExportError::ScriptEvaluationFailure(_)),
            "height {height} gave {err:?}"
        );
        assert!(!calls.lock().unwrap().contains(&"screenshot".to_string()));
    }
}

#[tokio::test]
async fn test_integer_height_used_as_is() {
    let dir = TempDir::new().unwrap();
    let path = scratch_path(&dir, "png");
    let (session, calls) = session(SessionScript {
        content_height: serde_json::json!(2400),
        checks_before_ready: 0,
        ..SessionScript::default()
    });

    render_capture(&session, &target(1920), ExportFormat::Png, &path, fast_settings())
        .await
        .unwrap();

    assert!(calls.lock().unwrap().contains(&"viewport:1920x2400".to_string()));
}

// =============================================================================
// BrowserRenderer over the pool
// =============================================================================

fn renderer(launcher: &MockLauncher) -> BrowserRenderer<MockLauncher> {
    BrowserRenderer::new(DriverPool::new(launcher.clone(), 1), fast_settings())
}

#[tokio::test]
async fn test_renderer_reuses_session_after_success() {
    let dir = TempDir::new().unwrap();
    let launcher = MockLauncher::new(SessionScript {
        checks_before_ready: 0,
        ..SessionScript::default()
    });
    let renderer = renderer(&launcher);

    for _ in 0..3 {
        let path = scratch_path(&dir, "png");
        renderer
            .capture(&target(800), ExportFormat::Png, &path)
            .await
            .unwrap();
        assert!(!path.exists());
    }

    assert_eq!(launcher.launch_count(), 1);
    assert_eq!(renderer.pool().idle_count(), 1);
}

#[tokio::test]
async fn test_renderer_discards_session_after_failure() {
    let dir = TempDir::new().unwrap();
    let launcher = MockLauncher::new(SessionScript {
        fail_at: Some(FailAt::Navigate),
        ..SessionScript::default()
    });
    let renderer = renderer(&launcher);

    for _ in 0..2 {
        let err = renderer
            .capture(&target(800), ExportFormat::Png, &scratch_path(&dir, "png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Navigation { .. }));
    }

    assert_eq!(launcher.launch_count(), 2);
    assert_eq!(renderer.pool().idle_count(), 0);
}

#[tokio::test]
async fn test_renderer_rejects_csv_without_leasing() {
    let dir = TempDir::new().unwrap();
    let launcher = MockLauncher::new(SessionScript::default());
    let renderer = renderer(&launcher);

    let err = renderer
        .capture(&target(800), ExportFormat::Csv, &scratch_path(&dir, "csv"))
        .await
        .unwrap_err();

    assert!(err.is_rejection());
    assert_eq!(launcher.launch_count(), 0);
    assert!(launcher.calls().is_empty());
}

#[tokio::test]
async fn test_renderer_surfaces_launch_failure() {
    let dir = TempDir::new().unwrap();
    let launcher = MockLauncher::new(SessionScript::default());
    launcher.fail_next(1);
    let renderer = renderer(&launcher);

    let err = renderer
        .capture(&target(800), ExportFormat::Png, &scratch_path(&dir, "png"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "driver_launch_failure");

    renderer
        .capture(&target(800), ExportFormat::Png, &scratch_path(&dir, "png"))
        .await
        .unwrap();
    assert_eq!(launcher.launch_count(), 1);
}
