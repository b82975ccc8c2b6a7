//! Integration tests for the heatmap pipeline.
//!
//! These tests drive the public API end to end with small seeded CamNet
//! models and synthetic images.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use burn::prelude::*;
use image::RgbImage;
use parking_lot::Mutex;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use medcam::all::*;
use medcam::core::backend::CpuAutodiff;
use medcam::core::LayerObserver;

type TestBackend = CpuAutodiff;

fn small_config(labels: &[&str]) -> CamNetConfig {
    CamNetConfig::new(labels.iter().copied())
        .with_filters(vec![4, 8])
        .with_input_size(16, 16)
}

fn small_model(labels: &[&str], seed: u64) -> CamNetModel<TestBackend> {
    small_config(labels)
        .init_model::<TestBackend>(Seed::new(seed), &Default::default())
        .unwrap()
}

/// Noise image with a bright square, reproducible per seed.
fn synthetic_scan(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    RgbImage::from_fn(width, height, |x, y| {
        let base: u8 = rng.gen_range(0..64);
        if x > width / 2 && y > height / 2 {
            image::Rgb([base.saturating_add(180); 3])
        } else {
            image::Rgb([base; 3])
        }
    })
}

fn write_scan(dir: &Path, name: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    synthetic_scan(40, 32, 9).save(&path).unwrap();
    path
}

fn input_tensor(seed: u64) -> Tensor<TestBackend, 4> {
    Preprocessor::new((16, 16))
        .to_tensor::<TestBackend>(&synthetic_scan(16, 16, seed), &Default::default())
        .unwrap()
}

#[test]
fn test_gradcam_map_properties() {
    let model = Arc::new(SharedModel::new(small_model(&["normal", "abnormal"], 1)));
    let cam = GradCam::new(model, None).unwrap();
    assert_eq!(cam.layer(), "conv2");

    for class in [0, 1] {
        let out = cam.compute(input_tensor(3), &ClassTarget::Index(class)).unwrap();
        assert_eq!(out.raw.dims(), (8, 8));
        assert_eq!(out.map.dims(), (16, 16));
        assert!(out.raw.values().iter().all(|&v| v >= 0.0));

        let flat = out.map.values().iter().all(|&v| v == 0.0);
        if !flat {
            assert_eq!(out.map.min(), 0.0);
            assert_eq!(out.map.max(), 1.0);
        }
        assert!(out.map.values().iter().all(|v| v.is_finite()));
    }
}

#[test]
fn test_identical_runs_are_identical() {
    let model = Arc::new(SharedModel::new(small_model(&["a", "b", "c"], 2)));
    let cam = GradCam::new(model, Some("conv1")).unwrap();

    let first = cam.compute(input_tensor(4), &ClassTarget::TopScore).unwrap();
    let second = cam.compute(input_tensor(4), &ClassTarget::TopScore).unwrap();

    assert_eq!(first.class_index, second.class_index);
    assert_eq!(first.score, second.score);
    assert_eq!(first.map, second.map);

    let renderer = Renderer::default();
    let original = synthetic_scan(24, 20, 5);
    let a = renderer.render(&first.map, &original).unwrap();
    let b = renderer.render(&second.map, &original).unwrap();
    assert_eq!(a, b);
}

/// Sleeps right after `layer` has been observed, i.e. between the capture of
/// its activation and the backward pass that records its gradient.
struct DelayAfter<'a> {
    inner: &'a dyn LayerObserver<TestBackend>,
    layer: &'a str,
    delay: Duration,
}

impl LayerObserver<TestBackend> for DelayAfter<'_> {
    fn observe(&self, layer: &str, output: Tensor<TestBackend, 4>) -> Tensor<TestBackend, 4> {
        let out = self.inner.observe(layer, output);
        if layer == self.layer {
            thread::sleep(self.delay);
        }
        out
    }
}

/// Wraps a model, logs the start and end of every forward pass and delays
/// after the observed layer.
struct DelayedModel {
    inner: CamNetModel<TestBackend>,
    layer: &'static str,
    delay: Duration,
    log: Arc<Mutex<Vec<(usize, &'static str)>>>,
}

thread_local! {
    static WORKER: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

impl CamModel<TestBackend> for DelayedModel {
    fn forward_observed(
        &self,
        x: Tensor<TestBackend, 4>,
        observer: &dyn LayerObserver<TestBackend>,
    ) -> Tensor<TestBackend, 2> {
        let worker = WORKER.with(|w| w.get());
        self.log.lock().push((worker, "start"));
        let delayed = DelayAfter {
            inner: observer,
            layer: self.layer,
            delay: self.delay,
        };
        let out = self.inner.forward_observed(x, &delayed);
        self.log.lock().push((worker, "end"));
        out
    }

    fn layer_names(&self) -> Vec<String> {
        self.inner.layer_names()
    }

    fn labels(&self) -> &ClassLabels {
        self.inner.labels()
    }

    fn input_size(&self) -> (usize, usize) {
        self.inner.input_size()
    }
}

#[test]
fn test_concurrent_requests_are_serialized() {
    let labels = ["left", "right"];
    let log = Arc::new(Mutex::new(Vec::new()));
    let model = Arc::new(SharedModel::new(DelayedModel {
        inner: small_model(&labels, 6),
        layer: "conv2",
        delay: Duration::from_millis(25),
        log: Arc::clone(&log),
    }));
    let cam = Arc::new(GradCam::new(model, Some("conv2")).unwrap());

    // Reference maps computed one at a time.
    let expected: Vec<ImportanceMap> = (0..2)
        .map(|class| {
            cam.compute(input_tensor(10 + class as u64), &ClassTarget::Index(class))
                .unwrap()
                .map
        })
        .collect();
    log.lock().clear();

    let completions = Arc::new(Mutex::new(Vec::new()));
    let handles: Vec<_> = (0..2)
        .map(|class| {
            let cam = Arc::clone(&cam);
            let completions = Arc::clone(&completions);
            thread::spawn(move || {
                let worker = class + 1;
                WORKER.with(|w| w.set(worker));
                let map = cam
                    .compute(input_tensor(10 + class as u64), &ClassTarget::Index(class))
                    .unwrap()
                    .map;
                completions.lock().push(worker);
                map
            })
        })
        .collect();
    let results: Vec<ImportanceMap> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Each thread got the map of its own pass.
    assert_eq!(results, expected);

    // Forward passes never overlapped.
    let events = log.lock().clone();
    assert_eq!(events.len(), 4);
    for pair in events.chunks(2) {
        assert_eq!(pair[0].1, "start");
        assert_eq!(pair[1].1, "end");
        assert_eq!(pair[0].0, pair[1].0);
    }

    // Requests complete in the order they entered the model.
    let entered: Vec<usize> = events
        .iter()
        .filter(|(_, event)| *event == "start")
        .map(|(worker, _)| *worker)
        .collect();
    assert_eq!(*completions.lock(), entered);
}

#[test]
fn test_end_to_end_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = dir.path().join("camnet");
    let output_dir = dir.path().join("outputs");
    let records = dir.path().join("heatmaps.jsonl");
    let scan = write_scan(dir.path(), "scan.png");

    small_model(&["Normal", "Pneumonia", "Pleural Effusion"], 7)
        .save_checkpoint(&checkpoint)
        .unwrap();

    let registry = ModelRegistry::<TestBackend>::new(Default::default());
    let model = registry.get_or_load(&checkpoint).unwrap();

    let config = OrchestratorConfig::default()
        .with_output_dir(&output_dir)
        .with_threshold(0.0);
    let orchestrator = HeatmapOrchestrator::new(
        model,
        config,
        JsonlSink::open(&records).unwrap(),
        Default::default(),
    )
    .unwrap();

    let predictions = orchestrator.predict(&scan).unwrap();
    assert_eq!(predictions.len(), 3);

    let report = orchestrator.run(42, &scan, &predictions);
    assert_eq!(report.status(), ReportStatus::Complete);

    for name in [
        "heatmap_42_normal.png",
        "heatmap_42_pneumonia.png",
        "heatmap_42_pleural_effusion.png",
    ] {
        let written = image::open(output_dir.join(name)).unwrap().to_rgb8();
        assert_eq!(written.dimensions(), (40, 32), "{name}");
    }

    let stored = orchestrator.sink().records().unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[2].label, "Pleural Effusion");
    assert_eq!(stored[2].method, "grad-cam");
    assert_eq!(stored[2].file_path, output_dir.join("heatmap_42_pleural_effusion.png"));
    assert!(stored.iter().map(|r| r.id).eq(1..=3));
}

#[test]
fn test_threshold_and_partial_failure() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(SharedModel::new(small_model(&["A", "B", "C"], 8)));
    let config = OrchestratorConfig::default().with_output_dir(dir.path());
    let orchestrator =
        HeatmapOrchestrator::new(model, config, MemorySink::new(), Default::default()).unwrap();

    let predictions = vec![
        Prediction::new("A", 0.95),
        Prediction::new("B", 0.2),
        Prediction::new("C", 0.6),
    ];

    // A missing image fails every qualifying label, but only those.
    let report = orchestrator.run(1, &dir.path().join("missing.png"), &predictions);
    assert!(report.all_failed());
    let failed: Vec<&str> = report.failed().map(|(label, _)| label).collect();
    assert_eq!(failed, vec!["A", "C"]);

    let scan = write_scan(dir.path(), "scan.png");
    let report = orchestrator.run(1, &scan, &predictions);
    let succeeded: Vec<&str> = report.succeeded().map(|(label, _)| label).collect();
    assert_eq!(succeeded, vec!["A", "C"]);
    assert_eq!(orchestrator.sink().len(), 2);
}

#[test]
fn test_output_names_across_diagnoses() {
    let dir = tempfile::tempdir().unwrap();
    let scan = write_scan(dir.path(), "scan.png");
    let model = Arc::new(SharedModel::new(small_model(
        &["Pleural Effusion", "pleural_effusion"],
        12,
    )));
    let config = OrchestratorConfig::default()
        .with_output_dir(dir.path())
        .with_threshold(0.0);
    let orchestrator =
        HeatmapOrchestrator::new(model, config, MemorySink::new(), Default::default()).unwrap();

    orchestrator.run(42, &scan, &[Prediction::new("Pleural Effusion", 0.9)]);
    orchestrator.run(7, &scan, &[Prediction::new("pleural_effusion", 0.9)]);
    assert!(dir.path().join("heatmap_42_pleural_effusion.png").exists());
    assert!(dir.path().join("heatmap_7_pleural_effusion.png").exists());

    // Both labels in one diagnosis: the second gets a hash suffix.
    let report = orchestrator.run(
        99,
        &scan,
        &[
            Prediction::new("Pleural Effusion", 0.9),
            Prediction::new("pleural_effusion", 0.8),
        ],
    );
    let paths: Vec<_> = report
        .succeeded()
        .map(|(_, artifact)| artifact.file_path().to_path_buf())
        .collect();
    assert_eq!(paths.len(), 2);
    assert_ne!(paths[0], paths[1]);
    assert_eq!(paths[0], dir.path().join("heatmap_99_pleural_effusion.png"));
}
