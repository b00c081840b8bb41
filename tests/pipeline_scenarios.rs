//! End-to-end scenarios through the public API.

use std::sync::Arc;

use skinscope::config::AnalysisConfig;
use skinscope::pipeline::analysis::{
    AnalysisError, CanonicalPreprocessor, CanonicalSize, FeatureExtractor, HsvSkinSegmenter,
    ImagePreprocessor, MetricResult, MetricScorer, NoOpObserver, RawImage, RecommendationEngine,
    RuleTable, SkinAnalyzer, SkinSegmenter, StatisticalFeatureExtractor,
};

fn analyzer(size: CanonicalSize) -> SkinAnalyzer {
    SkinAnalyzer::from_config(&AnalysisConfig::default(), Arc::new(NoOpObserver))
        .with_canonical_size(size)
}

/// Deterministic pseudo-random skin-ish texture.
fn textured_skin(width: u32, height: u32) -> RawImage {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    let mut state: u32 = 0x2545_f491;
    for _ in 0..width * height {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let jitter = (state % 41) as i32 - 20;
        let px = [220 + jitter, 160 + jitter, 130 + jitter];
        data.extend(px.iter().map(|&v| v.clamp(0, 255) as u8));
    }
    RawImage::new(width, height, 3, data)
}

fn assert_bounded(m: &MetricResult) {
    for v in [m.score, m.moisture, m.oil, m.sensitivity] {
        assert!((0.0..=100.0).contains(&v), "metric out of range: {v}");
        assert_eq!((v * 100.0).round() / 100.0, v, "not rounded to 2 decimals: {v}");
    }
}

#[test]
fn uniform_skin_tone_covers_everything_with_zero_score() {
    let report = analyzer(CanonicalSize::Analysis)
        .analyze(&RawImage::filled(224, 224, &[220, 160, 130]))
        .unwrap();

    assert_eq!(report.coverage, 1.0);
    assert_eq!(report.features.texture_energy, 0.0);
    assert_eq!(report.metrics.score, 0.0);
    assert!(!report.low_confidence);
    assert_bounded(&report.metrics);
}

#[test]
fn saturated_bright_skin_reaches_full_moisture() {
    let report = analyzer(CanonicalSize::Analysis)
        .analyze(&RawImage::filled(224, 224, &[255, 190, 150]))
        .unwrap();

    assert_eq!(report.coverage, 1.0);
    assert_eq!(report.metrics.moisture, 100.0);
    assert_bounded(&report.metrics);
}

#[test]
fn pure_blue_finds_no_skin_and_degenerate_metrics() {
    let pre = CanonicalPreprocessor::new(Arc::new(NoOpObserver));
    let processed = pre
        .preprocess(&RawImage::filled(80, 60, &[0, 0, 255]), CanonicalSize::Capture)
        .unwrap();
    let seg = HsvSkinSegmenter::new(Arc::new(NoOpObserver)).segment(&processed);
    assert_eq!(seg.coverage, 0.0);
    assert!(seg.skin.is_blank());
    assert_eq!((seg.mask.width(), seg.mask.height()), (640, 480));

    let extractor = StatisticalFeatureExtractor::new(Arc::new(NoOpObserver));
    let metrics = MetricScorer::new(Arc::new(NoOpObserver)).score(
        &extractor.extract(&seg.skin),
        &extractor.intensity_stats(&seg.skin),
    );
    assert_eq!(
        metrics,
        MetricResult {
            score: 0.0,
            moisture: 0.0,
            oil: 0.0,
            sensitivity: 0.0
        }
    );
}

#[test]
fn dry_oily_sensitive_metrics_produce_ordered_advice() {
    let engine = RecommendationEngine::new(RuleTable::standard(), Arc::new(NoOpObserver));
    let advice = engine.recommend(&MetricResult {
        score: 50.0,
        moisture: 20.0,
        oil: 80.0,
        sensitivity: 60.0,
    });
    let messages = advice.messages();

    let hydrate = messages.iter().position(|m| m.contains("hydrating")).unwrap();
    let oil = messages.iter().position(|m| m.contains("oil-control")).unwrap();
    let gentle = messages.iter().position(|m| m.contains("gentle")).unwrap();
    assert!(hydrate < oil && oil < gentle);
    assert!(messages.iter().all(|m| !m.contains("maintain")));
}

#[test]
fn repeated_analysis_is_bit_identical() {
    let image = textured_skin(96, 72);
    let analyzer = analyzer(CanonicalSize::Analysis);
    let first = analyzer.analyze(&image).unwrap();
    let second = analyzer.analyze(&image).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn textured_skin_has_positive_texture_and_bounded_metrics() {
    let report = analyzer(CanonicalSize::Analysis)
        .analyze(&textured_skin(224, 224))
        .unwrap();
    assert!(report.features.texture_energy > 0.0);
    assert!(report.coverage > 0.5);
    assert_bounded(&report.metrics);
    assert!((0.0..=100.0).contains(&report.severity));
}

#[test]
fn batch_matches_sequential_analysis() {
    let images = vec![
        textured_skin(50, 40),
        RawImage::filled(30, 30, &[0, 0, 255]),
        RawImage::filled(30, 30, &[128]),
    ];
    let analyzer = analyzer(CanonicalSize::Analysis);
    let batch = analyzer.analyze_batch(&images);
    for (image, result) in images.iter().zip(batch) {
        assert_eq!(result.unwrap(), analyzer.analyze(image).unwrap());
    }
}

#[test]
fn malformed_inputs_are_rejected() {
    let analyzer = analyzer(CanonicalSize::Analysis);

    let err = analyzer.analyze(&RawImage::new(0, 0, 3, vec![])).unwrap_err();
    assert!(matches!(err, AnalysisError::UnreadableImage(_)));

    let err = analyzer.analyze(&RawImage::new(3, 3, 3, vec![0; 5])).unwrap_err();
    assert!(matches!(err, AnalysisError::UnreadableImage(_)));

    let err = analyzer.analyze(&RawImage::new(3, 3, 5, vec![0; 45])).unwrap_err();
    assert_eq!(err, AnalysisError::UnsupportedChannelLayout(5));
}

#[test]
fn decoded_rgba_image_converts_and_analyzes() {
    let rgba = image::RgbaImage::from_pixel(40, 30, image::Rgba([220, 160, 130, 128]));
    let raw = RawImage::from(&image::DynamicImage::ImageRgba8(rgba));
    assert_eq!(raw.channels(), 4);

    let report = analyzer(CanonicalSize::Capture).analyze(&raw).unwrap();
    assert_eq!((report.width, report.height), (640, 480));
    assert_eq!(report.coverage, 1.0);
}

#[test]
fn model_input_is_analysis_sized() {
    let input = analyzer(CanonicalSize::Capture)
        .model_input(&textured_skin(64, 64))
        .unwrap();
    assert_eq!((input.width, input.height), (224, 224));
    assert_eq!(input.data.len(), 224 * 224 * 3);
}
