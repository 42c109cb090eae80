// tests/library_tests.rs
use cardscan_cv::detection::DegradedGridConfig;
use cardscan_cv::template::TemplateConfig;
use cardscan_cv::traits::Detector;
use cardscan_cv::{
    ArtifactRegistry, CascadeDetector, DetectionConfig, SourceMethod, TemplateLoader, TemplateMatcher,
};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Striped card face with a diagonal, distinct enough to match uniquely
fn patterned_card(width: u32, height: u32, phase: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        if x == y || (y + phase) % 6 < 2 {
            Rgb([20, 20, 20])
        } else if x < 3 || x + 3 >= width {
            Rgb([200, 30, 30])
        } else {
            Rgb([245, 245, 245])
        }
    })
}

fn noise_background(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    RgbImage::from_fn(width, height, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]))
}

fn save(dir: &Path, name: &str, image: &RgbImage) {
    image.save(dir.join(name)).unwrap();
}

#[test]
fn test_load_directory() {
    let dir = tempfile::tempdir().unwrap();
    save(dir.path(), "KS.png", &patterned_card(24, 34, 0));
    save(dir.path(), "joker_sun.png", &RgbImage::from_pixel(24, 34, Rgb([255, 220, 40])));
    fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
    fs::create_dir(dir.path().join("nested.png")).unwrap();

    let library = TemplateLoader::new()
        .add_template_dir(dir.path())
        .load_library(&TemplateConfig::default())
        .unwrap();

    assert_eq!(library.labels().collect::<Vec<_>>(), vec!["KS", "joker_sun"]);
    assert_eq!(library.len(), 2);
}

#[test]
fn test_missing_directory_is_skipped() {
    let library = TemplateLoader::new()
        .add_template_dir("/nonexistent/cardscan/refs")
        .load_library(&TemplateConfig::default())
        .unwrap();
    assert!(library.is_empty());
}

#[test]
fn test_sprite_sheet_split() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = RgbImage::from_fn(13 * 8, 4 * 10, |x, y| {
        let index = (y / 10) * 13 + x / 8;
        Rgb([index as u8 * 4, 100, 200])
    });
    save(dir.path(), "13x4 Playing Cards.png", &sheet);

    let library = TemplateLoader::new()
        .add_template_dir(dir.path())
        .load_library(&TemplateConfig::default())
        .unwrap();

    assert_eq!(library.references().len(), 52);
    assert!(library.contains("2H"));
    assert!(library.contains("AS"));
    // King of spades is cell 50
    let king = &library.references()["KS"][0];
    assert_eq!(king.dimensions(), (8, 10));
    assert_eq!(king.get_pixel(0, 0).0, [200, 100, 200]);
}

#[test]
fn test_transparency_flattened_on_white() {
    let dir = tempfile::tempdir().unwrap();
    let mut sprite = RgbaImage::from_pixel(10, 14, Rgba([0, 0, 255, 255]));
    sprite.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
    sprite.save(dir.path().join("joker_blue.png")).unwrap();

    let library = TemplateLoader::new()
        .add_template_dir(dir.path())
        .load_library(&TemplateConfig::default())
        .unwrap();

    let reference = &library.references()["joker_blue"][0];
    assert_eq!(reference.get_pixel(0, 0).0, [255, 255, 255]);
    assert_eq!(reference.get_pixel(5, 5).0, [0, 0, 255]);
}

#[test]
fn test_template_found_in_noise() {
    let dir = tempfile::tempdir().unwrap();
    let king = patterned_card(24, 34, 0);
    save(dir.path(), "KS.png", &king);
    save(dir.path(), "QH.png", &patterned_card(24, 34, 3));

    let mut scene = noise_background(200, 150, 7);
    image::imageops::replace(&mut scene, &king, 70, 50);

    let config = TemplateConfig::default();
    let library = TemplateLoader::new()
        .add_template_dir(dir.path())
        .load_library(&config)
        .unwrap();
    let matcher = TemplateMatcher::new(Arc::new(library), config);

    let found = matcher.infer(&scene).unwrap();
    assert_eq!(found[0].class_label, "KS");
    assert_eq!(found[0].region.as_array(), [70.0, 50.0, 94.0, 84.0]);
    assert!(found[0].score > 0.99);
    // Noise never correlates strongly with a card face
    assert!(found[1..].iter().all(|d| d.score < 0.5));
}

#[test]
fn test_degraded_cell_reports_every_card() {
    let dir = tempfile::tempdir().unwrap();
    let king = patterned_card(24, 34, 0);
    let queen = patterned_card(24, 34, 3);
    save(dir.path(), "KS.png", &king);
    save(dir.path(), "QH.png", &queen);

    let mut scene = noise_background(200, 120, 5);
    image::imageops::replace(&mut scene, &king, 20, 40);
    image::imageops::replace(&mut scene, &queen, 120, 40);

    let config = DetectionConfig {
        degraded_grid: DegradedGridConfig {
            columns: 1,
            rows: 1,
            overlap: 0.0,
        },
        ..Default::default()
    };
    let library = TemplateLoader::new()
        .add_template_dir(dir.path())
        .load_library(&config.template)
        .unwrap();
    let registry = Arc::new(ArtifactRegistry::new(Arc::new(library)));
    let detector = CascadeDetector::new(config, registry).unwrap();

    let found = detector.detect(&scene).unwrap();
    let summary: Vec<_> = found
        .iter()
        .map(|d| (d.class_label(), d.source_method(), d.region().as_array()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("KS", SourceMethod::Template, [20.0, 40.0, 44.0, 74.0]),
            ("QH", SourceMethod::Template, [120.0, 40.0, 144.0, 74.0]),
        ]
    );
}

#[test]
fn test_extra_extension() {
    let dir = tempfile::tempdir().unwrap();
    patterned_card(24, 34, 0).save(dir.path().join("KS.tiff")).unwrap();

    let default_loader = TemplateLoader::new().add_template_dir(dir.path());
    assert!(default_loader.load_library(&TemplateConfig::default()).unwrap().is_empty());

    let library = TemplateLoader::new()
        .add_template_dir(dir.path())
        .add_extension("TIFF")
        .load_library(&TemplateConfig::default())
        .unwrap();
    assert!(library.contains("KS"));
}

#[test]
fn test_loaded_library_drives_cascade() {
    let dir = tempfile::tempdir().unwrap();
    let king = patterned_card(24, 34, 0);
    save(dir.path(), "KS.png", &king);

    let mut scene = noise_background(200, 150, 11);
    image::imageops::replace(&mut scene, &king, 120, 20);

    let config = DetectionConfig {
        degraded_grid: DegradedGridConfig {
            columns: 1,
            rows: 1,
            overlap: 0.0,
        },
        ..Default::default()
    };
    let library = TemplateLoader::new()
        .add_template_dir(dir.path())
        .load_library(&config.template)
        .unwrap();
    let registry = Arc::new(ArtifactRegistry::new(Arc::new(library)));
    let detector = CascadeDetector::new(config, registry).unwrap();

    let found = detector.detect(&scene).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].class_label(), "KS");
    assert_eq!(found[0].source_method(), SourceMethod::Template);
    assert_eq!(found[0].region().as_array(), [120.0, 20.0, 144.0, 54.0]);
}

#[test]
fn test_detect_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ArtifactRegistry::new(Arc::new(Default::default())));
    let detector = CascadeDetector::new(DetectionConfig::default(), registry).unwrap();

    let path = dir.path().join("capture.png");
    noise_background(64, 48, 3).save(&path).unwrap();
    assert!(detector.detect_from_file(&path).unwrap().is_empty());

    let bogus = dir.path().join("bogus.png");
    fs::write(&bogus, b"definitely not a png").unwrap();
    assert!(matches!(
        detector.detect_from_file(&bogus),
        Err(cardscan_cv::CascadeError::MalformedInput(_))
    ));
}
