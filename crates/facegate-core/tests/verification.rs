mod common;

use common::{dir_listing, png_bytes, write_gray, write_rgb, SizeKeyedAnalyzer};
use facegate_core::{Authorizer, ErrorKind, Gallery, ImageSource, ImageValidator};
use tempfile::TempDir;

const PROBE: (u32, u32) = (200, 200);

/// Enrolls alice (100×100) and bob (110×100) and returns the authorizer
/// together with the loaded gallery.
fn enrolled(probe_faces: Vec<Vec<f32>>) -> (TempDir, Authorizer<SizeKeyedAnalyzer>, Gallery) {
    let tmp = TempDir::new().unwrap();
    let faces = tmp.path().join("authorized_faces");
    std::fs::create_dir(&faces).unwrap();
    write_rgb(&faces, "alice.png", (100, 100));
    write_rgb(&faces, "bob.png", (110, 100));

    let analyzer = SizeKeyedAnalyzer::new()
        .with_faces((100, 100), vec![vec![0.0, 0.0, 0.0]])
        .with_faces((110, 100), vec![vec![1.0, 0.0, 0.0]])
        .with_faces(PROBE, probe_faces);
    let mut auth = Authorizer::new(analyzer);
    let load = auth.load_gallery(&faces);
    assert_eq!(load.gallery.len(), 2);
    (tmp, auth, load.gallery)
}

#[test]
fn test_enrolled_face_is_granted() {
    let (tmp, mut auth, gallery) = enrolled(vec![vec![0.95, 0.1, 0.0]]);
    let probe = write_rgb(tmp.path(), "probe.png", PROBE);

    let result = auth.verify(&ImageSource::path(&probe), &gallery);

    assert!(result.authorized, "{}", result.message);
    assert_eq!(result.matched_source.as_deref(), Some("bob.png"));
    assert!(result.message.starts_with("Access Granted (Confidence: "));
    assert!(result.message.ends_with("%)"));
}

#[test]
fn test_identical_embedding_full_confidence() {
    let (tmp, mut auth, gallery) = enrolled(vec![vec![0.0, 0.0, 0.0]]);
    let probe = write_rgb(tmp.path(), "probe.jpg", PROBE);

    let result = auth.verify(&ImageSource::path(&probe), &gallery);

    assert!(result.authorized);
    assert_eq!(result.message, "Access Granted (Confidence: 100.00%)");
    assert_eq!(result.matched_source.as_deref(), Some("alice.png"));
}

#[test]
fn test_stranger_is_denied_with_closest_distance() {
    let (tmp, mut auth, gallery) = enrolled(vec![vec![0.0, 0.0, 2.0]]);
    let probe = write_rgb(tmp.path(), "probe.png", PROBE);

    let result = auth.verify(&ImageSource::path(&probe), &gallery);

    assert!(!result.authorized);
    assert_eq!(result.message, "Access Denied (Best match distance: 2.00)");
    assert_eq!(result.error, None);
}

#[test]
fn test_probe_without_face() {
    let (tmp, mut auth, gallery) = enrolled(vec![]);
    let probe = write_rgb(tmp.path(), "probe.png", PROBE);

    let result = auth.verify(&ImageSource::path(&probe), &gallery);

    assert!(!result.authorized);
    assert_eq!(result.message, "No face detected in the image");
}

#[test]
fn test_probe_with_two_faces_is_always_rejected() {
    let (tmp, mut auth, gallery) = enrolled(vec![vec![0.0, 0.0, 0.0], vec![1.0, 0.0, 0.0]]);
    let probe = write_rgb(tmp.path(), "probe.png", PROBE);

    let result = auth.verify(&ImageSource::path(&probe), &gallery);

    assert!(!result.authorized);
    assert_eq!(
        result.message,
        "Multiple faces detected. Please upload an image with a single face"
    );
    assert_eq!(result.error, Some(ErrorKind::MultipleFacesDetected));
}

#[test]
fn test_empty_gallery_denies_every_probe() {
    let tmp = TempDir::new().unwrap();
    let analyzer = SizeKeyedAnalyzer::new().with_faces(PROBE, vec![vec![0.0]]);
    let mut auth = Authorizer::new(analyzer);
    let load = auth.load_gallery(&tmp.path().join("does-not-exist"));

    let result = auth.verify(&ImageSource::bytes("upload.png", png_bytes(PROBE)), &load.gallery);

    assert!(!result.authorized);
    assert_eq!(result.message, "No authorized faces available for comparison");
}

#[test]
fn test_uploaded_bytes_are_verified() {
    let (_tmp, mut auth, gallery) = enrolled(vec![vec![0.1, 0.0, 0.0]]);

    let result = auth.verify(&ImageSource::bytes("upload.PNG", png_bytes(PROBE)), &gallery);

    assert!(result.authorized);
    assert_eq!(result.matched_source.as_deref(), Some("alice.png"));
}

#[test]
fn test_low_resolution_probe() {
    let (tmp, mut auth, gallery) = enrolled(vec![vec![0.0, 0.0, 0.0]]);
    let probe = write_rgb(tmp.path(), "small.png", (30, 30));

    let result = auth.verify(&ImageSource::path(&probe), &gallery);

    assert_eq!(result.error, Some(ErrorKind::InsufficientResolution));
    assert_eq!(
        result.message,
        "Image resolution is too low for reliable face detection"
    );
}

#[test]
fn test_custom_validator_floor() {
    let (tmp, auth, gallery) = enrolled(vec![vec![0.0, 0.0, 0.0]]);
    let mut auth = auth.with_validator(ImageValidator::new(300));
    let probe = write_rgb(tmp.path(), "probe.png", PROBE);

    let result = auth.verify(&ImageSource::path(&probe), &gallery);
    assert_eq!(result.error, Some(ErrorKind::InsufficientResolution));
}

#[test]
fn test_unsupported_extension() {
    let (tmp, mut auth, gallery) = enrolled(vec![vec![0.0, 0.0, 0.0]]);
    let probe = tmp.path().join("probe.gif");
    std::fs::write(&probe, b"GIF89a").unwrap();

    let result = auth.verify(&ImageSource::path(&probe), &gallery);
    assert_eq!(result.error, Some(ErrorKind::UnsupportedFormat));
}

#[test]
fn test_grayscale_probe_leaves_no_scratch_files() {
    let (tmp, mut auth, gallery) = enrolled(vec![vec![0.0, 0.0, 0.0]]);
    let probe = write_gray(tmp.path(), "probe.png", PROBE);
    let before = dir_listing(tmp.path());

    let result = auth.verify(&ImageSource::path(&probe), &gallery);

    assert!(result.authorized);
    assert_eq!(dir_listing(tmp.path()), before);
}

#[test]
fn test_capability_failure_is_reported_not_raised() {
    let tmp = TempDir::new().unwrap();
    let analyzer = SizeKeyedAnalyzer::new().failing_on(PROBE);
    let mut auth = Authorizer::new(analyzer);
    let probe = write_rgb(tmp.path(), "probe.png", PROBE);

    let result = auth.verify(&ImageSource::path(&probe), &Gallery::default());

    assert!(!result.authorized);
    assert_eq!(result.error, Some(ErrorKind::DetectionFailure));
    assert!(result
        .message
        .starts_with("Error during face verification: face detection failed"));
}

#[test]
fn test_verify_is_deterministic() {
    let (tmp, mut auth, gallery) = enrolled(vec![vec![0.5, 0.0, 0.0]]);
    let probe = ImageSource::path(write_rgb(tmp.path(), "probe.png", PROBE));

    let first = auth.verify(&probe, &gallery);
    for _ in 0..5 {
        assert_eq!(auth.verify(&probe, &gallery), first);
    }
}
