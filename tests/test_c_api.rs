use std::ffi::{CStr, CString};
use std::os::raw::c_void;
use std::ptr;
use std::sync::Arc;
use image::{Rgb, RgbImage};
use nanodet_detect::data::ImageTransformInfo;
use nanodet_detect::extern_c_api::*;
use nanodet_detect::{ModelConfig, NanodetRunner};

use stub_network::{source_rows, StubNetwork};

fn last_message() -> String {
    let msg = nanodet_last_error_message();
    assert!(!msg.is_null());
    unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
}

/// A C model struct backed by a stub network, as a successful load would leave it.
fn stub_model(rows: &[[f32; 6]]) -> NanodetModel {
    model_with_network(StubNetwork::with_rows(rows, (320, 320)))
}

fn model_with_network(stub: StubNetwork) -> NanodetModel {
    let config = ModelConfig::new("stub.onnx", "cpu", 320, 320, 0.35);
    let runner = NanodetRunner::from_network(Box::new(stub), &config).unwrap();
    NanodetModel {
        network: Box::into_raw(Box::new(runner)) as *mut c_void,
        device: CString::new("cpu").unwrap().into_raw(),
        score_threshold: 0.35,
        input_size: [320, 320],
        keep_ratio: 1,
    }
}

fn write_scene(dir: &tempfile::TempDir) -> CString {
    let path = dir.path().join("scene.png");
    RgbImage::from_fn(640, 480, |x, y| Rgb([(x % 200) as u8, (y % 200) as u8, 90]))
        .save(&path)
        .unwrap();
    CString::new(path.to_str().unwrap()).unwrap()
}

#[test]
fn failed_load_leaves_model_unloaded() {
    let path = CString::new("/nonexistent/nanodet.onnx").unwrap();
    let device = CString::new("cpu").unwrap();
    // stale contents must be ignored, not freed
    let mut model = NanodetModel {
        network: 0x10 as *mut c_void,
        device: 0x20 as *mut _,
        score_threshold: 7.,
        input_size: [1, 1],
        keep_ratio: 3,
    };

    unsafe { load_nanodet_model(path.as_ptr() as *mut _, device.as_ptr() as *mut _, 320, 320, 0.35, &mut model) };

    assert_eq!(nanodet_last_error_code(), 1);
    assert!(last_message().contains("does not exist"));
    assert!(model.network.is_null());
    assert!(model.device.is_null());

    unsafe { free_nanodet_model(&mut model) };
    assert_eq!(nanodet_last_error_code(), NANODET_OK);
}

#[test]
fn null_arguments_are_rejected() {
    let mut model = NanodetModel::unloaded();
    unsafe { load_nanodet_model(ptr::null_mut(), ptr::null_mut(), 320, 320, 0.35, &mut model) };
    assert_eq!(nanodet_last_error_code(), NANODET_ERR_INVALID_ARGUMENT);
    assert!(model.network.is_null());

    let result = unsafe { infer_nanodet(ptr::null_mut(), ptr::null_mut()) };
    assert_eq!(nanodet_last_error_code(), NANODET_ERR_INVALID_ARGUMENT);
    assert!(result.starting_pointer.is_null());

    unsafe { free_detections(ptr::null_mut()) };
    assert_eq!(nanodet_last_error_code(), NANODET_ERR_INVALID_ARGUMENT);
}

#[test]
fn non_positive_geometry_fails_to_load() {
    let path = CString::new("/nonexistent/nanodet.onnx").unwrap();
    let device = CString::new("cpu").unwrap();
    let mut model = NanodetModel::unloaded();
    unsafe { load_nanodet_model_keep_ratio(path.as_ptr() as *mut _, device.as_ptr() as *mut _, 0, 320, 0.35, 0, &mut model) };
    assert_eq!(nanodet_last_error_code(), 1);
    assert!(model.network.is_null());
}

#[test]
fn infer_on_unloaded_model_is_a_usage_error() {
    let mut model = NanodetModel::unloaded();
    let mut image = OpendrImage { data: ptr::null_mut() };
    let result = unsafe { infer_nanodet(&mut model, &mut image) };
    assert_eq!(nanodet_last_error_code(), 4);
    assert!(result.starting_pointer.is_null());
    assert_eq!(result.size, 0);
}

#[test]
fn free_is_idempotent() {
    let mut model = stub_model(&[]);
    unsafe {
        free_nanodet_model(&mut model);
        assert_eq!(nanodet_last_error_code(), NANODET_OK);
        assert!(model.network.is_null());
        assert!(model.device.is_null());

        free_nanodet_model(&mut model);
        assert_eq!(nanodet_last_error_code(), NANODET_OK);
    }
}

#[test]
fn repeated_load_and_free_releases_everything() {
    let token = Arc::new(());
    for _ in 0..200 {
        let mut model = model_with_network(StubNetwork::with_rows(&[], (320, 320)).with_token(token.clone()));
        assert!(!model.network.is_null());
        assert!(!model.device.is_null());
        assert_eq!(Arc::strong_count(&token), 2);

        unsafe { free_nanodet_model(&mut model) };
        assert_eq!(nanodet_last_error_code(), NANODET_OK);
        assert!(model.network.is_null());
        assert!(model.device.is_null());
        assert_eq!(Arc::strong_count(&token), 1);
    }
}

#[test]
fn detections_round_trip_through_c() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scene(&dir);
    let info = ImageTransformInfo::new(640, 480, 320, 320, true);
    let rows = source_rows(
        &[(0, 0.9, [100., 50., 300., 350.]), (2, 0.6, [350., 200., 600., 400.]), (5, 0.1, [0., 0., 10., 10.])],
        &info,
    );
    let mut model = stub_model(&rows);
    let mut image = OpendrImage { data: ptr::null_mut() };
    let mut detections = OpendrDetectionVectorTarget { starting_pointer: 0x30 as *mut _, size: 9 };

    unsafe {
        initialize_detections(&mut detections);
        assert!(detections.starting_pointer.is_null());
        assert_eq!(detections.size, 0);

        load_image(path.as_ptr(), &mut image);
        assert_eq!(nanodet_last_error_code(), NANODET_OK);
        assert!(!image.data.is_null());

        detections = infer_nanodet(&mut model, &mut image);
        assert_eq!(nanodet_last_error_code(), NANODET_OK);
        assert_eq!(detections.size, 2);

        let targets = std::slice::from_raw_parts(detections.starting_pointer, detections.size as usize);
        assert_eq!(targets[0].name, 0);
        assert!((targets[0].left - 100.).abs() < 1.);
        assert!((targets[0].top - 50.).abs() < 1.);
        assert!((targets[0].width - 200.).abs() < 1.);
        assert!((targets[0].height - 300.).abs() < 1.);
        assert!(targets[0].score >= targets[1].score);

        // raising the threshold on the struct applies to the next call
        model.score_threshold = 0.8;
        let mut strict = infer_nanodet(&mut model, &mut image);
        assert_eq!(strict.size, 1);
        free_detections(&mut strict);

        let out = dir.path().join("drawn.png");
        let out = CString::new(out.to_str().unwrap()).unwrap();
        draw_bboxes(&mut image, &mut model, &mut detections);
        assert_eq!(nanodet_last_error_code(), NANODET_OK);
        assert_eq!(save_image(out.as_ptr(), &mut image), NANODET_OK);

        free_detections(&mut detections);
        assert!(detections.starting_pointer.is_null());
        assert_eq!(detections.size, 0);
        free_detections(&mut detections);
        assert_eq!(nanodet_last_error_code(), NANODET_OK);

        free_image(&mut image);
        assert!(image.data.is_null());
        free_nanodet_model(&mut model);
    }
}

#[test]
fn draw_requires_loaded_model_and_image() {
    let mut detections = OpendrDetectionVectorTarget::empty();
    let mut image = OpendrImage { data: ptr::null_mut() };
    let mut unloaded = NanodetModel::unloaded();
    unsafe {
        draw_bboxes(&mut image, &mut unloaded, &mut detections);
        assert_eq!(nanodet_last_error_code(), 3);

        let mut model = stub_model(&[]);
        draw_bboxes(&mut image, &mut model, &mut detections);
        assert_eq!(nanodet_last_error_code(), 3);
        free_nanodet_model(&mut model);
    }
}

#[test]
fn missing_image_file_reports_io_error() {
    let path = CString::new("/nonexistent/street.jpg").unwrap();
    let mut image = OpendrImage { data: 0x40 as *mut c_void };
    unsafe { load_image(path.as_ptr(), &mut image) };
    assert_eq!(nanodet_last_error_code(), NANODET_ERR_IMAGE_IO);
    assert!(image.data.is_null());
    assert!(last_message().contains("street.jpg"));
}

#[test]
fn logging_can_be_initialized_twice() {
    nanodet_init_logging();
    nanodet_init_logging();
}
