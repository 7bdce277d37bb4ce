use image::{Rgb, RgbImage};
use ndarray::Array3;
use nanodet_detect::{ModelConfig, ModelHandle};

use stub_network::StubNetwork;

#[test]
fn no_detections_from_silent_head() {
    /////////////////////
    // Testing variables
    let loop_count: u32 = 3;
    let (height, width) = (320, 320);
    let num_classes = 80;
    let reg_max = 7;
    /////////////////////

    // 40*40 + 20*20 + 10*10 + 5*5 points for strides 8, 16, 32, 64
    let points = 2125;
    let head = Array3::<f32>::zeros((1, points, num_classes + 4 * (reg_max + 1)));
    let stub = StubNetwork::with_output(head.into_dyn(), (height, width));

    let config = ModelConfig::new("nanodet-plus-m_320.onnx", "cpu", height, width, 0.35);
    let handle = ModelHandle::from_network(Box::new(stub), &config).unwrap();

    let blank = RgbImage::from_pixel(960, 540, Rgb([0, 0, 0]));
    for _ in 0..loop_count {
        let result = handle.infer(&blank).unwrap();
        assert_eq!(result.len(), 0);
    }
}

#[test]
fn no_detections_below_threshold() {
    let rows = [
        [10., 10., 50., 50., 0.34, 0.],
        [60., 60., 90., 90., f32::NAN, 1.],
    ];
    let stub = StubNetwork::with_rows(&rows, (416, 416));
    let config = ModelConfig::new("nanodet-m_416.onnx", "cpu", 416, 416, 0.35);
    let handle = ModelHandle::from_network(Box::new(stub), &config).unwrap();

    let img = RgbImage::from_pixel(300, 200, Rgb([255, 255, 255]));
    assert!(handle.infer(&img).unwrap().is_empty());
}

#[test]
fn head_with_three_levels_is_recognized() {
    // 40*40 + 20*20 + 10*10, the original NanoDet layout without the stride 64 level
    let head = Array3::<f32>::zeros((1, 2100, 80 + 32)).into_dyn();
    let stub = StubNetwork::with_output(head, (320, 320));
    let config = ModelConfig::new("nanodet-m.onnx", "cpu", 320, 320, 0.35);
    let handle = ModelHandle::from_network(Box::new(stub), &config).unwrap();

    let img = RgbImage::from_pixel(320, 320, Rgb([10, 20, 30]));
    assert!(handle.infer(&img).unwrap().is_empty());
}

#[test]
fn non_finite_network_output_is_dropped() {
    let rows = [
        [f32::NAN, 10., 100., 100., 0.9, 0.],
        [10., 10., f32::INFINITY, 100., 0.8, 1.],
        [10., 10., 100., 100., f32::INFINITY, 2.],
        [10., 10., 100., 100., 0.7, f32::NAN],
        [f32::NEG_INFINITY, f32::NEG_INFINITY, f32::INFINITY, f32::INFINITY, 0.6, 3.],
    ];
    let stub = StubNetwork::with_rows(&rows, (320, 320));
    let config = ModelConfig::new("nanodet-plus-m_320.onnx", "cpu", 320, 320, 0.35);
    let handle = ModelHandle::from_network(Box::new(stub), &config).unwrap();

    let img = RgbImage::from_pixel(640, 480, Rgb([40, 40, 40]));
    let result = handle.infer(&img).unwrap();
    assert!(result.is_empty(), "{:?}", result);
}
