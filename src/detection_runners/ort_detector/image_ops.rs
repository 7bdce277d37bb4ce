//! Functions to preprocess images.

use anyhow::{bail, Result};
use fast_image_resize::{
    images::{CroppedImageMut, Image as FirImage, ImageRef},
    pixels::PixelType,
    FilterType, ResizeAlg, ResizeOptions, Resizer,
};
use image::RgbImage;
use ndarray::Array4;
use crate::data::ImageTransformInfo;

/// Fill value of the letterbox border.
pub const PAD_VALUE: u8 = 0;

/// Resizes `img` into the network input described by `info` and returns a
/// normalized `[1, 3, H, W]` tensor with channels in BGR order.
pub fn preprocess(img: &RgbImage, info: &ImageTransformInfo, mean: [f32; 3], std: [f32; 3]) -> Result<Array4<f32>> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        bail!("Cannot preprocess an empty image");
    }
    if (w, h) != (info.width_src, info.height_src) {
        bail!(
            "Image is {}x{}, transform was computed for {}x{}",
            w, h, info.width_src, info.height_src
        );
    }

    let resized = letterbox_image(img, info)?;
    nchw_normalize(&resized, mean, std)
}

fn letterbox_image(img: &RgbImage, info: &ImageTransformInfo) -> Result<FirImage<'static>> {
    let src = ImageRef::new(img.width(), img.height(), img.as_raw(), PixelType::U8x3)?;
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    let mut resizer = Resizer::new();

    let mut padded = FirImage::from_vec_u8(
        info.width_dst,
        info.height_dst,
        vec![PAD_VALUE; (info.width_dst * info.height_dst * 3) as usize],
        PixelType::U8x3,
    )?;

    {
        let mut cropped = CroppedImageMut::new(
            &mut padded,
            info.width_pad,
            info.height_pad,
            info.width_resized,
            info.height_resized,
        )?;
        resizer.resize(&src, &mut cropped, &options)?;
    }

    Ok(padded)
}

fn nchw_normalize(img: &FirImage, mean: [f32; 3], std: [f32; 3]) -> Result<Array4<f32>> {
    let buf = img.buffer();
    let w = img.width() as usize;
    let h = img.height() as usize;

    if buf.len() != w * h * 3 {
        bail!("Unexpected buffer size: got {}, expected {}", buf.len(), w * h * 3);
    }

    let hw = w * h;
    let mut out = vec![0.0f32; buf.len()];

    for i in 0..hw {
        let r = buf[3 * i] as f32;
        let g = buf[3 * i + 1] as f32;
        let b = buf[3 * i + 2] as f32;

        out[i] = (b - mean[0]) / std[0];
        out[i + hw] = (g - mean[1]) / std[1];
        out[i + 2 * hw] = (r - mean[2]) / std[2];
    }

    Ok(Array4::from_shape_vec((1, 3, h, w), out)?)
}
