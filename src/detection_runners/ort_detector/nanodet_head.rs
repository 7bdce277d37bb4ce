//! Decoding of NanoDet network outputs into detections in network input coordinates.

use anyhow::{bail, Result};
use ndarray::{s, ArrayView1, ArrayView2, ArrayViewD, Axis, Ix2};
use rayon::prelude::*;
use crate::common::Detection;
use crate::detection_runners::ort_detector::nms::non_max_suppression;

/// Row length of exports that already ran box decoding and NMS.
pub const DECODED_ROW_LEN: usize = 6;

// Tried in order when the configured strides do not match the output
const KNOWN_STRIDES: [&[u32]; 2] = [&[8, 16, 32, 64], &[8, 16, 32]];

#[derive(Debug, Clone, PartialEq)]
pub struct DecodeParams {
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub reg_max: usize,
    pub strides: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputLayout {
    /// Rows of `x1, y1, x2, y2, score, class`, already suppressed.
    Decoded,
    /// Raw head output: class scores followed by `4 * (reg_max + 1)` distribution bins per point.
    Head { num_classes: usize, strides: Vec<u32> },
}

/// Drops the batch axis, leaving one row per candidate.
pub fn as_rows(output: ArrayViewD<'_, f32>) -> Result<ArrayView2<'_, f32>> {
    let rows = match output.ndim() {
        2 => output.into_dimensionality::<Ix2>()?,
        3 if output.shape()[0] == 1 => output.index_axis_move(Axis(0), 0).into_dimensionality::<Ix2>()?,
        _ => bail!("Unexpected network output shape {:?}", output.shape()),
    };
    Ok(rows)
}

/// Number of center priors the head produces for an input size and stride set.
pub fn count_points(input_h: u32, input_w: u32, strides: &[u32]) -> usize {
    strides
        .iter()
        .map(|&s| (input_h.div_ceil(s) * input_w.div_ceil(s)) as usize)
        .sum()
}

pub fn detect_layout(num_rows: usize, row_len: usize, input_h: u32, input_w: u32, params: &DecodeParams) -> Result<OutputLayout> {
    if row_len == DECODED_ROW_LEN {
        return Ok(OutputLayout::Decoded);
    }

    let reg_len = 4 * (params.reg_max + 1);
    if row_len <= reg_len {
        bail!(
            "Output rows have {} values, a NanoDet head with reg_max {} needs more than {}",
            row_len, params.reg_max, reg_len
        );
    }

    let candidates = std::iter::once(params.strides.as_slice()).chain(KNOWN_STRIDES);
    for strides in candidates {
        if count_points(input_h, input_w, strides) == num_rows {
            if strides != params.strides.as_slice() {
                log::debug!("Output matches strides {:?} rather than configured {:?}", strides, params.strides);
            }
            return Ok(OutputLayout::Head {
                num_classes: row_len - reg_len,
                strides: strides.to_vec(),
            });
        }
    }

    bail!(
        "Output has {} points, expected {} for a {}x{} input with strides {:?}",
        num_rows,
        count_points(input_h, input_w, &params.strides),
        input_h,
        input_w,
        params.strides
    )
}

/// Decodes a network output, filtering by `score_threshold`.
///
/// Result is in network input coordinates, sorted by descending confidence.
pub fn decode(
    output: ArrayViewD<'_, f32>,
    input_h: u32,
    input_w: u32,
    params: &DecodeParams,
    score_threshold: f32,
) -> Result<Vec<Detection>> {
    let rows = as_rows(output)?;
    let (num_rows, row_len) = rows.dim();

    let mut ys = match detect_layout(num_rows, row_len, input_h, input_w, params)? {
        OutputLayout::Decoded => decode_rows(rows, score_threshold),
        OutputLayout::Head { num_classes, strides } => {
            let priors = center_priors(input_h, input_w, &strides);
            let candidates = decode_head(
                rows,
                &priors,
                num_classes,
                params.reg_max,
                (input_w as f32, input_h as f32),
                score_threshold,
            );
            non_max_suppression(candidates, params.iou_threshold, params.max_detections)
        }
    };

    ys.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    Ok(ys)
}

fn decode_rows(rows: ArrayView2<'_, f32>, score_threshold: f32) -> Vec<Detection> {
    rows.axis_iter(Axis(0))
        .filter_map(|row| {
            let score = row[4];
            // NaN scores fail this test too
            if !(score >= score_threshold) {
                return None;
            }
            // coordinates, score and class must all be finite
            if !row.iter().all(|v| v.is_finite()) || row[5] < 0. {
                return None;
            }
            Some(
                Detection::default()
                    .with_x1y1_x2y2(row[0], row[1], row[2], row[3])
                    .with_confidence(score)
                    .with_class_id(row[5].round() as usize),
            )
        })
        .collect()
}

/// `(cx, cy, stride)` for every head point, levels in stride order, row-major within a level.
pub fn center_priors(input_h: u32, input_w: u32, strides: &[u32]) -> Vec<(f32, f32, f32)> {
    let mut priors = Vec::with_capacity(count_points(input_h, input_w, strides));
    for &stride in strides {
        let (fh, fw) = (input_h.div_ceil(stride), input_w.div_ceil(stride));
        for row in 0..fh {
            for col in 0..fw {
                priors.push(((col * stride) as f32, (row * stride) as f32, stride as f32));
            }
        }
    }
    priors
}

/// Expected value of the softmax distribution over bin indices.
pub fn distribution_integral(bins: ArrayView1<'_, f32>) -> f32 {
    let max = bins.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let (mut sum, mut acc) = (0f32, 0f32);
    for (i, &b) in bins.iter().enumerate() {
        let e = (b - max).exp();
        sum += e;
        acc += e * i as f32;
    }
    acc / sum
}

fn decode_head(
    rows: ArrayView2<'_, f32>,
    priors: &[(f32, f32, f32)],
    num_classes: usize,
    reg_max: usize,
    (input_w, input_h): (f32, f32),
    score_threshold: f32,
) -> Vec<Detection> {
    let reg_len = reg_max + 1;

    priors
        .par_iter()
        .enumerate()
        .filter_map(|(i, &(cx, cy, stride))| {
            let row = rows.row(i);

            let (class_id, score) = row
                .slice(s![..num_classes])
                .iter()
                .copied()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(&b.1))?;

            if !(score >= score_threshold) || !score.is_finite() {
                return None;
            }

            // left, top, right, bottom
            let mut d = [0f32; 4];
            for (k, dk) in d.iter_mut().enumerate() {
                let start = num_classes + k * reg_len;
                *dk = distribution_integral(row.slice(s![start..start + reg_len])) * stride;
            }
            if !d.iter().all(|v| v.is_finite()) {
                return None;
            }

            Some(
                Detection::default()
                    .with_x1y1_x2y2(
                        (cx - d[0]).clamp(0., input_w),
                        (cy - d[1]).clamp(0., input_h),
                        (cx + d[2]).clamp(0., input_w),
                        (cy + d[3]).clamp(0., input_h),
                    )
                    .with_class_id(class_id)
                    .with_confidence(score),
            )
        })
        .collect()
}
