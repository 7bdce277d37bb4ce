use crate::common::DetectionBox;

/// Geometry of the resize (and optional letterbox) applied before the network.
///
/// Letterboxing is symmetric: the resized image sits in the middle of the
/// network input, left/top padding is the floor of half the remainder.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImageTransformInfo {
    pub width_src: u32,
    pub height_src: u32,
    pub width_dst: u32,
    pub height_dst: u32,
    /// Size of the resized image inside the destination
    pub width_resized: u32,
    pub height_resized: u32,
    pub width_scale: f32,
    pub height_scale: f32,
    pub width_pad: u32,
    pub height_pad: u32,
}

impl ImageTransformInfo {
    pub fn new(width_src: u32, height_src: u32, width_dst: u32, height_dst: u32, keep_ratio: bool) -> Self {
        let (width_resized, height_resized) = if keep_ratio {
            let ratio = (width_dst as f32 / width_src as f32).min(height_dst as f32 / height_src as f32);
            (
                ((width_src as f32 * ratio).round() as u32).clamp(1, width_dst),
                ((height_src as f32 * ratio).round() as u32).clamp(1, height_dst),
            )
        } else {
            (width_dst, height_dst)
        };

        Self {
            width_src,
            height_src,
            width_dst,
            height_dst,
            width_resized,
            height_resized,
            width_scale: width_resized as f32 / width_src as f32,
            height_scale: height_resized as f32 / height_src as f32,
            width_pad: (width_dst - width_resized) / 2,
            height_pad: (height_dst - height_resized) / 2,
        }
    }

    pub fn is_letterboxed(&self) -> bool {
        self.width_resized != self.width_dst || self.height_resized != self.height_dst
    }

    /// Maps a box from network input coordinates back to the source image and clamps it.
    pub fn invert_box(&self, bbox: &DetectionBox) -> DetectionBox {
        let (px, py) = (self.width_pad as f32, self.height_pad as f32);
        DetectionBox::new(
            (bbox.x1 - px) / self.width_scale,
            (bbox.y1 - py) / self.height_scale,
            (bbox.x2 - px) / self.width_scale,
            (bbox.y2 - py) / self.height_scale,
        )
        .clamp_to(self.width_src as f32, self.height_src as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letterbox_landscape_pads_vertically() {
        let t = ImageTransformInfo::new(640, 480, 320, 320, true);
        assert_eq!((t.width_resized, t.height_resized), (320, 240));
        assert_eq!((t.width_pad, t.height_pad), (0, 40));
        assert!((t.width_scale - 0.5).abs() < 1e-6);
        assert!((t.height_scale - 0.5).abs() < 1e-6);
        assert!(t.is_letterboxed());
    }

    #[test]
    fn direct_resize_has_no_padding() {
        let t = ImageTransformInfo::new(640, 480, 320, 320, false);
        assert_eq!((t.width_pad, t.height_pad), (0, 0));
        assert!((t.width_scale - 0.5).abs() < 1e-6);
        assert!((t.height_scale - 320. / 480.).abs() < 1e-6);
        assert!(!t.is_letterboxed());
    }

    #[test]
    fn square_image_is_the_same_either_way() {
        let a = ImageTransformInfo::new(500, 500, 320, 320, true);
        let b = ImageTransformInfo::new(500, 500, 320, 320, false);
        assert_eq!(a, b);
    }

    #[test]
    fn invert_undoes_forward_mapping() {
        let t = ImageTransformInfo::new(640, 480, 320, 320, true);
        // (100, 50, 300, 350) in the source
        let input = DetectionBox::new(50., 65., 150., 215.);
        let back = t.invert_box(&input);
        assert!((back.x1 - 100.).abs() < 1e-3);
        assert!((back.y1 - 50.).abs() < 1e-3);
        assert!((back.w - 200.).abs() < 1e-3);
        assert!((back.h - 300.).abs() < 1e-3);
    }

    #[test]
    fn invert_clamps_into_padding_area() {
        let t = ImageTransformInfo::new(640, 480, 320, 320, true);
        let back = t.invert_box(&DetectionBox::new(-10., 0., 330., 320.));
        assert_eq!((back.x1, back.y1), (0., 0.));
        assert_eq!((back.x2, back.y2), (640., 480.));
    }
}
