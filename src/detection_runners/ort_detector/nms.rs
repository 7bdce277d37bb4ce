pub trait Nms {
    fn iou(&self, other: &Self) -> f32;
    fn confidence(&self) -> f32;
    fn class_id(&self) -> usize;
}

/// Greedy class-aware suppression.
///
/// Keeps candidates in descending confidence, dropping any candidate whose IoU
/// with an already kept candidate of the same class exceeds `iou_threshold`.
/// At most `max_keep` candidates survive. Equal confidences keep input order.
pub fn non_max_suppression<T: Nms>(mut xs: Vec<T>, iou_threshold: f32, max_keep: usize) -> Vec<T> {
    xs.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));

    let mut kept: Vec<T> = Vec::with_capacity(xs.len().min(max_keep));
    for x in xs {
        if kept.len() >= max_keep {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id() == x.class_id() && k.iou(&x) > iou_threshold);
        if !suppressed {
            kept.push(x);
        }
    }
    kept
}
