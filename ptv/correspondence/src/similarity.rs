use ptv_types::{SearchVolume, Target};

/// `min / max` of two non-negative values, 1.0 when both are zero.
pub(crate) fn ratio(a: f64, b: f64) -> f64 {
    let hi = a.max(b);
    if hi <= 0.0 { 1.0 } else { a.min(b) / hi }
}

fn passes(threshold: f64, a: f64, b: f64) -> bool {
    threshold <= 0.0 || ratio(a, b) >= threshold
}

/// Whether two targets look alike enough to be images of one particle.
pub(crate) fn targets_similar(volume: &SearchVolume, a: &Target, b: &Target) -> bool {
    passes(
        volume.min_pixel_count_ratio,
        a.num_pixels.into(),
        b.num_pixels.into(),
    ) && passes(
        volume.min_bbox_x_ratio,
        a.bbox_width.into(),
        b.bbox_width.into(),
    ) && passes(
        volume.min_bbox_y_ratio,
        a.bbox_height.into(),
        b.bbox_height.into(),
    ) && passes(volume.min_gray_ratio, a.sum_gray, b.sum_gray)
}

/// Mean pairwise gray-sum ratio of a set of targets.
///
/// A single target is perfectly similar to itself.
pub(crate) fn gray_similarity(targets: &[&Target]) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for (i, a) in targets.iter().enumerate() {
        for b in targets[i + 1..].iter() {
            sum += ratio(a.sum_gray, b.sum_gray);
            n += 1;
        }
    }
    if n == 0 { 1.0 } else { sum / n as f64 }
}
