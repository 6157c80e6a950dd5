// Per-method score normalization onto [0, 1]

/// Min-max normalize `scores`, preserving input order.
///
/// A single score, or a set whose scores are all equal, maps to 1.0 so a
/// lone or undifferentiated hit keeps full weight.
pub fn min_max(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }

    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    if !range.is_finite() || range == 0.0 {
        return vec![1.0; scores.len()];
    }

    scores
        .iter()
        .map(|score| ((score - min) / range).clamp(0.0, 1.0))
        .collect()
}
