use ndarray::Array1;

/// Numerically stable softmax. Returns an empty array for empty input.
pub(crate) fn softmax(logits: &Array1<f32>) -> Array1<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps = logits.mapv(|x| (x - max).exp());
    let sum = exps.sum();
    if sum > 0.0 && sum.is_finite() {
        exps / sum
    } else {
        Array1::zeros(logits.len())
    }
}

/// Index and value of the largest element, ignoring NaN.
pub(crate) fn argmax(values: &Array1<f32>) -> Option<(usize, f32)> {
    values
        .iter()
        .cloned()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&array![-4.2f32, 4.6]);
        assert!((probs.sum() - 1.0).abs() < 1e-6);
        assert!(probs[1] > 0.99);
    }

    #[test]
    fn test_softmax_large_logits() {
        let probs = softmax(&array![1000.0f32, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&array![0.1f32, 0.7, 0.2]), Some((1, 0.7)));
        assert_eq!(argmax(&Array1::<f32>::zeros(0)), None);
    }
}
