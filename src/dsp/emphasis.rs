//! First-order pre-emphasis filter and its exact inverse.

/// `y[n] = x[n] - coeff * x[n-1]`, starting from a zero state.
pub fn preemphasis(signal: &[f32], coeff: f32) -> Vec<f32> {
    let mut prev = 0.0f32;
    signal
        .iter()
        .map(|&x| {
            let y = x - coeff * prev;
            prev = x;
            y
        })
        .collect()
}

/// `y[n] = x[n] + coeff * y[n-1]`, undoing [`preemphasis`] with the same coefficient.
pub fn deemphasis(signal: &[f32], coeff: f32) -> Vec<f32> {
    let mut prev = 0.0f32;
    signal
        .iter()
        .map(|&x| {
            prev = x + coeff * prev;
            prev
        })
        .collect()
}
