//! Embedding vector math.
//!
//! All accumulation runs in f64 so results are stable across platforms and
//! reproducible in tests.

/// Computes cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths, empty input, or a zero vector, so a
/// degenerate embedding can never look like a match.
pub fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for i in 0..a.len() {
        let x = a[i] as f64;
        let y = b[i] as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

/// Returns the L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    let mut sum = 0.0f64;
    for &x in v {
        sum += (x as f64) * (x as f64);
    }
    sum.sqrt() as f32
}

/// L2-normalizes a vector to unit length in place.
/// A zero vector is left unchanged.
pub fn l2_normalize(v: &mut [f32]) {
    let mut norm = 0.0f64;
    for &x in v.iter() {
        norm += (x as f64) * (x as f64);
    }
    norm = norm.sqrt();
    if norm > 0.0 {
        let scale = (1.0 / norm) as f32;
        for x in v.iter_mut() {
            *x *= scale;
        }
    }
}
