use crate::config::{Number, EPSILON};
use wide::f32x8;

/// Cosine similarity in `[-1, 1]`.
///
/// Vectors of different length are compared over their overlapping prefix, and
/// a zero-norm operand (including an empty vector) scores `0.0`. Neither case
/// is an error: a degenerate query simply ranks below everything else.
pub fn cosine_similarity(a: &[Number], b: &[Number]) -> Number {
    let len = a.len().min(b.len());
    if a.len() != b.len() {
        tracing::trace!(left = a.len(), right = b.len(), "vector length mismatch");
    }
    let (a, b) = (&a[..len], &b[..len]);

    let mut dot_product = f32x8::splat(0.0);
    let mut mag_a = f32x8::splat(0.0);
    let mut mag_b = f32x8::splat(0.0);

    let simd_len = len - (len % 8);

    for i in (0..simd_len).step_by(8) {
        let va = f32x8::new([
            a[i],
            a[i + 1],
            a[i + 2],
            a[i + 3],
            a[i + 4],
            a[i + 5],
            a[i + 6],
            a[i + 7],
        ]);
        let vb = f32x8::new([
            b[i],
            b[i + 1],
            b[i + 2],
            b[i + 3],
            b[i + 4],
            b[i + 5],
            b[i + 6],
            b[i + 7],
        ]);
        dot_product += va * vb;
        mag_a += va * va;
        mag_b += vb * vb;
    }

    let mut scalar_dot_product = dot_product.reduce_add();
    let mut scalar_mag_a = mag_a.reduce_add();
    let mut scalar_mag_b = mag_b.reduce_add();

    for i in simd_len..len {
        scalar_dot_product += a[i] * b[i];
        scalar_mag_a += a[i] * a[i];
        scalar_mag_b += b[i] * b[i];
    }

    let norm_a = scalar_mag_a.sqrt();
    let norm_b = scalar_mag_b.sqrt();
    if norm_a < EPSILON || norm_b < EPSILON {
        return 0.0;
    }

    let similarity = scalar_dot_product / (norm_a * norm_b);
    if similarity.is_finite() {
        similarity.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
