//! Bilinear resampling of a single feature map.

/// Resizes a row-major `in_h × in_w` map to `out_h × out_w`.
///
/// Sample positions use half-pixel centres (`src = (dst + 0.5) * in / out - 0.5`)
/// and are clamped to the border, so upsampling a constant map stays constant
/// and a 1×1 map becomes a flat plane.
pub fn resize_bilinear(src: &[f32], in_h: usize, in_w: usize, out_h: usize, out_w: usize) -> Vec<f32> {
    assert_eq!(src.len(), in_h * in_w, "source map size mismatch");

    if in_h == out_h && in_w == out_w {
        return src.to_vec();
    }

    let x_taps: Vec<(usize, usize, f32)> = (0..out_w).map(|x| taps(x, in_w, out_w)).collect();
    let mut out = Vec::with_capacity(out_h * out_w);

    for y in 0..out_h {
        let (y0, y1, wy) = taps(y, in_h, out_h);
        let row0 = &src[y0 * in_w..(y0 + 1) * in_w];
        let row1 = &src[y1 * in_w..(y1 + 1) * in_w];
        for &(x0, x1, wx) in &x_taps {
            let top = row0[x0] + (row0[x1] - row0[x0]) * wx;
            let bottom = row1[x0] + (row1[x1] - row1[x0]) * wx;
            out.push(top + (bottom - top) * wy);
        }
    }

    out
}

/// Neighbouring source indices and the weight of the second one.
#[inline]
fn taps(dst: usize, in_len: usize, out_len: usize) -> (usize, usize, f32) {
    let scale = in_len as f32 / out_len as f32;
    let max = (in_len - 1) as f32;
    let pos = ((dst as f32 + 0.5) * scale - 0.5).clamp(0.0, max);
    let i0 = pos.floor() as usize;
    let i1 = (i0 + 1).min(in_len - 1);
    (i0, i1, pos - i0 as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_pixel_broadcasts() {
        let out = resize_bilinear(&[2.5], 1, 1, 3, 3);
        assert_eq!(out, vec![2.5; 9]);
    }

    #[test]
    fn test_same_size_is_copy() {
        let src = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(resize_bilinear(&src, 2, 2, 2, 2), src);
    }

    #[test]
    fn test_upsample_1d_ramp() {
        // 2 -> 4 samples at half-pixel centres: positions -0.25, 0.25, 0.75, 1.25
        let out = resize_bilinear(&[0.0, 1.0], 1, 2, 1, 4);
        let expected = [0.0, 0.25, 0.75, 1.0];
        for (o, e) in out.iter().zip(expected) {
            assert!((o - e).abs() < 1e-6, "{:?}", out);
        }
    }

    #[test]
    fn test_downsample_averages_pairs() {
        let out = resize_bilinear(&[0.0, 2.0, 4.0, 6.0], 1, 4, 1, 2);
        assert!((out[0] - 1.0).abs() < 1e-6);
        assert!((out[1] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_output_stays_within_input_range() {
        let src: Vec<f32> = (0..9).map(|v| (v * v) as f32).collect();
        let out = resize_bilinear(&src, 3, 3, 7, 5);
        assert_eq!(out.len(), 35);
        assert!(out.iter().all(|&v| (0.0..=64.0).contains(&v)));
    }
}
