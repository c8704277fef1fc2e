use image::GrayImage;

/// Resizes a grayscale image with area averaging: every destination pixel
/// is the mean of the source area its footprint covers, with partially
/// covered source pixels weighted by the covered fraction.
///
/// Shrinking thin strokes this way keeps their ink instead of skipping it
/// the way nearest-neighbour sampling does.
pub fn resize_area(src: &GrayImage, dst_w: u32, dst_h: u32) -> GrayImage {
    let (src_w, src_h) = src.dimensions();
    assert!(src_w > 0 && src_h > 0, "resize_area needs a non-empty source image");
    assert!(dst_w > 0 && dst_h > 0, "resize_area needs a non-empty destination size");

    let xs = coverage(src_w, dst_w);
    let ys = coverage(src_h, dst_h);
    let area = (src_w as f64 / dst_w as f64) * (src_h as f64 / dst_h as f64);

    GrayImage::from_fn(dst_w, dst_h, |dx, dy| {
        let mut sum = 0.0;
        for &(sy, wy) in &ys[dy as usize] {
            for &(sx, wx) in &xs[dx as usize] {
                sum += wy * wx * src.get_pixel(sx, sy).0[0] as f64;
            }
        }
        image::Luma([(sum / area).round().clamp(0.0, 255.0) as u8])
    })
}

/// For each destination index along one axis, the source indices it
/// overlaps and the length of each overlap (in source pixels).
fn coverage(src_len: u32, dst_len: u32) -> Vec<Vec<(u32, f64)>> {
    let scale = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|d| {
            let start = d as f64 * scale;
            let end = (start + scale).min(src_len as f64);
            let first = start.floor() as u32;
            let last = (end.ceil() as u32).min(src_len);
            (first..last)
                .filter_map(|s| {
                    let overlap = end.min(s as f64 + 1.0) - start.max(s as f64);
                    (overlap > 1e-9).then_some((s, overlap))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_halving_averages_two_by_two_blocks() {
        let src = GrayImage::from_raw(4, 2, vec![
            0, 100, 10, 20,
            200, 100, 30, 40,
        ]).unwrap();
        let out = resize_area(&src, 2, 1);
        assert_eq!(out.into_raw(), vec![100, 25]);
    }

    #[test]
    fn fractional_footprints_are_weighted() {
        // 3 -> 2: dst 0 covers src [0, 1.5), dst 1 covers [1.5, 3).
        let src = GrayImage::from_raw(3, 1, vec![0, 90, 180]).unwrap();
        let out = resize_area(&src, 2, 1);
        // (0 * 1 + 90 * 0.5) / 1.5 = 30; (90 * 0.5 + 180 * 1) / 1.5 = 150
        assert_eq!(out.into_raw(), vec![30, 150]);
    }

    #[test]
    fn thin_stroke_survives_heavy_downscaling() {
        // A one-pixel vertical line in a 280x280 white canvas.
        let mut src = GrayImage::from_pixel(280, 280, image::Luma([255]));
        for y in 0..280 {
            src.put_pixel(140, y, image::Luma([0]));
        }
        let out = resize_area(&src, 28, 28);
        // The column that contains the line is darkened by 1/10 of the ink.
        let column: Vec<u8> = (0..28).map(|y| out.get_pixel(14, y).0[0]).collect();
        assert!(column.iter().all(|&v| v == 230));
        assert_eq!(out.get_pixel(3, 3).0[0], 255);
    }

    #[test]
    fn same_size_is_identity() {
        let src = GrayImage::from_fn(28, 28, |x, y| image::Luma([((x * 7 + y * 3) % 256) as u8]));
        assert_eq!(resize_area(&src, 28, 28), src);
    }

    #[test]
    fn upscaling_yields_requested_size() {
        let src = GrayImage::from_raw(2, 2, vec![0, 255, 255, 0]).unwrap();
        let out = resize_area(&src, 28, 28);
        assert_eq!(out.dimensions(), (28, 28));
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(27, 0).0[0], 255);
    }
}
