use crate::dataset::Dataset;
use crate::error::DatasetError;
use crate::preprocess::normalize;

/// Parse a pair of IDX binary files (image + label) as used by MNIST into a
/// `Dataset`.
///
/// # IDX3 image file layout
/// ```text
/// bytes  0-1:   0x00 0x00   (reserved, must be zero)
/// byte   2:     0x08        (dtype = uint8)
/// byte   3:     0x03        (number of dimensions = 3)
/// bytes  4-7:   N           (number of images, big-endian u32)
/// bytes  8-11:  rows        (image height in pixels, big-endian u32)
/// bytes 12-15:  cols        (image width in pixels, big-endian u32)
/// bytes 16..:   N * rows * cols bytes, row-major, uint8
/// ```
///
/// # IDX1 label file layout
/// ```text
/// bytes  0-1:   0x00 0x00   (reserved, must be zero)
/// byte   2:     0x08        (dtype = uint8)
/// byte   3:     0x01        (number of dimensions = 1)
/// bytes  4-7:   N           (number of labels, big-endian u32)
/// bytes  8..:   N bytes, each a class index in [0, n_classes)
/// ```
///
/// Pixels go through `preprocess::normalize` only: MNIST already stores ink
/// as high values, so the inversion step of the serving pipeline is not
/// applied here.
pub fn parse_idx_pair(
    image_bytes: &[u8],
    label_bytes: &[u8],
    n_classes: usize,
) -> Result<Dataset, DatasetError> {
    let fail = |msg: String| Err(DatasetError::Format(msg));

    // ── Image file validation ───────────────────────────────────────────────

    if image_bytes.len() < 16 {
        return fail(format!(
            "IDX image file too short: expected at least 16 header bytes, got {}.",
            image_bytes.len()
        ));
    }
    if image_bytes[0] != 0x00 || image_bytes[1] != 0x00 {
        return fail(format!(
            "IDX image file: bytes 0-1 must be 0x00 0x00 (reserved), got 0x{:02X} 0x{:02X}.",
            image_bytes[0], image_bytes[1]
        ));
    }
    if image_bytes[2] != 0x08 {
        return fail(format!(
            "IDX image file: byte 2 (dtype) must be 0x08 (uint8), got 0x{:02X}.",
            image_bytes[2]
        ));
    }
    if image_bytes[3] != 0x03 {
        return fail(format!(
            "IDX image file: byte 3 (dimensions) must be 3, got {}. \
             This does not appear to be an IDX3 image file.",
            image_bytes[3]
        ));
    }

    let n_items = read_be_u32(image_bytes, 4);
    let rows = read_be_u32(image_bytes, 8);
    let cols = read_be_u32(image_bytes, 12);

    let n_pixels = rows.checked_mul(cols).ok_or_else(|| {
        DatasetError::Format(format!(
            "IDX image file: rows * cols overflows usize (rows={}, cols={}).", rows, cols
        ))
    })?;
    let data_len = n_items.checked_mul(n_pixels).ok_or_else(|| {
        DatasetError::Format(format!(
            "IDX image file: n_items * n_pixels overflows usize (n_items={}, n_pixels={}).",
            n_items, n_pixels
        ))
    })?;
    if image_bytes.len() - 16 < data_len {
        return fail(format!(
            "IDX image file too short: header declares {} items of {}×{} pixels \
             ({} data bytes needed after header), but file is only {} bytes total.",
            n_items, rows, cols, data_len, image_bytes.len()
        ));
    }

    // ── Label file validation ───────────────────────────────────────────────

    if label_bytes.len() < 8 {
        return fail(format!(
            "IDX label file too short: expected at least 8 header bytes, got {}.",
            label_bytes.len()
        ));
    }
    if label_bytes[0] != 0x00 || label_bytes[1] != 0x00 || label_bytes[2] != 0x08 {
        return fail(format!(
            "IDX label file: header must start with 0x00 0x00 0x08, got 0x{:02X} 0x{:02X} 0x{:02X}.",
            label_bytes[0], label_bytes[1], label_bytes[2]
        ));
    }
    if label_bytes[3] != 0x01 {
        return fail(format!(
            "IDX label file: byte 3 (dimensions) must be 1, got {}. \
             This does not appear to be an IDX1 label file.",
            label_bytes[3]
        ));
    }

    let label_count = read_be_u32(label_bytes, 4);
    if label_count != n_items {
        return fail(format!(
            "IDX file mismatch: image file declares {} items but label file declares {}.",
            n_items, label_count
        ));
    }
    if label_bytes.len() - 8 < n_items {
        return fail(format!(
            "IDX label file too short: header declares {} labels but file is only {} bytes.",
            n_items, label_bytes.len()
        ));
    }

    // ── Build samples ───────────────────────────────────────────────────────

    let labels = label_bytes[8..8 + n_items].to_vec();
    if let Some((i, &class)) = labels.iter().enumerate().find(|(_, &c)| c as usize >= n_classes) {
        return fail(format!(
            "IDX label at index {}: class index {} is out of range for n_classes={}.",
            i, class, n_classes
        ));
    }

    let images = image_bytes[16..16 + data_len].iter().map(|&px| normalize(px)).collect();
    Ok(Dataset { images, labels, rows, cols })
}

fn read_be_u32(bytes: &[u8], offset: usize) -> usize {
    u32::from_be_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]) as usize
}
