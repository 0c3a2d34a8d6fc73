//! Synthetic frame patterns.

/// Diagonal gradient, animated by frame number.
///
/// Pixel `(x, y)` of frame `n` is `(x + y + n) % 4096 + 100`, which
/// keeps values inside a 12-bit sensor's range with a floor above zero
/// so dead-pixel checks don't trip on the pattern itself. Every frame
/// differs from its neighbors, so a test can identify which frame a
/// buffer came from.
#[must_use]
pub fn gradient_pattern_u16(width: u32, height: u32, frame_nr: u32) -> Vec<u16> {
    let mut pixels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.push((((x + y + frame_nr) % 4096) + 100) as u16);
        }
    }
    pixels
}

/// Same pattern as little-endian bytes, ready for a ring slot.
#[must_use]
pub fn gradient_pattern(width: u32, height: u32, frame_nr: u32) -> Vec<u8> {
    let pixels = gradient_pattern_u16(width, height, frame_nr);
    let mut bytes = Vec::with_capacity(pixels.len() * 2);
    for px in pixels {
        bytes.extend_from_slice(&px.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_is_deterministic_and_animated() {
        let a = gradient_pattern_u16(8, 8, 1);
        let b = gradient_pattern_u16(8, 8, 1);
        let c = gradient_pattern_u16(8, 8, 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a[0], 101);
        // x=3, y=2, n=1 -> 106
        assert_eq!(a[2 * 8 + 3], 106);
    }

    #[test]
    fn values_stay_in_sensor_range() {
        let pixels = gradient_pattern_u16(64, 64, 5000);
        assert!(pixels.iter().all(|&p| (100..100 + 4096).contains(&p)));
    }

    #[test]
    fn byte_form_is_little_endian() {
        let bytes = gradient_pattern(4, 1, 0);
        assert_eq!(bytes.len(), 8);
        assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]), 100);
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 101);
    }
}
