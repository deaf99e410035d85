//! Frame math shared by the renderer

/// Orthographic projection mapping the UI display rectangle to clip space.
pub fn projection(display_pos: [f32; 2], display_size: [f32; 2]) -> [[f32; 4]; 4] {
    let l = display_pos[0];
    let r = display_pos[0] + display_size[0];
    let t = display_pos[1];
    let b = display_pos[1] + display_size[1];
    [
        [2.0 / (r - l), 0.0, 0.0, 0.0],
        [0.0, 2.0 / (t - b), 0.0, 0.0],
        [0.0, 0.0, 0.5, 0.0],
        [(r + l) / (l - r), (t + b) / (b - t), 0.5, 1.0],
    ]
}

/// Scissor rectangle (left, top, right, bottom) for a clip rect in display
/// coordinates, or `None` when nothing is visible.
pub fn scissor(clip_rect: [f32; 4], display_pos: [f32; 2], display_size: [f32; 2]) -> Option<[i32; 4]> {
    let left = (clip_rect[0] - display_pos[0]).max(0.0);
    let top = (clip_rect[1] - display_pos[1]).max(0.0);
    let right = (clip_rect[2] - display_pos[0]).min(display_size[0]);
    let bottom = (clip_rect[3] - display_pos[1]).min(display_size[1]);
    if right <= left || bottom <= top {
        return None;
    }
    Some([left as i32, top as i32, right as i32, bottom as i32])
}

/// Display name of a virtual key for on-screen hints.
pub fn key_label(vk: i32) -> String {
    match vk {
        0x70..=0x87 => format!("F{}", vk - 0x6F),
        0x30..=0x39 | 0x41..=0x5A => char::from(vk as u8).to_string(),
        0x2D => "Insert".to_string(),
        0x2E => "Delete".to_string(),
        0x24 => "Home".to_string(),
        0x23 => "End".to_string(),
        0xC0 => "`".to_string(),
        _ => format!("key 0x{:02X}", vk),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(m: &[[f32; 4]; 4], x: f32, y: f32) -> (f32, f32) {
        // row-vector convention: [x y 0 1] * M
        (x * m[0][0] + y * m[1][0] + m[3][0], x * m[0][1] + y * m[1][1] + m[3][1])
    }

    #[test]
    fn test_projection_maps_corners_to_clip_space() {
        let m = projection([0.0, 0.0], [1920.0, 1080.0]);
        assert_eq!(apply(&m, 0.0, 0.0), (-1.0, 1.0));
        assert_eq!(apply(&m, 1920.0, 1080.0), (1.0, -1.0));
        let (x, y) = apply(&m, 960.0, 540.0);
        assert!(x.abs() < 1e-6 && y.abs() < 1e-6);
    }

    #[test]
    fn test_scissor_clamps_to_display() {
        let size = [800.0, 600.0];
        assert_eq!(scissor([-10.0, 20.0, 900.0, 100.0], [0.0, 0.0], size), Some([0, 20, 800, 100]));
        assert_eq!(scissor([100.0, 100.0, 100.0, 300.0], [0.0, 0.0], size), None);
        assert_eq!(scissor([110.0, 60.0, 200.0, 90.0], [100.0, 50.0], size), Some([10, 10, 100, 40]));
    }

    #[test]
    fn test_key_labels() {
        assert_eq!(key_label(0x71), "F2");
        assert_eq!(key_label(0x7B), "F12");
        assert_eq!(key_label(0x4D), "M");
        assert_eq!(key_label(0x2D), "Insert");
        assert_eq!(key_label(0x05), "key 0x05");
    }
}
