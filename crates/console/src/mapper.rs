//! Screen-space to turret-space coordinate mapping.
//!
//! The video surface is rendered at whatever size the layout gives it, while
//! the turret aims in its fixed native frame. Horizontal and vertical scale
//! factors are computed independently so letterboxed or stretched layouts map
//! correctly.

/// On-screen bounding rectangle of the video surface, in CSS/screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl SurfaceRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left
            && y >= self.top
            && x <= self.left + self.width
            && y <= self.top + self.height
    }
}

/// Turret-native frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeFrame {
    pub width: u32,
    pub height: u32,
}

/// Position in turret-native pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativePoint {
    pub x: u32,
    pub y: u32,
}

/// Map a pointer position (screen pixels) inside `rect` to the native frame.
///
/// Returns `None` for positions outside the surface or for a surface with no
/// area. The right/bottom edges clamp to the last native pixel.
pub fn map_to_native(x: f64, y: f64, rect: SurfaceRect, native: NativeFrame) -> Option<NativePoint> {
    if !(rect.width > 0.0 && rect.height > 0.0) || native.width == 0 || native.height == 0 {
        return None;
    }
    if !x.is_finite() || !y.is_finite() || !rect.contains(x, y) {
        return None;
    }

    let scale_x = native.width as f64 / rect.width;
    let scale_y = native.height as f64 / rect.height;

    let nx = ((x - rect.left) * scale_x).round();
    let ny = ((y - rect.top) * scale_y).round();

    Some(NativePoint {
        x: (nx as u32).min(native.width - 1),
        y: (ny as u32).min(native.height - 1),
    })
}

/// Pan/tilt pair produced by the joystick pad, in whole degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JoystickAngles {
    pub pan: i32,
    pub tilt: i32,
}

/// Map a drag offset from the pad center to a bounded angular pair.
///
/// The offset is clamped to the pad radius (keeping its direction), each
/// component's radius fraction is scaled linearly to `±range`, and the result
/// is rounded to whole degrees and then wrapped into `[-range, range)`.
/// Screen Y grows downward, so dragging up tilts up.
pub fn joystick_to_angles(dx: f64, dy: f64, radius: f64, range: f64) -> JoystickAngles {
    if !(radius > 0.0) || !(range > 0.0) || !dx.is_finite() || !dy.is_finite() {
        return JoystickAngles { pan: 0, tilt: 0 };
    }

    let distance = dx.hypot(dy).min(radius);
    let angle = dy.atan2(dx);
    let cx = distance * angle.cos();
    let cy = distance * angle.sin();

    let pan = wrap_angle((cx / radius * range).round(), range);
    let tilt = wrap_angle((-cy / radius * range).round(), range);

    JoystickAngles {
        pan: pan as i32,
        tilt: tilt as i32,
    }
}

/// Wrap `value` into `[-range, range)`.
pub fn wrap_angle(value: f64, range: f64) -> f64 {
    let span = 2.0 * range;
    let wrapped = (value + range).rem_euclid(span) - range;
    // rem_euclid can round up to `span` for tiny negative inputs
    if wrapped >= range { -range } else { wrapped }
}
