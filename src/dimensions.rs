use crate::error::{PipelineError, PipelineResult};

pub const CANVAS_WIDTH: u32 = 1920;
pub const CANVAS_HEIGHT: u32 = 1080;

/// Size of the scaled visual inside the padded canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetSize {
    pub width: f64,
    pub height: f64,
}

impl TargetSize {
    /// Pixel size the encoder can take: each side floored to an even number.
    pub fn to_even_pixels(self) -> (u32, u32) {
        let even = |v: f64| ((v.floor() as u32) & !1).max(2);
        (even(self.width), even(self.height))
    }
}

/// Fits a `source_w`×`source_h` visual into the canvas interior left after
/// padding, preserving aspect ratio. Exactly one axis touches its bound.
pub fn resolve(
    source_w: u32,
    source_h: u32,
    canvas_w: u32,
    canvas_h: u32,
    pad_x: u32,
    pad_y: u32,
) -> PipelineResult<TargetSize> {
    if source_w == 0 || source_h == 0 {
        return Err(PipelineError::invalid(format!(
            "source dimensions must be non-zero, got {source_w}x{source_h}"
        )));
    }
    check_padding(canvas_w, canvas_h, pad_x, pad_y)?;

    let inner_w = (canvas_w - 2 * pad_x) as f64;
    let inner_h = (canvas_h - 2 * pad_y) as f64;
    let source_ratio = source_w as f64 / source_h as f64;
    let baseline_ratio = inner_w / inner_h;

    let size = if source_ratio < baseline_ratio {
        TargetSize {
            width: source_ratio * inner_h,
            height: inner_h,
        }
    } else {
        TargetSize {
            width: inner_w,
            height: inner_w / source_ratio,
        }
    };
    Ok(size)
}

pub fn check_padding(canvas_w: u32, canvas_h: u32, pad_x: u32, pad_y: u32) -> PipelineResult<()> {
    if pad_x.saturating_mul(2) >= canvas_w {
        return Err(PipelineError::invalid(format!(
            "horizontal padding {pad_x} must be less than half the canvas width {canvas_w}"
        )));
    }
    if pad_y.saturating_mul(2) >= canvas_h {
        return Err(PipelineError::invalid(format!(
            "vertical padding {pad_y} must be less than half the canvas height {canvas_h}"
        )));
    }
    Ok(())
}

/// Top-left offset that centres a `w`×`h` visual on the canvas.
pub fn centered_offset(canvas_w: u32, canvas_h: u32, w: u32, h: u32) -> (u32, u32) {
    (canvas_w.saturating_sub(w) / 2, canvas_h.saturating_sub(h) / 2)
}
