//! Live preview window (minifb) and its headless stand-in.

use minifb::{Key, Window, WindowOptions};
use rollcall_core::BoundingBox;
use rollcall_hw::Frame;
use thiserror::Error;

const MATCHED_COLOR: u32 = 0x00_20_D0_40;
const UNKNOWN_COLOR: u32 = 0x00_E0_30_30;

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("preview window: {0}")]
    Window(String),
}

/// A box to draw over the frame.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub bbox: BoundingBox,
    pub matched: bool,
}

/// Where frames go after recognition, and where the quit signal comes from.
pub trait FrameDisplay {
    fn show(&mut self, frame: &Frame, overlays: &[Overlay]) -> Result<(), DisplayError>;

    /// Pump UI events when there is no new frame to show.
    fn idle(&mut self) {}

    /// The operator pressed a quit key or closed the window.
    fn quit_requested(&self) -> bool;
}

/// No window; the session ends only on a frame limit, a fatal source error or a signal.
pub struct HeadlessDisplay;

impl FrameDisplay for HeadlessDisplay {
    fn show(&mut self, _: &Frame, _: &[Overlay]) -> Result<(), DisplayError> {
        Ok(())
    }

    fn quit_requested(&self) -> bool {
        false
    }
}

/// Preview window, created on the first frame at that frame's size. `q` or `Esc` quits.
pub struct WindowDisplay {
    title: String,
    window: Option<Window>,
    buffer: Vec<u32>,
}

impl WindowDisplay {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            window: None,
            buffer: Vec::new(),
        }
    }
}

impl FrameDisplay for WindowDisplay {
    fn show(&mut self, frame: &Frame, overlays: &[Overlay]) -> Result<(), DisplayError> {
        let (w, h) = (frame.width as usize, frame.height as usize);

        if self.window.is_none() {
            let options = WindowOptions {
                resize: true,
                ..WindowOptions::default()
            };
            let window = Window::new(&self.title, w, h, options)
                .map_err(|e| DisplayError::Window(e.to_string()))?;
            self.window = Some(window);
        }

        render(frame, overlays, &mut self.buffer);

        if let Some(window) = self.window.as_mut() {
            window
                .update_with_buffer(&self.buffer, w, h)
                .map_err(|e| DisplayError::Window(e.to_string()))?;
        }
        Ok(())
    }

    fn idle(&mut self) {
        if let Some(window) = self.window.as_mut() {
            window.update();
        }
    }

    fn quit_requested(&self) -> bool {
        match &self.window {
            Some(window) => {
                !window.is_open() || window.is_key_down(Key::Q) || window.is_key_down(Key::Escape)
            }
            None => false,
        }
    }
}

/// RGB frame → 0RGB pixels, with overlay outlines.
fn render(frame: &Frame, overlays: &[Overlay], buffer: &mut Vec<u32>) {
    buffer.clear();
    buffer.extend(
        frame
            .data
            .chunks_exact(3)
            .map(|p| ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32),
    );

    for overlay in overlays {
        let color = if overlay.matched { MATCHED_COLOR } else { UNKNOWN_COLOR };
        draw_rect(buffer, frame.width, frame.height, &overlay.bbox, color);
    }
}

/// Two-pixel outline, clipped to the frame.
fn draw_rect(buffer: &mut [u32], width: u32, height: u32, bbox: &BoundingBox, color: u32) {
    if width == 0 || height == 0 {
        return;
    }
    let clamp_x = |v: f32| (v.round().max(0.0) as u32).min(width - 1) as usize;
    let clamp_y = |v: f32| (v.round().max(0.0) as u32).min(height - 1) as usize;
    let (x0, x1) = (clamp_x(bbox.x), clamp_x(bbox.x + bbox.width));
    let (y0, y1) = (clamp_y(bbox.y), clamp_y(bbox.y + bbox.height));
    let w = width as usize;

    let mut put = |x: usize, y: usize| {
        if let Some(px) = buffer.get_mut(y * w + x) {
            *px = color;
        }
    };

    for t in 0..2 {
        for x in x0..=x1 {
            put(x, (y0 + t).min(y1));
            put(x, y1.saturating_sub(t).max(y0));
        }
        for y in y0..=y1 {
            put((x0 + t).min(x1), y);
            put(x1.saturating_sub(t).max(x0), y);
        }
    }
}
