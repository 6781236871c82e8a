//! Fixed-size viewport holding the decoded framebuffer

use crate::errors::GatewayError;

pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 720;

/// Framebuffer plus the fixed area it is scaled into.
///
/// Pixels are stored as `0x00RRGGBB`.
#[derive(Debug, Clone)]
pub struct Viewport {
    width: u32,
    height: u32,
    fb_width: u16,
    fb_height: u16,
    pixels: Vec<u32>,
    updates: u64,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fb_width: 0,
            fb_height: 0,
            pixels: Vec::new(),
            updates: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn framebuffer_size(&self) -> (u16, u16) {
        (self.fb_width, self.fb_height)
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Number of framebuffer updates applied so far
    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn pixel(&self, x: u16, y: u16) -> Option<u32> {
        if x >= self.fb_width || y >= self.fb_height {
            return None;
        }
        self.pixels
            .get(y as usize * self.fb_width as usize + x as usize)
            .copied()
    }

    /// Reallocate the framebuffer; contents are cleared
    pub fn resize(&mut self, fb_width: u16, fb_height: u16) {
        self.fb_width = fb_width;
        self.fb_height = fb_height;
        self.pixels = vec![0; fb_width as usize * fb_height as usize];
    }

    /// Scale factor that fits the framebuffer inside the viewport, preserving aspect
    pub fn scale(&self) -> f64 {
        if self.fb_width == 0 || self.fb_height == 0 {
            return 1.0;
        }
        let sx = self.width as f64 / self.fb_width as f64;
        let sy = self.height as f64 / self.fb_height as f64;
        sx.min(sy)
    }

    pub fn scaled_size(&self) -> (u32, u32) {
        let scale = self.scale();
        (
            (self.fb_width as f64 * scale).round() as u32,
            (self.fb_height as f64 * scale).round() as u32,
        )
    }

    fn check_bounds(&self, x: u16, y: u16, width: u16, height: u16) -> Result<(), GatewayError> {
        if x as u32 + width as u32 > self.fb_width as u32
            || y as u32 + height as u32 > self.fb_height as u32
        {
            return Err(GatewayError::ProtocolError(format!(
                "Rectangle {}x{}+{}+{} outside {}x{} framebuffer",
                width, height, x, y, self.fb_width, self.fb_height
            )));
        }
        Ok(())
    }

    /// Copy little-endian 32bpp pixel data into the framebuffer
    pub fn apply_raw(
        &mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        data: &[u8],
    ) -> Result<(), GatewayError> {
        self.check_bounds(x, y, width, height)?;
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(GatewayError::ProtocolError(format!(
                "Raw rectangle carries {} bytes, expected {}",
                data.len(),
                expected
            )));
        }

        let stride = self.fb_width as usize;
        for (row, line) in data.chunks_exact(width as usize * 4).enumerate() {
            let start = (y as usize + row) * stride + x as usize;
            for (col, px) in line.chunks_exact(4).enumerate() {
                self.pixels[start + col] =
                    u32::from_le_bytes([px[0], px[1], px[2], px[3]]) & 0x00ff_ffff;
            }
        }
        Ok(())
    }

    pub fn copy_rect(
        &mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        src_x: u16,
        src_y: u16,
    ) -> Result<(), GatewayError> {
        self.check_bounds(x, y, width, height)?;
        self.check_bounds(src_x, src_y, width, height)?;

        let stride = self.fb_width as usize;
        let mut block = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height as usize {
            let start = (src_y as usize + row) * stride + src_x as usize;
            block.extend_from_slice(&self.pixels[start..start + width as usize]);
        }
        for (row, line) in block.chunks_exact(width.max(1) as usize).enumerate() {
            let start = (y as usize + row) * stride + x as usize;
            self.pixels[start..start + width as usize].copy_from_slice(line);
        }
        Ok(())
    }

    pub fn finish_update(&mut self) {
        self.updates += 1;
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(DEFAULT_VIEWPORT_WIDTH, DEFAULT_VIEWPORT_HEIGHT)
    }
}
