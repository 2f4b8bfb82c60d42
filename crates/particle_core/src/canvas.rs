//! The raster surface that particles are drawn onto. It's deliberately dumb: a grid of RGBA
//! pixels plus a parallel grid of glyphs. Hosts decide how to actually display it.

/// An RGBA colour, each channel normalised to `0.0..=1.0`.
pub type Colour = (f32, f32, f32, f32);

/// A default pure black.
pub const BLACK: Colour = (0.0, 0.0, 0.0, 1.0);

/// A default pure white.
pub const WHITE: Colour = (1.0, 1.0, 1.0, 1.0);

/// The opacity of the black wash laid over the previous frame. Lower values give longer
/// trails.
pub const TRAIL_OPACITY: f32 = 0.2;

/// Glyphs fainter than this are removed from the glyph layer.
const GLYPH_VISIBILITY_THRESHOLD: f32 = 0.05;

/// A single character drawn onto the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
#[non_exhaustive]
pub struct Glyph {
    /// The character itself
    pub character: char,
    /// Its fill colour
    pub colour: Colour,
    /// The requested font size in pixels
    pub font_size: f32,
}

/// `Canvas`
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct Canvas {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Row-major pixels
    pixels: Vec<Colour>,
    /// Row-major glyphs, anchored at the pixel they were drawn at
    glyphs: Vec<Option<Glyph>>,
}

impl Canvas {
    /// Create a blank, black canvas.
    #[inline]
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let area = Self::area(width, height);
        Self {
            width,
            height,
            pixels: vec![BLACK; area],
            glyphs: vec![None; area],
        }
    }

    /// The number of pixels in a canvas of the given size.
    fn area(width: u32, height: u32) -> usize {
        let width_usize = usize::try_from(width).unwrap_or(usize::MAX);
        let height_usize = usize::try_from(height).unwrap_or(usize::MAX);
        width_usize.saturating_mul(height_usize)
    }

    /// Resize and clear the canvas.
    #[inline]
    pub fn resize(&mut self, width: u32, height: u32) {
        *self = Self::new(width, height);
    }

    /// The index of the pixel at the given coordinates, if it's on the canvas.
    fn index(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        let index = y * i64::from(self.width) + x;
        usize::try_from(index).ok()
    }

    /// Get the colour of a pixel.
    #[inline]
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<Colour> {
        let index = self.index(x.into(), y.into())?;
        self.pixels.get(index).copied()
    }

    /// Get the glyph anchored at a pixel.
    #[inline]
    #[must_use]
    pub fn glyph(&self, x: u32, y: u32) -> Option<Glyph> {
        let index = self.index(x.into(), y.into())?;
        self.glyphs.get(index).copied().flatten()
    }

    /// Lay a translucent black wash over everything, so that previous frames fade out rather
    /// than being cleared.
    #[inline]
    pub fn fade(&mut self, opacity: f32) {
        let keep = 1.0 - opacity.clamp(0.0, 1.0);
        for pixel in &mut self.pixels {
            pixel.0 *= keep;
            pixel.1 *= keep;
            pixel.2 *= keep;
        }

        for slot in &mut self.glyphs {
            if let Some(glyph) = slot {
                glyph.colour.0 *= keep;
                glyph.colour.1 *= keep;
                glyph.colour.2 *= keep;
                let brightest = glyph.colour.0.max(glyph.colour.1).max(glyph.colour.2);
                if brightest < GLYPH_VISIBILITY_THRESHOLD {
                    *slot = None;
                }
            }
        }
    }

    /// Fill an axis-aligned square. Anything outside the canvas is clipped.
    #[inline]
    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, colour: Colour) {
        if !(x.is_finite() && y.is_finite() && width.is_finite() && height.is_finite()) {
            return;
        }

        #[expect(
            clippy::cast_possible_truncation,
            clippy::as_conversions,
            reason = "Float to int `as` casts saturate, and we clip to the canvas anyway"
        )]
        let (left, top, right, bottom) = (
            x.floor() as i64,
            y.floor() as i64,
            (x + width).floor() as i64,
            (y + height).floor() as i64,
        );
        // A particle should always be visible, even when it's smaller than a pixel.
        let right = right.max(left + 1);
        let bottom = bottom.max(top + 1);

        let clipped_left = left.max(0);
        let clipped_top = top.max(0);
        let clipped_right = right.min(i64::from(self.width));
        let clipped_bottom = bottom.min(i64::from(self.height));

        for row in clipped_top..clipped_bottom {
            for column in clipped_left..clipped_right {
                if let Some(index) = self.index(column, row) {
                    if let Some(pixel) = self.pixels.get_mut(index) {
                        *pixel = colour;
                    }
                }
            }
        }
    }

    /// Draw a glyph anchored at the given position. Anything outside the canvas is clipped.
    #[inline]
    pub fn draw_glyph(&mut self, character: char, x: f32, y: f32, font_size: f32, colour: Colour) {
        if !(x.is_finite() && y.is_finite()) {
            return;
        }

        #[expect(
            clippy::cast_possible_truncation,
            clippy::as_conversions,
            reason = "Float to int `as` casts saturate, and we clip to the canvas anyway"
        )]
        let Some(index) = self.index(x.floor() as i64, y.floor() as i64) else {
            return;
        };
        if let Some(slot) = self.glyphs.get_mut(index) {
            *slot = Some(Glyph {
                character,
                colour,
                font_size,
            });
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests aren't so strict")]
mod test {
    use super::*;

    const GREEN: Colour = (0.0, 1.0, 0.0, 1.0);

    #[test]
    fn starts_black() {
        let canvas = Canvas::new(3, 2);
        assert_eq!(canvas.pixel(2, 1).unwrap(), BLACK);
        assert!(canvas.pixel(3, 0).is_none());
        assert!(canvas.glyph(0, 0).is_none());
    }

    #[test]
    fn fill_rect_is_clipped() {
        let mut canvas = Canvas::new(4, 4);
        canvas.fill_rect(2.5, 2.5, 2.0, 2.0, GREEN);
        assert_eq!(canvas.pixel(2, 2).unwrap(), GREEN);
        assert_eq!(canvas.pixel(3, 3).unwrap(), GREEN);
        assert_eq!(canvas.pixel(1, 1).unwrap(), BLACK);

        canvas.fill_rect(-10.0, -10.0, 2.0, 2.0, WHITE);
        canvas.fill_rect(f32::NAN, 0.0, 2.0, 2.0, WHITE);
        assert_eq!(canvas.pixel(0, 0).unwrap(), BLACK);
    }

    #[test]
    fn tiny_rects_are_still_visible() {
        let mut canvas = Canvas::new(4, 4);
        canvas.fill_rect(1.2, 1.2, 0.3, 0.3, GREEN);
        assert_eq!(canvas.pixel(1, 1).unwrap(), GREEN);
    }

    #[test]
    fn fade_leaves_a_trail() {
        let mut canvas = Canvas::new(1, 1);
        canvas.fill_rect(0.0, 0.0, 1.0, 1.0, WHITE);
        canvas.fade(TRAIL_OPACITY);
        let (red, _, _, _) = canvas.pixel(0, 0).unwrap();
        assert!((red - 0.8).abs() < 0.0001);
        canvas.fade(TRAIL_OPACITY);
        let (red, _, _, _) = canvas.pixel(0, 0).unwrap();
        assert!((red - 0.64).abs() < 0.0001);
    }

    #[test]
    fn glyphs_fade_away() {
        let mut canvas = Canvas::new(2, 2);
        canvas.draw_glyph('F', 1.7, 0.2, 4.0, GREEN);
        let glyph = canvas.glyph(1, 0).unwrap();
        assert_eq!(glyph.character, 'F');

        for _ in 0..20 {
            canvas.fade(TRAIL_OPACITY);
        }
        assert!(canvas.glyph(1, 0).is_none());
    }
}
