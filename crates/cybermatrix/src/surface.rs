//! Turn a particle canvas into terminal cells.
//!
//! Every terminal cell shows 2 canvas pixels stacked vertically, using the upper half block "▀":
//! the upper pixel is the cell's foreground and the lower pixel is its background. Glyphs take up
//! a whole cell.

use particle_core::canvas::{Canvas, Colour, Glyph, WHITE};
use termwiz::surface::Change as TermwizChange;
use termwiz::surface::Position as TermwizPosition;

/// Pixels with no channel brighter than this are left as the terminal's own default background,
/// so that transparent terminals stay transparent.
const DARKNESS_THRESHOLD: f32 = 0.02;

/// `Surface`
pub(crate) struct Surface {
    /// The terminal's width
    pub width: usize,
    /// The terminal's height
    pub height: usize,
    /// A surface of terminal cells
    pub surface: termwiz::surface::Surface,
}

impl Surface {
    /// Create a blank surface
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            surface: termwiz::surface::Surface::new(width, height),
        }
    }

    /// Build a surface from a canvas that's `width` pixels wide and `height * 2` pixels high.
    #[must_use]
    pub fn from_canvas(canvas: &Canvas, width: usize, height: usize) -> Self {
        let mut surface = Self::new(width, height);
        for row in 0..height {
            for col in 0..width {
                let (Ok(x), Ok(y)) = (u32::try_from(col), u32::try_from(row * 2)) else {
                    continue;
                };

                let maybe_glyph = canvas
                    .glyph(x, y)
                    .or_else(|| canvas.glyph(x, y.saturating_add(1)));
                if let Some(glyph) = maybe_glyph {
                    surface.add_glyph(col, row, glyph);
                    continue;
                }

                let upper = canvas.pixel(x, y).filter(|colour| !Self::is_dark(*colour));
                let lower = canvas
                    .pixel(x, y.saturating_add(1))
                    .filter(|colour| !Self::is_dark(*colour));
                surface.add_pixels(col, row, upper, lower);
            }
        }
        surface
    }

    /// Whether a colour is close enough to black to not bother drawing.
    fn is_dark(colour: Colour) -> bool {
        colour.0.max(colour.1).max(colour.2) < DARKNESS_THRESHOLD
    }

    /// Move the cursor to a cell.
    fn move_to(&mut self, col: usize, row: usize) {
        self.surface.add_change(TermwizChange::CursorPosition {
            x: TermwizPosition::Absolute(col),
            y: TermwizPosition::Absolute(row),
        });
    }

    /// Add a pair of vertically stacked pixels to a cell.
    ///
    /// We default to the upper half block, but when there's only a lower pixel it's impossible to
    /// use the upper half block *whilst retaining the ANSI-coded default background colour*. So
    /// then the lower half block is used instead.
    fn add_pixels(
        &mut self,
        col: usize,
        row: usize,
        maybe_upper: Option<Colour>,
        maybe_lower: Option<Colour>,
    ) {
        let (block, foreground, background) = match (maybe_upper, maybe_lower) {
            (None, None) => return,
            (Some(upper), Some(lower)) => (
                "▀",
                Self::make_fg_colour(upper),
                Self::make_bg_colour(lower),
            ),
            (Some(upper), None) => (
                "▀",
                Self::make_fg_colour(upper),
                Self::make_default_bg_colour(),
            ),
            (None, Some(lower)) => (
                "▄",
                Self::make_fg_colour(lower),
                Self::make_default_bg_colour(),
            ),
        };

        self.move_to(col, row);
        self.surface.add_changes(vec![foreground, background]);
        self.surface.add_change(block);
    }

    /// Add a matrix mode glyph as a whole cell.
    fn add_glyph(&mut self, col: usize, row: usize, glyph: Glyph) {
        self.move_to(col, row);
        self.surface.add_changes(vec![
            Self::make_fg_colour(glyph.colour),
            Self::make_default_bg_colour(),
        ]);
        self.surface.add_change(glyph.character.to_string());
    }

    /// Overlay text at a given coord.
    pub fn add_text(
        &mut self,
        x: usize,
        y: usize,
        text: String,
        maybe_foreground_colour: Option<Colour>,
    ) {
        let fg_colour = maybe_foreground_colour
            .map_or_else(|| Self::make_fg_colour(WHITE), Self::make_fg_colour);

        self.move_to(x, y);
        self.surface
            .add_changes(vec![Self::make_default_bg_colour(), fg_colour]);
        self.surface.add_change(text);
    }

    /// Make a Termwiz colour attribute
    #[must_use]
    pub const fn make_colour_attribute(colour: Colour) -> termwiz::color::ColorAttribute {
        termwiz::color::ColorAttribute::TrueColorWithDefaultFallback(termwiz::color::SrgbaTuple(
            colour.0, colour.1, colour.2, colour.3,
        ))
    }

    /// Make a Termwiz background colour
    #[must_use]
    pub const fn make_bg_colour(colour: Colour) -> TermwizChange {
        let colour_attribute = Self::make_colour_attribute(colour);
        TermwizChange::Attribute(termwiz::cell::AttributeChange::Background(colour_attribute))
    }

    /// Make the default Termwiz background colour. This is the non-colour, usually black, that a
    /// terminal displays when nothing else has been set.
    #[must_use]
    pub const fn make_default_bg_colour() -> TermwizChange {
        let colour_attribute = termwiz::color::ColorAttribute::Default;
        TermwizChange::Attribute(termwiz::cell::AttributeChange::Background(colour_attribute))
    }

    /// Make a Termwiz foreground colour
    #[must_use]
    pub const fn make_fg_colour(colour: Colour) -> TermwizChange {
        let colour_attribute = Self::make_colour_attribute(colour);
        TermwizChange::Attribute(termwiz::cell::AttributeChange::Foreground(colour_attribute))
    }
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "Tests aren't so strict")]
mod test {
    use super::*;

    const GREEN: Colour = (0.0, 1.0, 0.0, 1.0);
    const RED: Colour = (1.0, 0.0, 0.0, 1.0);

    #[test]
    fn pairs_of_pixels_share_a_cell() {
        let mut canvas = Canvas::new(1, 2);
        canvas.fill_rect(0.0, 0.0, 1.0, 1.0, GREEN);
        canvas.fill_rect(0.0, 1.0, 1.0, 1.0, RED);
        let mut surface = Surface::from_canvas(&canvas, 1, 1);

        let cells = surface.surface.screen_cells();
        let cell = &cells[0][0];
        assert_eq!(cell.str(), "▀");
        assert_eq!(
            cell.attrs().foreground(),
            Surface::make_colour_attribute(GREEN)
        );
        assert_eq!(
            cell.attrs().background(),
            Surface::make_colour_attribute(RED)
        );
    }

    #[test]
    fn lone_lower_pixels_keep_the_default_background() {
        let mut canvas = Canvas::new(1, 2);
        canvas.fill_rect(0.0, 1.0, 1.0, 1.0, RED);
        let mut surface = Surface::from_canvas(&canvas, 1, 1);

        let cells = surface.surface.screen_cells();
        let cell = &cells[0][0];
        assert_eq!(cell.str(), "▄");
        assert_eq!(cell.attrs().foreground(), Surface::make_colour_attribute(RED));
        assert_eq!(
            cell.attrs().background(),
            termwiz::color::ColorAttribute::Default
        );
    }

    #[test]
    fn dark_pixels_are_left_blank() {
        let canvas = Canvas::new(2, 2);
        let mut surface = Surface::from_canvas(&canvas, 2, 1);

        let cells = surface.surface.screen_cells();
        let cell = &cells[0][1];
        assert_eq!(cell.str(), " ");
        assert_eq!(
            cell.attrs().background(),
            termwiz::color::ColorAttribute::Default
        );
    }

    #[test]
    fn glyphs_take_a_whole_cell() {
        let mut canvas = Canvas::new(2, 4);
        canvas.draw_glyph('A', 1.0, 3.0, 4.0, GREEN);
        let mut surface = Surface::from_canvas(&canvas, 2, 2);

        let cells = surface.surface.screen_cells();
        let cell = &cells[1][1];
        assert_eq!(cell.str(), "A");
        assert_eq!(
            cell.attrs().foreground(),
            Surface::make_colour_attribute(GREEN)
        );
    }

    #[test]
    fn text_overlays_cells() {
        let mut surface = Surface::new(10, 2);
        surface.add_text(1, 1, "FPS".to_owned(), None);
        let line = surface.surface.screen_lines()[1].as_str().to_string();
        assert_eq!(line, " FPS      ");
    }
}
