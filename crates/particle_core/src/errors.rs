//! Errors for this library

/// All the known errors returned by this crate.
#[derive(Debug, snafu::Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum ParticleError {
    #[snafu(display("Invalid surface dimensions: {width}x{height}"))]
    /// The drawing surface must have a width and height of at least 1 pixel.
    InvalidDimensions {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    #[snafu(display("Invalid pixel buffer: {reason}"))]
    /// The pixel data handed to the sampler doesn't match its stated dimensions.
    InvalidInput {
        /// What exactly was wrong
        reason: String,
    },

    #[snafu(display("Couldn't decode image"))]
    /// The uploaded bytes could not be decoded into a drawable image.
    ImageDecode {
        /// The parent error type
        source: image::ImageError,
    },

    #[snafu(display("Invalid colour: '{colour}'"))]
    /// Colours must be hex strings like `#00ff41`.
    InvalidColour {
        /// The colour as given
        colour: String,
        /// The parent error type
        source: palette::rgb::FromHexError,
    },

    #[snafu(display("Invalid particle config: {reason}"))]
    /// A tunable parameter is outside of its allowed range.
    InvalidConfig {
        /// Which parameter and why
        reason: String,
    },

    /// General errors that don't need to be matched on
    #[snafu(whatever, display("{message}"))]
    Whatever {
        /// A helpful message acompanying the error
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error + Send + Sync>, Some)))]
        /// The parent error type
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}
