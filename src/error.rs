use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackdropError>;

#[derive(Error, Debug)]
pub enum BackdropError {
    #[error("buffer of {len} bytes does not hold {width}x{height} RGBA pixels")]
    BufferSize { width: u32, height: u32, len: usize },

    #[error("mask has no pixels ({width}x{height})")]
    EmptyMask { width: u32, height: u32 },

    #[error("matte is {matte_width}x{matte_height} but frame is {frame_width}x{frame_height}")]
    DimensionMismatch {
        frame_width: u32,
        frame_height: u32,
        matte_width: u32,
        matte_height: u32,
    },

    #[error("background image has no pixels")]
    EmptyBackground,

    #[error("failed to load background image: {0}")]
    Background(#[from] image::ImageError),

    #[error("mask oracle is unavailable: {0}")]
    OracleUnavailable(String),
}
