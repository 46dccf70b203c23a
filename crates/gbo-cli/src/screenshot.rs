use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

pub const WIDTH: u32 = 160;
pub const HEIGHT: u32 = 144;

/// Write a packed RGB frame as an 8-bit PNG.
pub fn save_png(path: &Path, rgb: &[u8]) -> io::Result<()> {
    let expected = (WIDTH * HEIGHT * 3) as usize;
    if rgb.len() != expected {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame is {} bytes, expected {expected}", rgb.len()),
        ));
    }

    let file = File::create(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), WIDTH, HEIGHT);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().map_err(io::Error::other)?;
    writer.write_image_data(rgb).map_err(io::Error::other)?;
    writer.finish().map_err(io::Error::other)?;
    Ok(())
}
