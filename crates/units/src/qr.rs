//! QR code rendering to an inline PNG data URL.

use std::io::Cursor;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{GrayImage, ImageFormat, Luma};
use qrcode::{Color, EcLevel, QrCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{parse_args, EntryPoint, Parameters, UnitError};

const MAX_BOX_SIZE: u32 = 100;
const MAX_BORDER: u32 = 100;
const MAX_IMAGE_SIDE: u32 = 8192;

fn default_size() -> u32 {
    10
}

fn default_border() -> u32 {
    4
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QrArgs {
    text: String,
    /// Pixels per module.
    #[serde(default = "default_size")]
    size: u32,
    /// Quiet zone width, in modules.
    #[serde(default = "default_border")]
    border: u32,
}

pub struct GenerateQr;

#[async_trait]
impl EntryPoint for GenerateQr {
    async fn call(&self, params: Parameters) -> Result<Value, UnitError> {
        generate_qr(parse_args(params)?)
    }
}

fn generate_qr(args: QrArgs) -> Result<Value, UnitError> {
    if args.text.is_empty() {
        return Err(UnitError::failed("Text cannot be empty"));
    }
    if !(1..=MAX_BOX_SIZE).contains(&args.size) {
        return Err(UnitError::failed(format!(
            "Size must be between 1 and {MAX_BOX_SIZE}"
        )));
    }
    if args.border > MAX_BORDER {
        return Err(UnitError::failed(format!(
            "Border must be at most {MAX_BORDER}"
        )));
    }

    let code = QrCode::with_error_correction_level(args.text.as_bytes(), EcLevel::L)
        .map_err(|err| UnitError::failed(err.to_string()))?;
    let png = render_png(&code, args.size, args.border)?;

    Ok(json!({
        "text": args.text,
        "qr_code": format!("data:image/png;base64,{}", STANDARD.encode(png)),
        "size": args.size,
        "border": args.border,
        "format": "PNG",
    }))
}

/// Draws dark modules black on white, scaled by `size` and padded by `border`
/// light modules on every side.
fn render_png(code: &QrCode, size: u32, border: u32) -> Result<Vec<u8>, UnitError> {
    let width = code.width();
    let colors = code.to_colors();
    let modules = width as u32 + 2 * border;
    let side = modules * size;
    if side > MAX_IMAGE_SIDE {
        return Err(UnitError::failed(format!(
            "QR image would be {side}px wide, the limit is {MAX_IMAGE_SIDE}px"
        )));
    }

    let image = GrayImage::from_fn(side, side, |x, y| {
        let (mx, my) = (x / size, y / size);
        let dark = mx >= border
            && my >= border
            && mx < border + width as u32
            && my < border + width as u32
            && colors[(my - border) as usize * width + (mx - border) as usize] == Color::Dark;
        if dark {
            Luma([0])
        } else {
            Luma([255])
        }
    });

    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|err| UnitError::failed(format!("could not encode PNG: {err}")))?;
    Ok(out.into_inner())
}

#[cfg(test)]
#[path = "tests/qr_tests.rs"]
mod tests;
