use crate::audio::EffectSpec;
use crate::compose::Background;

pub fn scale_filter(width: u32, height: u32) -> String {
    format!("scale={width}:{height}")
}

pub fn overlay_filter(x: u32, y: u32) -> String {
    format!("overlay=x={x}:y={y}")
}

/// `name=value`, e.g. `reverb=0.15`. Names are checked later against the registry.
pub fn parse_effect_spec(raw: &str) -> Result<EffectSpec, String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("`{raw}` must look like name=value (e.g. reverb=0.15)"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("`{raw}` is missing an effect name"));
    }
    let param: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    Ok(EffectSpec::new(name, param))
}

/// `default` (palette of the visual), `none`, `R,G,B` or `#rrggbb`.
pub fn parse_background(raw: &str) -> Result<Background, String> {
    let raw = raw.trim();
    match raw.to_ascii_lowercase().as_str() {
        "default" | "palette" | "auto" => return Ok(Background::FromSource),
        "none" | "off" => return Ok(Background::None),
        _ => {}
    }

    if let Some(hex) = raw.strip_prefix('#') {
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(format!("`{raw}` must be #rrggbb"));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| format!("`{raw}` must be #rrggbb"))
        };
        return Ok(Background::Color([channel(0)?, channel(2)?, channel(4)?]));
    }

    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!(
            "`{raw}` must be default, none, R,G,B or #rrggbb"
        ));
    }
    let mut rgb = [0u8; 3];
    for (slot, part) in rgb.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("`{part}` must be an integer between 0 and 255"))?;
    }
    Ok(Background::Color(rgb))
}

pub fn validate_seconds(raw: &str) -> Result<f64, String> {
    let parsed: f64 = raw
        .parse()
        .map_err(|_| format!("`{raw}` must be a number of seconds"))?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err("value must be a non-negative number of seconds".into());
    }
    Ok(parsed)
}
