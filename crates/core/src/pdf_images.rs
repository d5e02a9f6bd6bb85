use crate::extractor::ImageData;
use lopdf::{Dictionary, Document, Object, Stream};

/// Filters lopdf can undo on its own; anything after them is left to the OCR engine.
const INFLATE_FILTERS: [&str; 2] = ["FlateDecode", "LZWDecode"];

#[derive(Debug, Clone, PartialEq)]
enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    Indexed {
        base: Box<ColorSpace>,
        hival: u8,
        lookup: Vec<u8>,
    },
}

impl ColorSpace {
    fn components(&self) -> usize {
        match self {
            ColorSpace::Gray | ColorSpace::Indexed { .. } => 1,
            ColorSpace::Rgb => 3,
            ColorSpace::Cmyk => 4,
        }
    }
}

/// Turns an image XObject into bytes an OCR engine can read.
///
/// Leading Flate/LZW filters are inflated first. What remains decides the
/// result: JPEG and JPEG2000 pass through, CCITT fax data is wrapped in a
/// TIFF container, and unfiltered samples are expanded to 8-bit gray or RGB.
/// Colour spaces are resolved through references, `ICCBased` component
/// counts and `Indexed` palettes.
pub fn image_data(document: &Document, stream: &Stream) -> ImageData {
    decode(document, stream).unwrap_or_else(ImageData::Unsupported)
}

fn decode(document: &Document, stream: &Stream) -> Result<ImageData, String> {
    let dict = &stream.dict;
    let filters = match dict.get(b"Filter") {
        Ok(_) => stream
            .filters()
            .map_err(|error| format!("unreadable filter list: {error}"))?,
        Err(_) => Vec::new(),
    };

    let leading = filters
        .iter()
        .take_while(|filter| INFLATE_FILTERS.contains(&filter.as_str()))
        .count();
    let content = if leading == 0 {
        stream.content.clone()
    } else {
        inflate(document, stream, &filters[..leading])?
    };

    let width = dimension(dict, b"Width")?;
    let height = dimension(dict, b"Height")?;

    match &filters[leading..] {
        [] => pixels(document, dict, width, height, &content),
        [filter] => match filter.as_str() {
            "DCTDecode" => Ok(ImageData::Jpeg(content)),
            "JPXDecode" => Ok(ImageData::Jpeg2000(content)),
            "CCITTFaxDecode" => {
                let params = CcittParams::from_dict(decode_params(document, dict, leading));
                Ok(ImageData::Tiff(ccitt_tiff(
                    width,
                    height,
                    params,
                    decode_inverted(dict),
                    &content,
                )))
            }
            "JBIG2Decode" => Err("JBIG2 images cannot be decoded".to_string()),
            other => Err(format!("filter {other}")),
        },
        rest => Err(format!("filters {rest:?}")),
    }
}

fn inflate(document: &Document, stream: &Stream, filters: &[String]) -> Result<Vec<u8>, String> {
    // lopdf refuses to decompress streams marked as images, so decode a plain copy.
    let mut dict = Dictionary::new();
    dict.set(
        "Filter",
        filters
            .iter()
            .map(|filter| Object::Name(filter.as_bytes().to_vec()))
            .collect::<Vec<_>>(),
    );
    if let Some(params) = decode_params(document, &stream.dict, 0) {
        dict.set("DecodeParms", params.clone());
    }

    Stream::new(dict, stream.content.clone())
        .decompressed_content()
        .map_err(|error| format!("{} stream: {error}", filters.join("+")))
}

fn decode_params<'a>(
    document: &'a Document,
    dict: &'a Dictionary,
    index: usize,
) -> Option<&'a Dictionary> {
    let (_, params) = document.dereference(dict.get(b"DecodeParms").ok()?).ok()?;
    match params {
        Object::Dictionary(params) => Some(params),
        Object::Array(items) => {
            let (_, item) = document.dereference(items.get(index)?).ok()?;
            item.as_dict().ok()
        }
        _ => None,
    }
}

fn dimension(dict: &Dictionary, key: &[u8]) -> Result<u32, String> {
    dict.get(key)
        .and_then(Object::as_i64)
        .ok()
        .and_then(|value| u32::try_from(value).ok())
        .filter(|value| *value > 0)
        .ok_or_else(|| format!("missing or invalid {}", String::from_utf8_lossy(key)))
}

/// `/Decode [1 0]` on a single-component image swaps black and white.
fn decode_inverted(dict: &Dictionary) -> bool {
    let Ok(decode) = dict.get(b"Decode").and_then(Object::as_array) else {
        return false;
    };
    match (
        decode.first().and_then(|value| value.as_float().ok()),
        decode.get(1).and_then(|value| value.as_float().ok()),
    ) {
        (Some(low), Some(high)) => low > high,
        _ => false,
    }
}

fn pixels(
    document: &Document,
    dict: &Dictionary,
    width: u32,
    height: u32,
    data: &[u8],
) -> Result<ImageData, String> {
    let is_mask = dict
        .get(b"ImageMask")
        .and_then(Object::as_bool)
        .unwrap_or(false);

    let (space, bits) = if is_mask {
        (ColorSpace::Gray, 1)
    } else {
        let object = dict
            .get(b"ColorSpace")
            .map_err(|_| "missing color space".to_string())?;
        let bits = dict
            .get(b"BitsPerComponent")
            .and_then(Object::as_i64)
            .map_err(|_| "missing bits per component".to_string())?;
        (color_space(document, object)?, bits)
    };

    let bits = u8::try_from(bits)
        .ok()
        .filter(|bits| matches!(bits, 1 | 2 | 4 | 8 | 16))
        .ok_or_else(|| format!("bits per component {bits}"))?;

    let indexed = matches!(space, ColorSpace::Indexed { .. });
    let mut samples = unpack(
        data,
        width as usize,
        height as usize,
        space.components(),
        bits,
        !indexed,
    )
    .ok_or_else(|| format!("{} bytes do not fill a {width}x{height} image", data.len()))?;

    if space == ColorSpace::Gray && decode_inverted(dict) {
        for sample in &mut samples {
            *sample = 255 - *sample;
        }
    }

    let (channels, samples) = match space {
        ColorSpace::Gray => (1, samples),
        ColorSpace::Rgb => (3, samples),
        ColorSpace::Cmyk => (3, cmyk_to_rgb(&samples)),
        ColorSpace::Indexed {
            base,
            hival,
            lookup,
        } => expand_palette(&samples, &base, hival, &lookup)?,
    };

    Ok(ImageData::Pixels {
        width,
        height,
        channels,
        samples,
    })
}

fn color_space(document: &Document, object: &Object) -> Result<ColorSpace, String> {
    let (_, object) = document
        .dereference(object)
        .map_err(|error| format!("color space: {error}"))?;

    match object {
        Object::Name(name) => named_color_space(name),
        Object::Array(items) => {
            let family = items
                .first()
                .and_then(|family| family.as_name().ok())
                .ok_or_else(|| "empty color space array".to_string())?;

            match family {
                b"ICCBased" => {
                    let profile = items
                        .get(1)
                        .ok_or_else(|| "ICCBased without profile".to_string())?;
                    let (_, profile) = document
                        .dereference(profile)
                        .map_err(|error| format!("ICC profile: {error}"))?;
                    let components = profile
                        .as_stream()
                        .ok()
                        .and_then(|stream| stream.dict.get(b"N").and_then(Object::as_i64).ok());
                    match components {
                        Some(1) => Ok(ColorSpace::Gray),
                        Some(3) => Ok(ColorSpace::Rgb),
                        Some(4) => Ok(ColorSpace::Cmyk),
                        other => Err(format!("ICC profile with {other:?} components")),
                    }
                }
                b"Indexed" | b"I" => indexed(document, items),
                _ => named_color_space(family),
            }
        }
        other => Err(format!("color space {other:?}")),
    }
}

fn named_color_space(name: &[u8]) -> Result<ColorSpace, String> {
    match name {
        b"DeviceGray" | b"CalGray" | b"G" => Ok(ColorSpace::Gray),
        b"DeviceRGB" | b"CalRGB" | b"RGB" => Ok(ColorSpace::Rgb),
        b"DeviceCMYK" | b"CMYK" => Ok(ColorSpace::Cmyk),
        other => Err(format!("color space {}", String::from_utf8_lossy(other))),
    }
}

fn indexed(document: &Document, items: &[Object]) -> Result<ColorSpace, String> {
    let base = items
        .get(1)
        .ok_or_else(|| "Indexed without base".to_string())
        .and_then(|base| color_space(document, base))?;
    if matches!(base, ColorSpace::Indexed { .. }) {
        return Err("nested Indexed color space".to_string());
    }

    let hival = items
        .get(2)
        .and_then(|hival| hival.as_i64().ok())
        .and_then(|hival| u8::try_from(hival).ok())
        .ok_or_else(|| "Indexed without a valid hival".to_string())?;

    let lookup = items
        .get(3)
        .ok_or_else(|| "Indexed without lookup".to_string())?;
    let (_, lookup) = document
        .dereference(lookup)
        .map_err(|error| format!("Indexed lookup: {error}"))?;
    let lookup = match lookup {
        Object::String(bytes, _) => bytes.clone(),
        Object::Stream(stream) => stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone()),
        other => return Err(format!("Indexed lookup {other:?}")),
    };

    Ok(ColorSpace::Indexed {
        base: Box::new(base),
        hival,
        lookup,
    })
}

/// Unpacks rows of `bits`-wide samples (rows padded to whole bytes) into one byte per sample.
///
/// With `scale` the values are stretched to 0..=255; without it they stay as palette indices.
fn unpack(
    data: &[u8],
    width: usize,
    height: usize,
    components: usize,
    bits: u8,
    scale: bool,
) -> Option<Vec<u8>> {
    let per_row = width.checked_mul(components)?;
    let row_bytes = per_row.checked_mul(usize::from(bits))?.div_ceil(8);
    let needed = row_bytes.checked_mul(height)?;
    if row_bytes == 0 || data.len() < needed {
        return None;
    }
    if bits == 8 {
        return Some(data[..needed].to_vec());
    }

    let max = (1u32 << bits) - 1;
    let mut samples = Vec::with_capacity(per_row * height);
    for row in data[..needed].chunks_exact(row_bytes) {
        for index in 0..per_row {
            let value = if bits == 16 {
                u32::from(u16::from_be_bytes([row[index * 2], row[index * 2 + 1]]))
            } else {
                let bit = index * usize::from(bits);
                let shift = 8 - usize::from(bits) - bit % 8;
                u32::from(row[bit / 8] >> shift) & max
            };
            samples.push(if scale {
                (value * 255 / max) as u8
            } else {
                value.min(255) as u8
            });
        }
    }
    Some(samples)
}

fn cmyk_to_rgb(samples: &[u8]) -> Vec<u8> {
    samples
        .chunks_exact(4)
        .flat_map(|pixel| {
            let black = 255 - u32::from(pixel[3]);
            let channel = |ink: u8| ((255 - u32::from(ink)) * black / 255) as u8;
            [channel(pixel[0]), channel(pixel[1]), channel(pixel[2])]
        })
        .collect()
}

fn expand_palette(
    indices: &[u8],
    base: &ColorSpace,
    hival: u8,
    lookup: &[u8],
) -> Result<(u8, Vec<u8>), String> {
    let width = base.components();
    let mut expanded = Vec::with_capacity(indices.len() * width);
    for index in indices {
        let start = usize::from((*index).min(hival)) * width;
        let entry = lookup
            .get(start..start + width)
            .ok_or_else(|| format!("palette has no entry {index}"))?;
        expanded.extend_from_slice(entry);
    }

    Ok(match base {
        ColorSpace::Gray => (1, expanded),
        ColorSpace::Cmyk => (3, cmyk_to_rgb(&expanded)),
        _ => (3, expanded),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CcittParams {
    k: i64,
    black_is_1: bool,
    byte_aligned: bool,
}

impl CcittParams {
    fn from_dict(params: Option<&Dictionary>) -> Self {
        let flag = |key: &[u8]| {
            params
                .and_then(|params| params.get(key).and_then(Object::as_bool).ok())
                .unwrap_or(false)
        };
        Self {
            k: params
                .and_then(|params| params.get(b"K").and_then(Object::as_i64).ok())
                .unwrap_or(0),
            black_is_1: flag(b"BlackIs1"),
            byte_aligned: flag(b"EncodedByteAlign"),
        }
    }
}

const TIFF_SHORT: u16 = 3;
const TIFF_LONG: u16 = 4;

/// Wraps raw CCITT group 3/4 data in a single-strip little-endian TIFF.
fn ccitt_tiff(width: u32, height: u32, params: CcittParams, inverted: bool, data: &[u8]) -> Vec<u8> {
    let compression = if params.k < 0 { 4 } else { 3 };
    // PDF marks black as 0 unless BlackIs1; TIFF photometric 0 means 0 is white.
    let one_is_black = params.black_is_1 != inverted;
    let photometric = if one_is_black { 0 } else { 1 };
    let byte_count = u32::try_from(data.len()).unwrap_or(u32::MAX);

    let mut entries: Vec<(u16, u16, u32)> = vec![
        (256, TIFF_LONG, width),
        (257, TIFF_LONG, height),
        (258, TIFF_SHORT, 1),
        (259, TIFF_SHORT, compression),
        (262, TIFF_SHORT, photometric),
        (273, TIFF_LONG, 0),
        (277, TIFF_SHORT, 1),
        (278, TIFF_LONG, height),
        (279, TIFF_LONG, byte_count),
    ];
    if compression == 3 {
        let mut options = 0;
        if params.k > 0 {
            options |= 1;
        }
        if params.byte_aligned {
            options |= 4;
        }
        entries.push((292, TIFF_LONG, options));
    }

    let data_offset = 8 + 2 + entries.len() * 12 + 4;
    for entry in &mut entries {
        if entry.0 == 273 {
            entry.2 = data_offset as u32;
        }
    }

    let mut tiff = Vec::with_capacity(data_offset + data.len());
    tiff.extend_from_slice(b"II*\0");
    tiff.extend_from_slice(&8u32.to_le_bytes());
    tiff.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, kind, value) in entries {
        tiff.extend_from_slice(&tag.to_le_bytes());
        tiff.extend_from_slice(&kind.to_le_bytes());
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&value.to_le_bytes());
    }
    tiff.extend_from_slice(&0u32.to_le_bytes());
    tiff.extend_from_slice(data);
    tiff
}
