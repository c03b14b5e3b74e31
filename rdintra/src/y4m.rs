use crate::error::{Result, SearchError};
use crate::geometry::ChromaFormat;
use crate::picture::Picture;

fn parse_colorspace(val: &str) -> Result<(ChromaFormat, u8)> {
    let (base, depth) = match val.rsplit_once('p') {
        Some((base, depth)) if !depth.is_empty() && depth.bytes().all(|b| b.is_ascii_digit()) => {
            let depth: u8 = depth
                .parse()
                .map_err(|_| SearchError::Y4m(format!("invalid colorspace {val}")))?;
            (base, depth)
        }
        _ => (val, 8),
    };
    let format = if base.starts_with("420") {
        ChromaFormat::Yuv420
    } else if base.starts_with("444") {
        ChromaFormat::Yuv444
    } else if base.starts_with("mono") {
        ChromaFormat::Yuv400
    } else if base.starts_with("422") {
        ChromaFormat::Yuv422
    } else {
        return Err(SearchError::Y4m(format!("unsupported colorspace {val}")));
    };
    Ok((format, depth))
}

/// Parses every frame of a YUV4MPEG2 stream.
pub fn read_y4m(data: &[u8]) -> Result<Vec<Picture>> {
    let header_end = data
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| SearchError::Y4m("no header line".into()))?;
    let header_line = std::str::from_utf8(&data[..header_end])
        .map_err(|_| SearchError::Y4m("header is not UTF-8".into()))?;

    if !header_line.starts_with("YUV4MPEG2") {
        return Err(SearchError::Y4m("missing YUV4MPEG2 signature".into()));
    }

    let mut width = 0u32;
    let mut height = 0u32;
    let mut format = ChromaFormat::Yuv420;
    let mut bit_depth = 8u8;

    for token in header_line.split_whitespace().skip(1) {
        let (key, val) = token.split_at(1);
        match key {
            "W" => {
                width = val
                    .parse()
                    .map_err(|_| SearchError::Y4m(format!("invalid width {val}")))?
            }
            "H" => {
                height = val
                    .parse()
                    .map_err(|_| SearchError::Y4m(format!("invalid height {val}")))?
            }
            "C" => (format, bit_depth) = parse_colorspace(val)?,
            _ => {}
        }
    }

    if width == 0 || height == 0 {
        return Err(SearchError::Y4m("missing W/H in header".into()));
    }
    if format == ChromaFormat::Yuv422 {
        return Err(SearchError::ChromaFormat(format));
    }
    if !(8..=16).contains(&bit_depth) {
        return Err(SearchError::BitDepth(bit_depth));
    }

    let bytes_per_sample = if bit_depth > 8 { 2 } else { 1 };
    let template = Picture::new(width, height, format, bit_depth);
    let frame_samples: usize = template.planes.iter().map(|p| p.data.len()).sum();
    let frame_data_size = frame_samples * bytes_per_sample;
    let frame_marker = b"FRAME";

    let mut frames = Vec::new();
    let mut pos = header_end + 1;

    while pos + frame_marker.len() <= data.len() && &data[pos..pos + frame_marker.len()] == frame_marker
    {
        let line_end = data[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| SearchError::Y4m("unterminated FRAME line".into()))?;
        let pixel_start = pos + line_end + 1;
        if pixel_start + frame_data_size > data.len() {
            return Err(SearchError::Y4m(format!("truncated frame {}", frames.len())));
        }

        let mut picture = template.clone();
        let mut offset = pixel_start;
        for plane in &mut picture.planes {
            for sample in plane.data.iter_mut() {
                *sample = if bytes_per_sample == 2 {
                    u16::from_le_bytes([data[offset], data[offset + 1]])
                } else {
                    data[offset] as u16
                };
                offset += bytes_per_sample;
            }
        }
        frames.push(picture);
        pos = pixel_start + frame_data_size;
    }

    if frames.is_empty() {
        return Err(SearchError::Y4m("no FRAME marker".into()));
    }
    Ok(frames)
}

pub fn read_y4m_file(path: &std::path::Path) -> std::io::Result<Vec<Picture>> {
    let data = std::fs::read(path)?;
    read_y4m(&data).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn colorspace_tag(format: ChromaFormat, bit_depth: u8) -> String {
    let base = match format {
        ChromaFormat::Yuv400 => "mono",
        ChromaFormat::Yuv420 => "420",
        ChromaFormat::Yuv422 => "422",
        ChromaFormat::Yuv444 => "444",
    };
    match (format, bit_depth) {
        (ChromaFormat::Yuv420, 8) => "420jpeg".to_owned(),
        (_, 8) => base.to_owned(),
        (_, depth) => format!("{base}p{depth}"),
    }
}

/// Serialises pictures as a YUV4MPEG2 stream.
pub fn write_y4m(frames: &[Picture]) -> Vec<u8> {
    let Some(first) = frames.first() else {
        return Vec::new();
    };
    let header = format!(
        "YUV4MPEG2 W{} H{} F25:1 Ip C{}\n",
        first.width(),
        first.height(),
        colorspace_tag(first.format, first.bit_depth)
    );
    let mut out = header.into_bytes();
    for frame in frames {
        out.extend_from_slice(b"FRAME\n");
        for plane in &frame.planes {
            for &s in &plane.data {
                if frame.bit_depth > 8 {
                    out.extend_from_slice(&s.to_le_bytes());
                } else {
                    out.push(s as u8);
                }
            }
        }
    }
    out
}
