//! JBIG2Decode implementation.
//!
//! JBIG2 (Joint Bi-level Image Experts Group 2) compresses monochrome images,
//! typically scanned pages. PDF embeds the format without the file header:
//! the stream is a sequence of segments, optionally preceded by the segments of
//! a shared `/JBIG2Globals` stream.
//!
//! Supported segments are page information, immediate generic regions
//! (arithmetic or MMR coded), end of stripe, end of page and end of file.
//! Symbol, text, halftone and refinement segments are skipped with a warning.
//!
//! JBIG2 uses 1 for black while PDF image samples use 1 for white, so the page
//! bitmap is inverted on output (and on input to the encoder).
//!
//! PDF Spec: ISO 32000-1:2008, Section 7.4.7 - JBIG2Decode Filter

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read};

use super::mq::{ContextStats, MqDecoder, MqEncoder};

const SEGMENT_IMMEDIATE_GENERIC_REGION: u8 = 38;
const SEGMENT_IMMEDIATE_LOSSLESS_GENERIC_REGION: u8 = 39;
const SEGMENT_PAGE_INFORMATION: u8 = 48;
const SEGMENT_END_OF_PAGE: u8 = 49;
const SEGMENT_END_OF_STRIPE: u8 = 50;
const SEGMENT_END_OF_FILE: u8 = 51;

const UNKNOWN_LENGTH: u32 = 0xFFFF_FFFF;

/// Largest bitmap accepted from a stream.
const MAX_PIXELS: u64 = 1 << 30;

/// Size of the region segment information field.
const REGION_INFO_LEN: usize = 17;

/// Packed bi-level image, 1 = black, rows padded to whole bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl Bitmap {
    /// A bitmap filled with `value` (0 or 1).
    pub fn new(width: u32, height: u32, value: u8) -> Self {
        let stride = (width as usize).div_ceil(8);
        let fill = if value != 0 { 0xFF } else { 0x00 };
        Self {
            width,
            height,
            stride,
            data: vec![fill; stride * height as usize],
        }
    }

    /// Wrap packed rows.
    pub fn from_packed(width: u32, height: u32, mut data: Vec<u8>) -> Self {
        let stride = (width as usize).div_ceil(8);
        data.resize(stride * height as usize, 0);
        Self {
            width,
            height,
            stride,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Packed rows.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Pixel value; anything outside the bitmap reads as 0.
    pub fn get(&self, x: i64, y: i64) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return 0;
        }
        let byte = self.data[y as usize * self.stride + x as usize / 8];
        (byte >> (7 - (x as usize % 8))) & 1
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        if x >= self.width || y >= self.height {
            return;
        }
        let index = y as usize * self.stride + x as usize / 8;
        let mask = 0x80 >> (x % 8);
        if value != 0 {
            self.data[index] |= mask;
        } else {
            self.data[index] &= !mask;
        }
    }

    fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.stride]
    }

    fn copy_row(&mut self, from: u32, to: u32) {
        let src = from as usize * self.stride;
        let dst = to as usize * self.stride;
        self.data.copy_within(src..src + self.stride, dst);
    }

    /// Extend the bitmap downwards, filling new rows with `value`.
    ///
    /// Fails without changing the bitmap when the new size exceeds `limit`
    /// bytes or [`MAX_PIXELS`].
    fn grow(&mut self, height: u32, value: u8, limit: usize) -> io::Result<()> {
        if height > self.height {
            check_size(self.width, height, limit)?;
            let fill = if value != 0 { 0xFF } else { 0x00 };
            self.data.resize(self.stride * height as usize, fill);
            self.height = height;
        }
        Ok(())
    }

    /// Combine `region` into this bitmap at (x, y).
    fn compose(&mut self, region: &Bitmap, x: u32, y: u32, op: CombinationOperator) {
        for ry in 0..region.height {
            let py = y.saturating_add(ry);
            if py >= self.height {
                break;
            }
            for rx in 0..region.width {
                let px = x.saturating_add(rx);
                if px >= self.width {
                    break;
                }
                let src = region.get(rx as i64, ry as i64);
                let dst = self.get(px as i64, py as i64);
                self.set(px, py, op.apply(dst, src));
            }
        }
    }

    /// Rows in PDF polarity (1 = white).
    fn to_pdf_samples(&self) -> Vec<u8> {
        self.data.iter().map(|b| !b).collect()
    }
}

/// How a region is combined with the page (7.4.1.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinationOperator {
    Or,
    And,
    Xor,
    Xnor,
    Replace,
}

impl CombinationOperator {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            1 => CombinationOperator::And,
            2 => CombinationOperator::Xor,
            3 => CombinationOperator::Xnor,
            4 => CombinationOperator::Replace,
            _ => CombinationOperator::Or,
        }
    }

    fn apply(self, dst: u8, src: u8) -> u8 {
        match self {
            CombinationOperator::Or => dst | src,
            CombinationOperator::And => dst & src,
            CombinationOperator::Xor => dst ^ src,
            CombinationOperator::Xnor => 1 - (dst ^ src),
            CombinationOperator::Replace => src,
        }
    }
}

/// Generic region template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    T0,
    T1,
    T2,
    T3,
}

impl Template {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Template::T0,
            1 => Template::T1,
            2 => Template::T2,
            _ => Template::T3,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Template::T0 => 0,
            Template::T1 => 1,
            Template::T2 => 2,
            Template::T3 => 3,
        }
    }

    fn context_bits(self) -> u32 {
        match self {
            Template::T0 => 16,
            Template::T1 => 13,
            Template::T2 | Template::T3 => 10,
        }
    }

    fn at_pixel_count(self) -> usize {
        match self {
            Template::T0 => 4,
            _ => 1,
        }
    }

    /// Context used for the "same as previous row" bit (Figures 8-11).
    fn sltp_context(self) -> usize {
        match self {
            Template::T0 => 0b1001_1011_0010_0101,
            Template::T1 => 0b0_0111_1001_0101,
            Template::T2 => 0b00_1110_0101,
            Template::T3 => 0b01_1001_0101,
        }
    }

    /// Neighbourhood from the most significant context bit to the least.
    fn pattern(self) -> &'static [Neighbour] {
        use Neighbour::{At, Fixed};
        match self {
            Template::T0 => &[
                At(3),
                Fixed(-1, -2),
                Fixed(0, -2),
                Fixed(1, -2),
                At(2),
                At(1),
                Fixed(-2, -1),
                Fixed(-1, -1),
                Fixed(0, -1),
                Fixed(1, -1),
                Fixed(2, -1),
                At(0),
                Fixed(-4, 0),
                Fixed(-3, 0),
                Fixed(-2, 0),
                Fixed(-1, 0),
            ],
            Template::T1 => &[
                Fixed(-1, -2),
                Fixed(0, -2),
                Fixed(1, -2),
                Fixed(2, -2),
                Fixed(-2, -1),
                Fixed(-1, -1),
                Fixed(0, -1),
                Fixed(1, -1),
                Fixed(2, -1),
                At(0),
                Fixed(-3, 0),
                Fixed(-2, 0),
                Fixed(-1, 0),
            ],
            Template::T2 => &[
                Fixed(-1, -2),
                Fixed(0, -2),
                Fixed(1, -2),
                Fixed(-2, -1),
                Fixed(-1, -1),
                Fixed(0, -1),
                Fixed(1, -1),
                At(0),
                Fixed(-2, 0),
                Fixed(-1, 0),
            ],
            Template::T3 => &[
                Fixed(-3, -1),
                Fixed(-2, -1),
                Fixed(-1, -1),
                Fixed(0, -1),
                Fixed(1, -1),
                At(0),
                Fixed(-4, 0),
                Fixed(-3, 0),
                Fixed(-2, 0),
                Fixed(-1, 0),
            ],
        }
    }

    /// Nominal adaptive pixel positions (6.2.5.4).
    fn default_at_pixels(self) -> Vec<(i8, i8)> {
        match self {
            Template::T0 => vec![(3, -1), (-3, -1), (2, -2), (-2, -2)],
            Template::T1 => vec![(3, -1)],
            Template::T2 | Template::T3 => vec![(2, -1)],
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Neighbour {
    Fixed(i8, i8),
    At(usize),
}

/// Neighbour offsets with the adaptive pixels filled in.
fn context_offsets(template: Template, at_pixels: &[(i8, i8)]) -> Vec<(i64, i64)> {
    template
        .pattern()
        .iter()
        .map(|n| match *n {
            Neighbour::Fixed(dx, dy) => (dx as i64, dy as i64),
            Neighbour::At(i) => at_pixels
                .get(i)
                .map(|&(dx, dy)| (dx as i64, dy as i64))
                .unwrap_or((0, 0)),
        })
        .collect()
}

fn gather_context(bitmap: &Bitmap, x: u32, y: u32, offsets: &[(i64, i64)]) -> usize {
    offsets.iter().fold(0usize, |cx, &(dx, dy)| {
        (cx << 1) | bitmap.get(x as i64 + dx, y as i64 + dy) as usize
    })
}

/// Region segment information field (7.4.1).
#[derive(Debug, Clone, Copy)]
struct RegionInfo {
    width: u32,
    height: u32,
    x: u32,
    y: u32,
    operator: CombinationOperator,
}

impl RegionInfo {
    fn read(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        let width = cursor.read_u32::<BigEndian>()?;
        let height = cursor.read_u32::<BigEndian>()?;
        let x = cursor.read_u32::<BigEndian>()?;
        let y = cursor.read_u32::<BigEndian>()?;
        let flags = cursor.read_u8()?;
        Ok(Self {
            width,
            height,
            x,
            y,
            operator: CombinationOperator::from_bits(flags),
        })
    }
}

/// Segment header (7.2).
#[derive(Debug, Clone)]
struct SegmentHeader {
    number: u32,
    kind: u8,
    data_length: u32,
}

fn read_segment_header(cursor: &mut Cursor<&[u8]>) -> io::Result<SegmentHeader> {
    let number = cursor.read_u32::<BigEndian>()?;
    let flags = cursor.read_u8()?;
    let kind = flags & 0x3F;
    let long_page_association = flags & 0x40 != 0;

    let first = cursor.read_u8()?;
    let mut referred = (first >> 5) as u32;
    if referred == 7 {
        let mut rest = [0u8; 3];
        cursor.read_exact(&mut rest)?;
        referred = u32::from_be_bytes([first & 0x1F, rest[0], rest[1], rest[2]]);
        let retention_bytes = (referred as u64 + 1).div_ceil(8);
        skip(cursor, retention_bytes)?;
    }

    let referred_size: u64 = if number <= 256 {
        1
    } else if number <= 65_536 {
        2
    } else {
        4
    };
    skip(cursor, referred as u64 * referred_size)?;
    skip(cursor, if long_page_association { 4 } else { 1 })?;

    let data_length = cursor.read_u32::<BigEndian>()?;
    Ok(SegmentHeader {
        number,
        kind,
        data_length,
    })
}

fn skip(cursor: &mut Cursor<&[u8]>, n: u64) -> io::Result<()> {
    let target = cursor.position() + n;
    if target > cursor.get_ref().len() as u64 {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    cursor.set_position(target);
    Ok(())
}

/// Length of an immediate generic region whose header declared an unknown
/// length: the coded data ends with 0xFFAC (arithmetic) or 0x0000 (MMR),
/// followed by a four-byte row count (7.2.7).
fn scan_unknown_length(data: &[u8]) -> Option<usize> {
    let flags = *data.get(REGION_INFO_LEN)?;
    let mmr = flags & 0x01 != 0;
    let at_bytes = if mmr {
        0
    } else {
        2 * Template::from_bits(flags >> 1).at_pixel_count()
    };
    let start = REGION_INFO_LEN + 1 + at_bytes;
    let marker: [u8; 2] = if mmr { [0x00, 0x00] } else { [0xFF, 0xAC] };

    let found = data.get(start..)?.windows(2).position(|w| w == marker)?;
    let end = start + found + 2 + 4;
    (end <= data.len()).then_some(end)
}

/// Every bitmap built from stream data goes through this check: at most
/// [`MAX_PIXELS`] pixels and at most `limit` packed bytes.
fn check_size(width: u32, height: u32, limit: usize) -> io::Result<()> {
    let pixels = width as u64 * height as u64;
    let bytes = (width as u64).div_ceil(8) * height as u64;
    if pixels > MAX_PIXELS || bytes > limit as u64 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bitmap {}x{} too large", width, height),
        ));
    }
    Ok(())
}

/// Page under construction.
struct Page {
    bitmap: Bitmap,
    default_pixel: u8,
    /// Height grows with stripes when the page information left it open.
    open_height: bool,
}

impl Page {
    fn read(data: &[u8], limit: usize) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);
        let width = cursor.read_u32::<BigEndian>()?;
        let height = cursor.read_u32::<BigEndian>()?;
        let _x_resolution = cursor.read_u32::<BigEndian>()?;
        let _y_resolution = cursor.read_u32::<BigEndian>()?;
        let flags = cursor.read_u8()?;
        let default_pixel = (flags >> 2) & 1;
        let open_height = height == UNKNOWN_LENGTH;
        let height = if open_height { 0 } else { height };
        check_size(width, height, limit)?;
        Ok(Self {
            bitmap: Bitmap::new(width, height, default_pixel),
            default_pixel,
            open_height,
        })
    }
}

/// Decode a JBIG2 embedded stream into PDF samples (1 = white).
///
/// Pages and regions larger than `limit` packed bytes are rejected: such a
/// segment is skipped with a warning and the page keeps its current size.
pub fn decode(data: &[u8], globals: Option<&[u8]>, limit: usize) -> Vec<u8> {
    let mut page: Option<Page> = None;

    if let Some(globals) = globals {
        process_segments(globals, &mut page, limit);
    }
    process_segments(data, &mut page, limit);

    match page {
        Some(page) => page.bitmap.to_pdf_samples(),
        None => {
            log::warn!("JBIG2Decode: no page information segment found");
            Vec::new()
        },
    }
}

fn process_segments(data: &[u8], page: &mut Option<Page>, limit: usize) {
    let mut cursor = Cursor::new(data);

    while (cursor.position() as usize) < data.len() {
        let header = match read_segment_header(&mut cursor) {
            Ok(header) => header,
            Err(e) => {
                log::warn!("JBIG2Decode: truncated segment header: {}", e);
                return;
            },
        };

        let start = cursor.position() as usize;
        let remaining = &data[start..];
        let unknown_length = header.data_length == UNKNOWN_LENGTH;
        let length = if unknown_length {
            match scan_unknown_length(remaining) {
                Some(len) => len,
                None => {
                    log::warn!("JBIG2Decode: segment {} has no end marker", header.number);
                    remaining.len()
                },
            }
        } else if header.data_length as usize > remaining.len() {
            log::warn!(
                "JBIG2Decode: segment {} truncated ({} of {} bytes)",
                header.number,
                remaining.len(),
                header.data_length
            );
            remaining.len()
        } else {
            header.data_length as usize
        };
        let segment_data = &remaining[..length];
        cursor.set_position((start + length) as u64);

        match header.kind {
            SEGMENT_PAGE_INFORMATION => match Page::read(segment_data, limit) {
                Ok(p) => *page = Some(p),
                Err(e) => log::warn!("JBIG2Decode: bad page information: {}", e),
            },
            SEGMENT_IMMEDIATE_GENERIC_REGION | SEGMENT_IMMEDIATE_LOSSLESS_GENERIC_REGION => {
                let placed = decode_generic_region(segment_data, unknown_length, limit)
                    .and_then(|(info, region)| place_region(page, &info, &region, limit));
                if let Err(e) = placed {
                    log::warn!("JBIG2Decode: generic region {} failed: {}", header.number, e);
                }
            },
            SEGMENT_END_OF_STRIPE => {
                let end_row = Cursor::new(segment_data).read_u32::<BigEndian>();
                if let (Some(p), Ok(end_row)) = (page.as_mut(), end_row) {
                    if p.open_height {
                        if let Err(e) = p.bitmap.grow(end_row.saturating_add(1), p.default_pixel, limit) {
                            log::warn!("JBIG2Decode: end of stripe at row {}: {}", end_row, e);
                        }
                    }
                }
            },
            SEGMENT_END_OF_PAGE | SEGMENT_END_OF_FILE => return,
            other => {
                log::warn!("JBIG2Decode: skipping unsupported segment type {}", other);
            },
        }
    }
}

fn place_region(page: &mut Option<Page>, info: &RegionInfo, region: &Bitmap, limit: usize) -> io::Result<()> {
    let right = info.x.saturating_add(region.width());
    let bottom = info.y.saturating_add(region.height());
    if page.is_none() {
        log::warn!("JBIG2Decode: region before page information, sizing page to region");
        check_size(right, bottom, limit)?;
    }
    let page = page.get_or_insert_with(|| Page {
        bitmap: Bitmap::new(right, bottom, 0),
        default_pixel: 0,
        open_height: true,
    });
    if page.open_height {
        page.bitmap.grow(bottom, page.default_pixel, limit)?;
    }
    page.bitmap.compose(region, info.x, info.y, info.operator);
    Ok(())
}

/// Decode an immediate generic region segment (7.4.6).
fn decode_generic_region(data: &[u8], unknown_length: bool, limit: usize) -> io::Result<(RegionInfo, Bitmap)> {
    let mut cursor = Cursor::new(data);
    let mut info = RegionInfo::read(&mut cursor)?;
    let flags = cursor.read_u8()?;
    let mmr = flags & 0x01 != 0;
    let template = Template::from_bits(flags >> 1);
    let tpgdon = flags & 0x08 != 0;
    if flags & 0x10 != 0 {
        log::warn!("JBIG2Decode: extended template requested, using nominal template");
    }

    check_size(info.width, info.height, limit)?;

    let mut at_pixels = Vec::new();
    if !mmr {
        for _ in 0..template.at_pixel_count() {
            let dx = cursor.read_i8()?;
            let dy = cursor.read_i8()?;
            at_pixels.push((dx, dy));
        }
    }

    let mut coded = &data[cursor.position() as usize..];
    if unknown_length && coded.len() >= 4 {
        let (head, tail) = coded.split_at(coded.len() - 4);
        let rows = u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]);
        info.height = rows.min(info.height);
        coded = head;
    }

    let bitmap = if mmr {
        decode_mmr(coded, info.width, info.height)
    } else {
        let mut stats = ContextStats::new(template.context_bits());
        decode_arithmetic(coded, info.width, info.height, template, tpgdon, &at_pixels, &mut stats)
    };
    Ok((info, bitmap))
}

/// Generic region decoding with arithmetic coding (6.2.5.7).
pub fn decode_arithmetic(
    data: &[u8],
    width: u32,
    height: u32,
    template: Template,
    tpgdon: bool,
    at_pixels: &[(i8, i8)],
    stats: &mut ContextStats,
) -> Bitmap {
    let mut bitmap = Bitmap::new(width, height, 0);
    let offsets = context_offsets(template, at_pixels);
    let mut decoder = MqDecoder::new(data);
    let mut ltp = false;

    for y in 0..height {
        if tpgdon {
            let sltp = decoder.decode(stats, template.sltp_context());
            ltp ^= sltp != 0;
        }
        if ltp {
            if y > 0 {
                bitmap.copy_row(y - 1, y);
            }
            continue;
        }
        for x in 0..width {
            let cx = gather_context(&bitmap, x, y, &offsets);
            let pixel = decoder.decode(stats, cx);
            bitmap.set(x, y, pixel);
        }
    }

    bitmap
}

/// Generic region decoding with MMR (6.2.6), using the CCITT Group 4 decoder.
/// Rows the data does not cover stay white.
pub fn decode_mmr(data: &[u8], width: u32, height: u32) -> Bitmap {
    let mut bitmap = Bitmap::new(width, height, 0);
    let (Ok(columns), Ok(rows)) = (u16::try_from(width), u16::try_from(height)) else {
        log::warn!("JBIG2Decode: MMR region {}x{} too large", width, height);
        return bitmap;
    };

    let mut y = 0u32;
    let result = fax::decoder::decode_g4(data.iter().copied(), columns, Some(rows), |transitions: &[u16]| {
        if y < height {
            let row = transitions_to_row(transitions, width as usize);
            let start = y as usize * bitmap.stride;
            bitmap.data[start..start + bitmap.stride].copy_from_slice(&row);
        }
        y += 1;
    });

    if result.is_none() || y < height {
        log::warn!("JBIG2Decode: MMR data ended after {} of {} rows", y.min(height), height);
    }
    bitmap
}

/// Convert run transitions (first run white) into a packed row with black = 1.
fn transitions_to_row(transitions: &[u16], width: usize) -> Vec<u8> {
    let mut row = vec![0u8; width.div_ceil(8)];
    let mut black = false;
    let mut start = 0usize;

    for &end in transitions.iter().chain(std::iter::once(&(width as u16))) {
        let end = (end as usize).min(width);
        if black {
            for pixel in start..end {
                row[pixel / 8] |= 0x80 >> (pixel % 8);
            }
        }
        black = !black;
        start = end;
    }

    row
}

/// Encode PDF samples (1 = white, rows padded to whole bytes) as an embedded
/// JBIG2 stream: page information, one immediate lossless generic region
/// coded with template 0 and typical prediction, and end of page.
pub fn encode(samples: &[u8], width: u32, height: u32) -> Vec<u8> {
    let stride = (width as usize).div_ceil(8);
    let mut packed: Vec<u8> = samples.iter().take(stride * height as usize).map(|b| !b).collect();
    packed.resize(stride * height as usize, 0);
    let bitmap = Bitmap::from_packed(width, height, packed);

    let template = Template::T0;
    let at_pixels = template.default_at_pixels();
    let mut stats = ContextStats::new(template.context_bits());
    let coded = encode_arithmetic(&bitmap, template, true, &at_pixels, &mut stats);

    let mut page_info = Vec::with_capacity(19);
    page_info.extend_from_slice(&width.to_be_bytes());
    page_info.extend_from_slice(&height.to_be_bytes());
    page_info.extend_from_slice(&[0; 8]);
    page_info.push(0);
    page_info.extend_from_slice(&[0; 2]);

    let mut region = Vec::with_capacity(REGION_INFO_LEN + 9 + coded.len());
    region.extend_from_slice(&width.to_be_bytes());
    region.extend_from_slice(&height.to_be_bytes());
    region.extend_from_slice(&[0; 8]);
    region.push(0);
    region.push((template.bits() << 1) | 0x08);
    for (dx, dy) in &at_pixels {
        region.push(*dx as u8);
        region.push(*dy as u8);
    }
    region.extend_from_slice(&coded);

    let mut out = Vec::new();
    write_segment(&mut out, 0, SEGMENT_PAGE_INFORMATION, &page_info);
    write_segment(&mut out, 1, SEGMENT_IMMEDIATE_LOSSLESS_GENERIC_REGION, &region);
    write_segment(&mut out, 2, SEGMENT_END_OF_PAGE, &[]);
    out
}

fn write_segment(out: &mut Vec<u8>, number: u32, kind: u8, data: &[u8]) {
    // Writes into a Vec cannot fail.
    let _ = out.write_u32::<BigEndian>(number);
    out.push(kind);
    out.push(0); // no referred-to segments
    out.push(1); // page 1
    let _ = out.write_u32::<BigEndian>(data.len() as u32);
    out.extend_from_slice(data);
}

/// Generic region encoding with arithmetic coding; the inverse of
/// [`decode_arithmetic`].
pub fn encode_arithmetic(
    bitmap: &Bitmap,
    template: Template,
    tpgdon: bool,
    at_pixels: &[(i8, i8)],
    stats: &mut ContextStats,
) -> Vec<u8> {
    let offsets = context_offsets(template, at_pixels);
    let mut encoder = MqEncoder::new();
    let mut ltp = false;
    let blank = vec![0u8; bitmap.stride];

    for y in 0..bitmap.height() {
        if tpgdon {
            let above = if y > 0 { bitmap.row(y - 1) } else { &blank[..] };
            let same = rows_equal(bitmap.row(y), above, bitmap.width());
            encoder.encode(stats, template.sltp_context(), (same != ltp) as u8);
            ltp = same;
            if same {
                continue;
            }
        }
        for x in 0..bitmap.width() {
            let cx = gather_context(bitmap, x, y, &offsets);
            encoder.encode(stats, cx, bitmap.get(x as i64, y as i64));
        }
    }

    encoder.finish()
}

/// Compare two packed rows, ignoring the padding bits.
fn rows_equal(a: &[u8], b: &[u8], width: u32) -> bool {
    let full = width as usize / 8;
    if a[..full] != b[..full] {
        return false;
    }
    let rest = width % 8;
    if rest == 0 {
        return true;
    }
    let mask = 0xFFu8 << (8 - rest);
    a[full] & mask == b[full] & mask
}
