//! TIFF and PNG predictors for LZW/Flate streams.
//!
//! A predictor replaces each sample by its difference from a neighbouring
//! sample before compression. PNG predictors (10-15) prefix every row with a
//! tag byte naming the filter used for that row; TIFF predictor 2 subtracts the
//! previous sample of the same component.
//!
//! Reconstructing a PNG row needs the previous reconstructed row, so rows are
//! processed strictly in order.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};

/// PNG filter type stored in each row's tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PngFilter {
    /// Row stored as-is (tag 0)
    None = 0,
    /// Difference from the byte one pixel to the left (tag 1)
    Sub = 1,
    /// Difference from the byte above (tag 2)
    Up = 2,
    /// Difference from the average of left and above (tag 3)
    Average = 3,
    /// Difference from the Paeth predictor (tag 4)
    Paeth = 4,
}

impl PngFilter {
    /// Filter for a tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(PngFilter::None),
            1 => Some(PngFilter::Sub),
            2 => Some(PngFilter::Up),
            3 => Some(PngFilter::Average),
            4 => Some(PngFilter::Paeth),
            _ => None,
        }
    }

    const ALL: [PngFilter; 5] = [
        PngFilter::None,
        PngFilter::Sub,
        PngFilter::Up,
        PngFilter::Average,
        PngFilter::Paeth,
    ];
}

/// Predictor parameters from a `/DecodeParms` dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: u8,
    /// Samples per row
    pub columns: usize,
    /// Color components per sample
    pub colors: usize,
    /// Bits per color component
    pub bits_per_component: usize,
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl PredictorParams {
    /// Read predictor entries from a parameter dictionary, falling back to defaults.
    pub fn from_dict(dict: &Dictionary) -> Self {
        let defaults = Self::default();
        let predictor = dict
            .get_integer("Predictor")
            .and_then(|p| u8::try_from(p).ok())
            .unwrap_or(defaults.predictor);
        let columns = dict
            .get_integer("Columns")
            .filter(|&c| c > 0)
            .map(|c| c as usize)
            .unwrap_or(defaults.columns);
        let colors = dict
            .get_integer("Colors")
            .filter(|&c| (1..=32).contains(&c))
            .map(|c| c as usize)
            .unwrap_or(defaults.colors);
        let bits_per_component = dict
            .get_integer("BitsPerComponent")
            .filter(|b| matches!(b, 1 | 2 | 4 | 8 | 16))
            .map(|b| b as usize)
            .unwrap_or(defaults.bits_per_component);

        Self {
            predictor,
            columns,
            colors,
            bits_per_component,
        }
    }

    /// Whether the data is stored without prediction.
    pub fn is_identity(&self) -> bool {
        self.predictor < 2
    }

    /// Add the non-default entries to a parameter dictionary.
    pub fn write_to_dict(&self, dict: &mut Dictionary) {
        if self.is_identity() {
            return;
        }
        dict.insert("Predictor", Object::from(self.predictor as i64));
        if self.colors != 1 {
            dict.insert("Colors", Object::from(self.colors as i64));
        }
        if self.bits_per_component != 8 {
            dict.insert("BitsPerComponent", Object::from(self.bits_per_component as i64));
        }
        if self.columns != 1 {
            dict.insert("Columns", Object::from(self.columns as i64));
        }
    }

    /// Bytes of sample data per row, without the PNG tag byte.
    ///
    /// `None` when the row size overflows or is zero.
    pub fn row_bytes(&self) -> Option<usize> {
        self.columns
            .checked_mul(self.colors)?
            .checked_mul(self.bits_per_component)
            .map(|bits| bits.div_ceil(8))
            .filter(|&len| len > 0)
    }

    /// Bytes per complete pixel, at least one.
    pub fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Undo a predictor.
///
/// Unknown predictor values and unusable row sizes pass the data through with
/// a warning. A truncated final row is reconstructed as far as it goes.
pub fn decode(data: &[u8], params: &PredictorParams) -> Vec<u8> {
    if params.is_identity() {
        return data.to_vec();
    }
    let Some(row_len) = params.row_bytes() else {
        log::warn!(
            "Predictor row size invalid ({} columns x {} colors x {} bits), passing data through",
            params.columns,
            params.colors,
            params.bits_per_component
        );
        return data.to_vec();
    };
    match params.predictor {
        2 => decode_tiff(data, params, row_len),
        10..=15 => decode_png(data, row_len, params.bytes_per_pixel()),
        other => {
            log::warn!("Unsupported predictor {}, passing data through", other);
            data.to_vec()
        },
    }
}

/// Apply a predictor.
///
/// Predictors 10-14 use PNG filter `predictor - 10` on every row; 15 picks the
/// filter per row that minimises the sum of absolute differences.
pub fn encode(data: &[u8], params: &PredictorParams) -> Result<Vec<u8>> {
    if params.is_identity() {
        return Ok(data.to_vec());
    }
    let row_len = params.row_bytes().ok_or_else(|| {
        Error::Decode(format!(
            "Predictor row size invalid ({} columns x {} colors x {} bits)",
            params.columns, params.colors, params.bits_per_component
        ))
    })?;
    Ok(match params.predictor {
        2 => encode_tiff(data, params, row_len),
        10..=15 => encode_png(data, params, row_len),
        _ => data.to_vec(),
    })
}

fn decode_png(data: &[u8], row_len: usize, bpp: usize) -> Vec<u8> {
    // A row never holds more bytes than the input.
    let mut prev = vec![0u8; row_len.min(data.len())];
    let mut output = Vec::with_capacity(data.len());

    for chunk in data.chunks(row_len.saturating_add(1)) {
        let tag = chunk[0];
        let encoded = &chunk[1..];
        let filter = PngFilter::from_tag(tag).unwrap_or_else(|| {
            log::warn!("Invalid PNG predictor tag {}, treating row as unfiltered", tag);
            PngFilter::None
        });

        let mut row = encoded.to_vec();
        unfilter_row(filter, &mut row, &prev, bpp);
        output.extend_from_slice(&row);

        if row.len() < row_len {
            log::warn!("PNG predictor: last row truncated ({} of {} bytes)", row.len(), row_len);
            break;
        }
        prev = row;
    }

    output
}

/// Reconstruct one PNG row in place given the previous reconstructed row.
pub fn unfilter_row(filter: PngFilter, row: &mut [u8], prev: &[u8], bpp: usize) {
    for i in 0..row.len() {
        let left = if i >= bpp { row[i - bpp] } else { 0 };
        let up = prev.get(i).copied().unwrap_or(0);
        let up_left = if i >= bpp {
            prev.get(i - bpp).copied().unwrap_or(0)
        } else {
            0
        };
        let predicted = predict(filter, left, up, up_left);
        row[i] = row[i].wrapping_add(predicted);
    }
}

/// Filter one row given the previous (unfiltered) row.
pub fn filter_row(filter: PngFilter, row: &[u8], prev: &[u8], bpp: usize) -> Vec<u8> {
    (0..row.len())
        .map(|i| {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev.get(i).copied().unwrap_or(0);
            let up_left = if i >= bpp {
                prev.get(i - bpp).copied().unwrap_or(0)
            } else {
                0
            };
            row[i].wrapping_sub(predict(filter, left, up, up_left))
        })
        .collect()
}

fn predict(filter: PngFilter, left: u8, up: u8, up_left: u8) -> u8 {
    match filter {
        PngFilter::None => 0,
        PngFilter::Sub => left,
        PngFilter::Up => up,
        PngFilter::Average => ((left as u16 + up as u16) / 2) as u8,
        PngFilter::Paeth => paeth_predictor(left, up, up_left),
    }
}

/// Paeth predictor function from the PNG specification.
fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    let (ia, ib, ic) = (a as i16, b as i16, c as i16);
    let p = ia + ib - ic;
    let pa = (p - ia).abs();
    let pb = (p - ib).abs();
    let pc = (p - ic).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn encode_png(data: &[u8], params: &PredictorParams, row_len: usize) -> Vec<u8> {
    let bpp = params.bytes_per_pixel();
    let fixed = PngFilter::from_tag(params.predictor.saturating_sub(10));
    let mut prev = vec![0u8; row_len.min(data.len())];
    let mut output = Vec::with_capacity(data.len() + data.len() / row_len + 1);

    for row in data.chunks(row_len) {
        let (filter, filtered) = match (params.predictor, fixed) {
            (10..=14, Some(filter)) => (filter, filter_row(filter, row, &prev, bpp)),
            _ => PngFilter::ALL
                .iter()
                .map(|&f| (f, filter_row(f, row, &prev, bpp)))
                .min_by_key(|(_, bytes)| {
                    bytes.iter().map(|&b| (b as i8).unsigned_abs() as u64).sum::<u64>()
                })
                .unwrap_or((PngFilter::None, row.to_vec())),
        };
        output.push(filter as u8);
        output.extend_from_slice(&filtered);
        prev = row.to_vec();
    }

    output
}

fn decode_tiff(data: &[u8], params: &PredictorParams, row_len: usize) -> Vec<u8> {
    let mut output = data.to_vec();

    for row in output.chunks_mut(row_len) {
        match params.bits_per_component {
            8 => {
                for i in params.colors..row.len() {
                    row[i] = row[i].wrapping_add(row[i - params.colors]);
                }
            },
            bits => {
                let samples = samples_in(row.len(), bits, params.columns * params.colors);
                for i in params.colors..samples {
                    let left = read_sample(row, i - params.colors, bits);
                    let value = read_sample(row, i, bits);
                    write_sample(row, i, bits, value.wrapping_add(left));
                }
            },
        }
    }

    output
}

fn encode_tiff(data: &[u8], params: &PredictorParams, row_len: usize) -> Vec<u8> {
    let mut output = data.to_vec();

    for row in output.chunks_mut(row_len) {
        let samples = samples_in(row.len(), params.bits_per_component, params.columns * params.colors);
        // Walk right to left so each left neighbour is still the original value.
        for i in (params.colors..samples).rev() {
            let bits = params.bits_per_component;
            let left = read_sample(row, i - params.colors, bits);
            let value = read_sample(row, i, bits);
            write_sample(row, i, bits, value.wrapping_sub(left));
        }
    }

    output
}

fn samples_in(row_len: usize, bits: usize, per_row: usize) -> usize {
    (row_len * 8 / bits).min(per_row)
}

fn read_sample(row: &[u8], index: usize, bits: usize) -> u16 {
    match bits {
        8 => row[index] as u16,
        16 => u16::from_be_bytes([row[index * 2], row[index * 2 + 1]]),
        _ => {
            let bit = index * bits;
            let shift = 8 - bits - (bit % 8);
            ((row[bit / 8] >> shift) as u16) & ((1 << bits) - 1)
        },
    }
}

fn write_sample(row: &mut [u8], index: usize, bits: usize, value: u16) {
    match bits {
        8 => row[index] = value as u8,
        16 => row[index * 2..index * 2 + 2].copy_from_slice(&value.to_be_bytes()),
        _ => {
            let bit = index * bits;
            let shift = 8 - bits - (bit % 8);
            let mask = (((1u16 << bits) - 1) as u8) << shift;
            let byte = &mut row[bit / 8];
            *byte = (*byte & !mask) | (((value as u8) << shift) & mask);
        },
    }
}
