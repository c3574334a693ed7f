//! TIFF and PNG predictor post-processing for Flate and LZW streams.

use super::filters::{DecodeResult, FilterError};
use crate::model::objects::Dictionary;

/// `DecodeParms` entries that drive predictor decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
        }
    }
}

impl PredictorParams {
    pub fn from_dict(parms: Option<&Dictionary>) -> Self {
        let defaults = Self::default();
        let Some(parms) = parms else {
            return defaults;
        };
        let get = |key: &str, default: usize| {
            parms
                .get_i64(key)
                .map_or(default, |v| usize::try_from(v).unwrap_or(0))
        };
        Self {
            predictor: parms.get_i64("Predictor").unwrap_or(defaults.predictor),
            colors: get("Colors", defaults.colors),
            bits_per_component: get("BitsPerComponent", defaults.bits_per_component),
            columns: get("Columns", defaults.columns),
        }
    }

    /// Bytes per row of decoded samples; `None` when the product overflows.
    pub fn row_bytes(&self) -> Option<usize> {
        self.colors
            .checked_mul(self.columns)?
            .checked_mul(self.bits_per_component)
            .map(|bits| bits.div_ceil(8))
    }

    const fn bytes_per_pixel(&self) -> usize {
        let bpp = (self.colors * self.bits_per_component).div_ceil(8);
        if bpp == 0 { 1 } else { bpp }
    }

    /// Check the parameters and return the row length.
    fn validate(&self, filter: &str) -> Result<usize, FilterError> {
        let ok = self.colors >= 1
            && self.colors <= 32
            && self.columns >= 1
            && matches!(self.bits_per_component, 1 | 2 | 4 | 8 | 16);
        match self.row_bytes() {
            Some(row_bytes) if ok => Ok(row_bytes),
            _ => Err(FilterError::new(
                filter,
                format!(
                    "invalid predictor parameters: Colors {} BitsPerComponent {} Columns {}",
                    self.colors, self.bits_per_component, self.columns
                ),
                Vec::new(),
            )),
        }
    }
}

/// Undo the predictor named in `params` on the output of `filter`.
pub fn apply_predictor(filter: &str, data: Vec<u8>, params: &PredictorParams) -> DecodeResult {
    match params.predictor {
        1 => Ok(data),
        2 => {
            let row_bytes = params.validate(filter)?;
            Ok(tiff_predictor(data, row_bytes, params))
        }
        10..=15 => {
            let row_bytes = params.validate(filter)?;
            png_predictor(filter, &data, row_bytes, params)
        }
        other => Err(FilterError::new(
            filter,
            format!("unsupported predictor {other}"),
            data,
        )),
    }
}

/// TIFF predictor 2: horizontal differencing per color component.
fn tiff_predictor(mut data: Vec<u8>, row_bytes: usize, params: &PredictorParams) -> Vec<u8> {
    let colors = params.colors;
    match params.bits_per_component {
        8 => {
            for row in data.chunks_mut(row_bytes) {
                for i in colors..row.len() {
                    row[i] = row[i].wrapping_add(row[i - colors]);
                }
            }
        }
        16 => {
            let stride = colors * 2;
            for row in data.chunks_mut(row_bytes) {
                let mut i = stride;
                while i + 1 < row.len() {
                    let left = u16::from_be_bytes([row[i - stride], row[i - stride + 1]]);
                    let cur = u16::from_be_bytes([row[i], row[i + 1]]);
                    row[i..i + 2].copy_from_slice(&cur.wrapping_add(left).to_be_bytes());
                    i += 2;
                }
            }
        }
        bpc => {
            let samples = colors.saturating_mul(params.columns);
            let mask = (1u16 << bpc) - 1;
            for row in data.chunks_mut(row_bytes) {
                let available = (row.len() * 8 / bpc).min(samples);
                for s in colors..available {
                    let left = read_sample(row, s - colors, bpc);
                    let cur = read_sample(row, s, bpc);
                    write_sample(row, s, bpc, (cur + left) & mask);
                }
            }
        }
    }
    data
}

fn read_sample(row: &[u8], index: usize, bpc: usize) -> u16 {
    let bit = index * bpc;
    let shift = 8 - bpc - bit % 8;
    ((row[bit / 8] >> shift) as u16) & ((1u16 << bpc) - 1)
}

fn write_sample(row: &mut [u8], index: usize, bpc: usize, value: u16) {
    let bit = index * bpc;
    let shift = 8 - bpc - bit % 8;
    let mask = (((1u16 << bpc) - 1) as u8) << shift;
    row[bit / 8] = (row[bit / 8] & !mask) | (((value as u8) << shift) & mask);
}

/// PNG predictors: every row starts with its filter-type byte.
///
/// A short final row is decoded as far as it goes. No row holds more
/// bytes than the input, so the row buffers never outgrow it.
fn png_predictor(filter: &str, data: &[u8], row_bytes: usize, params: &PredictorParams) -> DecodeResult {
    let bpp = params.bytes_per_pixel();
    let buffer = row_bytes.min(data.len());

    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; buffer];
    let mut cur = vec![0u8; buffer];

    for (row_index, chunk) in data.chunks(row_bytes + 1).enumerate() {
        let tag = chunk[0];
        let src = &chunk[1..];
        let len = src.len();

        match tag {
            // None
            0 => cur[..len].copy_from_slice(src),
            // Sub
            1 => {
                for i in 0..len {
                    let left = if i >= bpp { cur[i - bpp] } else { 0 };
                    cur[i] = src[i].wrapping_add(left);
                }
            }
            // Up
            2 => {
                for i in 0..len {
                    cur[i] = src[i].wrapping_add(prev[i]);
                }
            }
            // Average
            3 => {
                for i in 0..len {
                    let left = if i >= bpp { cur[i - bpp] as u16 } else { 0 };
                    let above = prev[i] as u16;
                    cur[i] = src[i].wrapping_add(((left + above) / 2) as u8);
                }
            }
            // Paeth
            4 => {
                for i in 0..len {
                    let left = if i >= bpp { cur[i - bpp] } else { 0 };
                    let upper_left = if i >= bpp { prev[i - bpp] } else { 0 };
                    cur[i] = src[i].wrapping_add(paeth_predictor(left, prev[i], upper_left));
                }
            }
            _ => {
                return Err(FilterError::new(
                    filter,
                    format!("unknown PNG row filter {tag} in row {row_index}"),
                    out,
                ));
            }
        }

        out.extend_from_slice(&cur[..len]);
        std::mem::swap(&mut prev, &mut cur);
    }

    Ok(out)
}

/// Paeth predictor function used in PNG filtering.
const fn paeth_predictor(left: u8, above: u8, upper_left: u8) -> u8 {
    let a = left as i32;
    let b = above as i32;
    let c = upper_left as i32;
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}
