//! Flat row-major containers for matrices and convolution tensors.

use crate::error::{check_len, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: vec![0.0; rows * cols] }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        check_len("matrix data", rows * cols, data.len())?;
        Ok(Self { rows, cols, data })
    }

    /// Builds from nested rows; every row must have the first row's length.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let cols = rows.first().map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for r in &rows {
            check_len("matrix row", cols, r.len())?;
            data.extend_from_slice(r);
        }
        Ok(Self { rows: rows.len(), cols, data })
    }

    pub fn rows(&self) -> usize { self.rows }
    pub fn cols(&self) -> usize { self.cols }
    pub fn as_slice(&self) -> &[f32] { &self.data }
    pub fn as_mut_slice(&mut self) -> &mut [f32] { &mut self.data }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> f32 { self.data[r * self.cols + c] }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, v: f32) { self.data[r * self.cols + c] = v; }

    pub fn row(&self, r: usize) -> &[f32] { &self.data[r * self.cols..(r + 1) * self.cols] }

    pub fn row_mut(&mut self, r: usize) -> &mut [f32] {
        let cols = self.cols;
        &mut self.data[r * cols..(r + 1) * cols]
    }

    pub fn column(&self, c: usize) -> Vec<f32> {
        (0..self.rows).map(|r| self.get(r, c)).collect()
    }
}

/// Feature map laid out `[channels][height][width]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor3 {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    data: Vec<f32>,
}

impl Tensor3 {
    pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
        Self { channels, height, width, data: vec![0.0; channels * height * width] }
    }

    pub fn from_vec(channels: usize, height: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        check_len("tensor3 data", channels * height * width, data.len())?;
        Ok(Self { channels, height, width, data })
    }

    pub fn from_nested(t: Vec<Vec<Vec<f32>>>) -> Result<Self> {
        let channels = t.len();
        let height = t.first().map_or(0, |c| c.len());
        let width = t.first().and_then(|c| c.first()).map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(channels * height * width);
        for c in &t {
            check_len("tensor3 height", height, c.len())?;
            for r in c {
                check_len("tensor3 width", width, r.len())?;
                data.extend_from_slice(r);
            }
        }
        Ok(Self { channels, height, width, data })
    }

    #[inline]
    pub fn get(&self, c: usize, h: usize, w: usize) -> f32 {
        self.data[(c * self.height + h) * self.width + w]
    }

    pub fn as_slice(&self) -> &[f32] { &self.data }
}

/// Convolution weights laid out `[out_channels][in_channels][height][width]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor4 {
    pub out_channels: usize,
    pub in_channels: usize,
    pub height: usize,
    pub width: usize,
    data: Vec<f32>,
}

impl Tensor4 {
    pub fn from_vec(out_channels: usize, in_channels: usize, height: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        check_len("tensor4 data", out_channels * in_channels * height * width, data.len())?;
        Ok(Self { out_channels, in_channels, height, width, data })
    }

    pub fn from_nested(t: Vec<Vec<Vec<Vec<f32>>>>) -> Result<Self> {
        let out_channels = t.len();
        let mut dims: Option<(usize, usize, usize)> = None;
        let mut data = Vec::new();
        for oc in t {
            let slice = Tensor3::from_nested(oc)?;
            let (in_channels, height, width) = *dims.get_or_insert((slice.channels, slice.height, slice.width));
            check_len("tensor4 in_channels", in_channels, slice.channels)?;
            check_len("tensor4 height", height, slice.height)?;
            check_len("tensor4 width", width, slice.width)?;
            data.extend_from_slice(slice.as_slice());
        }
        let (in_channels, height, width) = dims.unwrap_or((0, 0, 0));
        Ok(Self { out_channels, in_channels, height, width, data })
    }

    #[inline]
    pub fn get(&self, oc: usize, ic: usize, h: usize, w: usize) -> f32 {
        self.data[((oc * self.in_channels + ic) * self.height + h) * self.width + w]
    }

    /// One output channel's weights, already in (in_channel, height, width) order.
    pub fn filter(&self, oc: usize) -> &[f32] {
        let n = self.in_channels * self.height * self.width;
        &self.data[oc * n..(oc + 1) * n]
    }

    pub fn as_slice(&self) -> &[f32] { &self.data }
}
