//! Dense row-major float matrix
//!
//! The workhorse container for mel spectrograms and filter banks: explicit
//! stride, borrowed row views, element-wise ops, and a register-blocked
//! multiply. Owning value type; large buffers move, never silently copy.

use rayon::prelude::*;

use crate::error::{DspError, DspResult};

/// Work threshold above which element-wise ops split across rows.
const PARALLEL_ELEMENTS: usize = 1 << 20;

/// `M * N * K` threshold above which the multiply parallelizes row chunks.
const PARALLEL_MATMUL_WORK: usize = 2_000_000;

/// Row chunk granularity for the parallel multiply.
const ROW_CHUNK: usize = 32;

/// K-dimension blocking for the register kernel.
const K_BLOCK: usize = 32;

/// Dense row-major f32 matrix with explicit stride.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatMatrix {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
    stride: usize,
}

impl FloatMatrix {
    /// Zero-filled matrix with `stride == cols`.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
            stride: cols,
        }
    }

    /// Zero-filled matrix with an explicit stride (`stride >= cols`).
    pub fn zeros_with_stride(rows: usize, cols: usize, stride: usize) -> DspResult<Self> {
        if stride < cols {
            return Err(DspError::InvalidArgument(format!(
                "stride {stride} smaller than column count {cols}"
            )));
        }
        Ok(Self {
            data: vec![0.0; rows * stride],
            rows,
            cols,
            stride,
        })
    }

    /// Take ownership of a dense buffer (`stride == cols`).
    pub fn from_vec(data: Vec<f32>, rows: usize, cols: usize) -> DspResult<Self> {
        if data.len() < rows * cols {
            return Err(DspError::InvalidArgument(format!(
                "buffer holds {} values, matrix needs {}",
                data.len(),
                rows * cols
            )));
        }
        Ok(Self {
            data,
            rows,
            cols,
            stride: cols,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Borrowed row view.
    #[inline]
    pub fn row(&self, r: usize) -> &[f32] {
        let start = r * self.stride;
        &self.data[start..start + self.cols]
    }

    /// Mutable row view.
    #[inline]
    pub fn row_mut(&mut self, r: usize) -> &mut [f32] {
        let start = r * self.stride;
        &mut self.data[start..start + self.cols]
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> f32 {
        self.data[r * self.stride + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, v: f32) {
        self.data[r * self.stride + c] = v;
    }

    /// Apply a function to every element in place.
    pub fn map_in_place<F: Fn(f32) -> f32 + Sync>(&mut self, f: F) {
        let cols = self.cols;
        if self.rows * self.cols >= PARALLEL_ELEMENTS {
            self.data
                .par_chunks_mut(self.stride)
                .for_each(|row| row[..cols].iter_mut().for_each(|v| *v = f(*v)));
        } else {
            for r in 0..self.rows {
                self.row_mut(r).iter_mut().for_each(|v| *v = f(*v));
            }
        }
    }

    /// Element-wise `self += other`.
    pub fn add_assign(&mut self, other: &FloatMatrix) -> DspResult<()> {
        self.zip_in_place(other, |a, b| a + b)
    }

    /// Element-wise `self -= other`.
    pub fn sub_assign(&mut self, other: &FloatMatrix) -> DspResult<()> {
        self.zip_in_place(other, |a, b| a - b)
    }

    /// Multiply every element by `k`.
    pub fn scale(&mut self, k: f32) {
        self.map_in_place(|v| v * k);
    }

    fn zip_in_place<F: Fn(f32, f32) -> f32 + Sync>(
        &mut self,
        other: &FloatMatrix,
        f: F,
    ) -> DspResult<()> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(DspError::InvalidArgument(format!(
                "shape mismatch: {}x{} vs {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let cols = self.cols;
        if self.rows * cols >= PARALLEL_ELEMENTS {
            let ostride = other.stride;
            self.data
                .par_chunks_mut(self.stride)
                .zip(other.data.par_chunks(ostride))
                .for_each(|(a, b)| {
                    for c in 0..cols {
                        a[c] = f(a[c], b[c]);
                    }
                });
        } else {
            for r in 0..self.rows {
                let start = r * self.stride;
                let ostart = r * other.stride;
                for c in 0..cols {
                    self.data[start + c] = f(self.data[start + c], other.data[ostart + c]);
                }
            }
        }
        Ok(())
    }

    /// Dense multiply `self * rhs`.
    pub fn matmul(&self, rhs: &FloatMatrix) -> DspResult<FloatMatrix> {
        if self.cols != rhs.rows {
            return Err(DspError::InvalidArgument(format!(
                "matmul shape mismatch: {}x{} * {}x{}",
                self.rows, self.cols, rhs.rows, rhs.cols
            )));
        }

        let m = self.rows;
        let n = rhs.cols;
        let k = self.cols;
        let mut out = FloatMatrix::zeros(m, n);

        let work = m * n * k;
        let chunks = m.div_ceil(ROW_CHUNK);
        if work >= PARALLEL_MATMUL_WORK && chunks > 1 {
            out.data
                .par_chunks_mut(ROW_CHUNK * n)
                .enumerate()
                .for_each(|(chunk, out_rows)| {
                    let row0 = chunk * ROW_CHUNK;
                    let rows = ROW_CHUNK.min(m - row0);
                    multiply_block(self, rhs, row0, rows, out_rows, n, k);
                });
        } else {
            multiply_block(self, rhs, 0, m, &mut out.data, n, k);
        }

        Ok(out)
    }

    /// Cache-blocked transpose.
    pub fn transpose(&self) -> FloatMatrix {
        const BLOCK: usize = 32;
        let mut out = FloatMatrix::zeros(self.cols, self.rows);
        for rb in (0..self.rows).step_by(BLOCK) {
            for cb in (0..self.cols).step_by(BLOCK) {
                let r_end = (rb + BLOCK).min(self.rows);
                let c_end = (cb + BLOCK).min(self.cols);
                for r in rb..r_end {
                    for c in cb..c_end {
                        out.data[c * out.stride + r] = self.data[r * self.stride + c];
                    }
                }
            }
        }
        out
    }
}

/// Multiply `rows` rows of `a` starting at `row0` into `out_rows`
/// (dense, stride `n`). Register-blocked 4x3 kernel, K blocked by 32,
/// with 4x1 / 1x3 / 1x1 tails.
fn multiply_block(
    a: &FloatMatrix,
    b: &FloatMatrix,
    row0: usize,
    rows: usize,
    out_rows: &mut [f32],
    n: usize,
    k: usize,
) {
    let mut r = 0;
    while r + 4 <= rows {
        let a0 = a.row(row0 + r);
        let a1 = a.row(row0 + r + 1);
        let a2 = a.row(row0 + r + 2);
        let a3 = a.row(row0 + r + 3);
        let (o0, rest) = out_rows[r * n..].split_at_mut(n);
        let (o1, rest) = rest.split_at_mut(n);
        let (o2, o3tail) = rest.split_at_mut(n);
        let o3 = &mut o3tail[..n];

        let mut c = 0;
        while c + 3 <= n {
            let mut acc = [[0.0f32; 3]; 4];
            let mut kb = 0;
            while kb < k {
                let k_end = (kb + K_BLOCK).min(k);
                for kk in kb..k_end {
                    let bv = [b.get(kk, c), b.get(kk, c + 1), b.get(kk, c + 2)];
                    let av = [a0[kk], a1[kk], a2[kk], a3[kk]];
                    for (row_acc, &av_r) in acc.iter_mut().zip(&av) {
                        for (cell, &bv_c) in row_acc.iter_mut().zip(&bv) {
                            *cell = av_r.mul_add(bv_c, *cell);
                        }
                    }
                }
                kb = k_end;
            }
            for j in 0..3 {
                o0[c + j] = acc[0][j];
                o1[c + j] = acc[1][j];
                o2[c + j] = acc[2][j];
                o3[c + j] = acc[3][j];
            }
            c += 3;
        }
        // 4x1 column tail
        while c < n {
            let mut acc = [0.0f32; 4];
            for kk in 0..k {
                let bv = b.get(kk, c);
                acc[0] = a0[kk].mul_add(bv, acc[0]);
                acc[1] = a1[kk].mul_add(bv, acc[1]);
                acc[2] = a2[kk].mul_add(bv, acc[2]);
                acc[3] = a3[kk].mul_add(bv, acc[3]);
            }
            o0[c] = acc[0];
            o1[c] = acc[1];
            o2[c] = acc[2];
            o3[c] = acc[3];
            c += 1;
        }
        r += 4;
    }

    // Row tail: 1x3 then 1x1
    while r < rows {
        let arow = a.row(row0 + r);
        let orow = &mut out_rows[r * n..(r + 1) * n];
        let mut c = 0;
        while c + 3 <= n {
            let mut acc = [0.0f32; 3];
            for kk in 0..k {
                let av = arow[kk];
                acc[0] = av.mul_add(b.get(kk, c), acc[0]);
                acc[1] = av.mul_add(b.get(kk, c + 1), acc[1]);
                acc[2] = av.mul_add(b.get(kk, c + 2), acc[2]);
            }
            orow[c] = acc[0];
            orow[c + 1] = acc[1];
            orow[c + 2] = acc[2];
            c += 3;
        }
        while c < n {
            let mut acc = 0.0f32;
            for kk in 0..k {
                acc = arow[kk].mul_add(b.get(kk, c), acc);
            }
            orow[c] = acc;
            c += 1;
        }
        r += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_matmul(a: &FloatMatrix, b: &FloatMatrix) -> FloatMatrix {
        let mut out = FloatMatrix::zeros(a.rows(), b.cols());
        for i in 0..a.rows() {
            for j in 0..b.cols() {
                let mut acc = 0.0f64;
                for kk in 0..a.cols() {
                    acc += a.get(i, kk) as f64 * b.get(kk, j) as f64;
                }
                out.set(i, j, acc as f32);
            }
        }
        out
    }

    fn filled(rows: usize, cols: usize, seed: f32) -> FloatMatrix {
        let mut m = FloatMatrix::zeros(rows, cols);
        for r in 0..rows {
            for c in 0..cols {
                m.set(r, c, ((r * 31 + c * 7) as f32 * seed).sin());
            }
        }
        m
    }

    #[test]
    fn matmul_matches_naive() {
        for &(m, k, n) in &[(1usize, 1usize, 1usize), (4, 32, 3), (5, 7, 11), (13, 64, 9), (33, 100, 17)] {
            let a = filled(m, k, 0.11);
            let b = filled(k, n, 0.37);
            let got = a.matmul(&b).unwrap();
            let want = naive_matmul(&a, &b);
            for i in 0..m {
                for j in 0..n {
                    assert!(
                        (got.get(i, j) - want.get(i, j)).abs() < 1e-3,
                        "({m},{k},{n}) at ({i},{j}): {} vs {}",
                        got.get(i, j),
                        want.get(i, j)
                    );
                }
            }
        }
    }

    #[test]
    fn matmul_rejects_shape_mismatch() {
        let a = FloatMatrix::zeros(2, 3);
        let b = FloatMatrix::zeros(4, 2);
        assert!(a.matmul(&b).is_err());
    }

    #[test]
    fn transpose_roundtrip() {
        let a = filled(37, 53, 0.23);
        let t = a.transpose();
        assert_eq!(t.rows(), 53);
        assert_eq!(t.cols(), 37);
        let back = t.transpose();
        assert_eq!(back, a);
    }

    #[test]
    fn strided_rows_are_independent() {
        let mut m = FloatMatrix::zeros_with_stride(3, 4, 8).unwrap();
        m.row_mut(1).copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(m.row(0), &[0.0; 4]);
        assert_eq!(m.row(1), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(m.row(2), &[0.0; 4]);
    }

    #[test]
    fn stride_below_cols_rejected() {
        assert!(FloatMatrix::zeros_with_stride(2, 8, 4).is_err());
    }

    #[test]
    fn elementwise_ops() {
        let mut a = filled(6, 9, 0.5);
        let b = filled(6, 9, 0.25);
        let before = a.get(2, 3);
        a.add_assign(&b).unwrap();
        assert!((a.get(2, 3) - (before + b.get(2, 3))).abs() < 1e-6);
        a.sub_assign(&b).unwrap();
        assert!((a.get(2, 3) - before).abs() < 1e-6);
        a.scale(2.0);
        assert!((a.get(2, 3) - before * 2.0).abs() < 1e-6);
    }

    #[test]
    fn map_in_place_applies_everywhere() {
        let mut a = FloatMatrix::zeros(4, 4);
        a.map_in_place(|_| 3.0);
        for r in 0..4 {
            assert!(a.row(r).iter().all(|&v| v == 3.0));
        }
    }
}
