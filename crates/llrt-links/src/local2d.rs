//! Locally-connected 2D link: the connectivity pattern of a (possibly
//! strided, possibly atrous) convolution.
//!
//! A rectangular filter moves over end 0 in steps of `stride`; each filter
//! placement connects the covered end-0 cells to one end-1 cell. Components
//! may be (rows, cols) or (rows, cols, depth); cells at a connected (row,
//! col) pair are fully connected across depth. `edge_info` numbers the
//! filter positions row-major (for a 3×3 filter, 0..9 left-to-right,
//! top-to-bottom), usable as an index into a convolution kernel.
//!
//! Iteration walks row by row, and splits are quantized at whole rows of
//! the near end via per-row cumulative edge counts. Rows are the natural
//! near-node-aligned boundary here: a row boundary never divides one near
//! node's edges between two chunks.

use crate::pattern::{EdgeIndices, End, LinkPattern};
use llrt_core::DataVec;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// With stride 1, end 1 is the same size as end 0.
    Same,
    /// The filter is always fully contained within end 0.
    Valid,
}

#[derive(Clone, Copy, Debug)]
struct SquareSpec {
    filter: usize,
    stride: usize,
    padding: Padding,
}

#[derive(Clone, Default)]
pub struct Local2dLink {
    start_row: i64,
    start_col: i64,
    filter_rows: usize,
    filter_cols: usize,
    stride_rows: usize,
    stride_cols: usize,
    atrous_rows: usize,
    atrous_cols: usize,

    end0_rows: usize,
    end0_cols: usize,
    end0_depth: usize,
    end1_rows: usize,
    end1_cols: usize,
    end1_depth: usize,

    // cum_end0[r] is the number of edges in end-0 rows 0..=r; likewise for
    // end 1. Split points are values of these arrays.
    cum_end0: Vec<u64>,
    cum_end1: Vec<u64>,

    square: Option<SquareSpec>,
    edge_data: Option<[Arc<dyn DataVec>; 2]>,
    dirty: bool,
}

impl std::fmt::Debug for Local2dLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Local2dLink(end0 {}x{}x{} end1 {}x{}x{} start {},{} filter {}x{} stride {},{} atrous {},{})",
            self.end0_rows, self.end0_cols, self.end0_depth,
            self.end1_rows, self.end1_cols, self.end1_depth,
            self.start_row, self.start_col,
            self.filter_rows, self.filter_cols,
            self.stride_rows, self.stride_cols,
            self.atrous_rows, self.atrous_cols,
        )
    }
}

/// Round a/b toward negative infinity. b must be positive.
fn div_round_neginf(a: i64, b: i64) -> i64 {
    if a >= 0 || a % b == 0 {
        a / b
    } else {
        a / b - 1
    }
}

/// Round a/b up. b must be positive. For negative a this overshoots by one
/// when b does not divide a; callers clamp the result to a row range, which
/// absorbs the overshoot.
fn div_round_posinf(a: i64, b: i64) -> i64 {
    if a % b == 0 {
        a / b
    } else {
        a / b + 1
    }
}

impl Local2dLink {
    /// Fully general parameterization. Dimension deduction is unavailable;
    /// connect with explicit dimensions.
    #[allow(clippy::too_many_arguments)]
    pub fn with_params(
        start_row: i64,
        start_col: i64,
        filter_rows: usize,
        filter_cols: usize,
        stride_rows: usize,
        stride_cols: usize,
        atrous_rows: usize,
        atrous_cols: usize,
    ) -> Self {
        let mut l = Self::default();
        l.set_params(
            start_row,
            start_col,
            filter_rows,
            filter_cols,
            stride_rows,
            stride_cols,
            atrous_rows,
            atrous_cols,
        );
        l
    }

    /// Square filter with the usual padding conventions; supports dimension
    /// deduction in both directions.
    pub fn square(filter: usize, stride: usize, atrous: usize, padding: Padding) -> Self {
        let start = match padding {
            Padding::Same => -(((filter / 2) * stride) as i64),
            Padding::Valid => 0,
        };
        let mut l = Self::with_params(start, start, filter, filter, stride, stride, atrous, atrous);
        l.square = Some(SquareSpec {
            filter,
            stride,
            padding,
        });
        l
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_params(
        &mut self,
        start_row: i64,
        start_col: i64,
        filter_rows: usize,
        filter_cols: usize,
        stride_rows: usize,
        stride_cols: usize,
        atrous_rows: usize,
        atrous_cols: usize,
    ) {
        self.start_row = start_row;
        self.start_col = start_col;
        self.filter_rows = filter_rows;
        self.filter_cols = filter_cols;
        self.stride_rows = stride_rows;
        self.stride_cols = stride_cols;
        self.atrous_rows = atrous_rows;
        self.atrous_cols = atrous_cols;
        self.dirty = true;
        self.initialize();
    }

    fn split_dims(dims: &[usize]) -> (usize, usize, usize) {
        let depth = if dims.len() == 3 { dims[2] } else { 1 };
        (dims[0], dims[1], depth)
    }

    /// All edges of one (filter row, end-1 row) pairing, across every end-1
    /// column. The edge index advances even over out-of-bounds columns so
    /// that edge-data slots are stable under the iteration origin.
    fn row_row<F: FnMut(EdgeIndices)>(
        &self,
        filter_row: usize,
        end1_row: usize,
        f: &mut F,
        near_is_end1: bool,
    ) {
        let end0_row = end1_row as i64 * self.stride_rows as i64
            + filter_row as i64 * self.atrous_rows as i64
            + self.start_row;
        if end0_row < 0 || end0_row >= self.end0_rows as i64 {
            return;
        }

        let edge_info_start = filter_row * self.filter_cols;
        let end0_base_row = end0_row as usize * self.end0_cols * self.end0_depth;
        let end1_base_row = end1_row * self.end1_cols * self.end1_depth;

        let mut edge_ix = end1_row
            * (self.end1_cols * self.filter_rows * self.filter_cols * self.end0_depth * self.end1_depth)
            + filter_row * (self.end1_cols * self.filter_cols * self.end1_depth * self.end0_depth);
        let mut cur_left = self.start_col;
        let span = (self.filter_cols * self.atrous_cols) as i64;

        for end1_col in 0..self.end1_cols {
            let mut edge_info = edge_info_start;
            let mut end0_col = cur_left;
            while end0_col < cur_left + span {
                if end0_col < 0 || end0_col >= self.end0_cols as i64 {
                    edge_info += 1;
                    edge_ix += self.end0_depth * self.end1_depth;
                    end0_col += self.atrous_cols as i64;
                    continue;
                }
                let end0_base = end0_base_row + end0_col as usize * self.end0_depth;
                let end1_base = end1_base_row + end1_col * self.end1_depth;
                for i in 0..self.end1_depth {
                    for j in 0..self.end0_depth {
                        let e0 = end0_base + j;
                        let e1 = end1_base + i;
                        if near_is_end1 {
                            f(EdgeIndices {
                                near_node: e1,
                                near_edge: edge_ix,
                                far_node: e0,
                                far_edge: edge_ix,
                                info: edge_info,
                            });
                        } else {
                            f(EdgeIndices {
                                near_node: e0,
                                near_edge: edge_ix,
                                far_node: e1,
                                far_edge: edge_ix,
                                info: edge_info,
                            });
                        }
                        edge_ix += 1;
                    }
                }
                edge_info += 1;
                end0_col += self.atrous_cols as i64;
            }
            cur_left += self.stride_cols as i64;
        }
    }

    /// Iterate exactly the edges whose end-0 row lies in
    /// `[end0_row_start, end0_row_end)`, for an end-0-near iteration.
    fn row_finding<F: FnMut(EdgeIndices)>(
        &self,
        end0_row_start: usize,
        end0_row_end: usize,
        f: &mut F,
    ) {
        if self.end1_rows == 0 {
            return;
        }
        // Invert end0_row = end1_row * stride + filter_row * atrous + start
        // for the smallest end-1 row that can reach end0_row_start.
        let e1_start_signed = div_round_neginf(
            end0_row_start as i64 - self.start_row - (self.filter_rows * self.atrous_rows) as i64,
            self.stride_rows as i64,
        );
        let e1_start = if e1_start_signed < 0 {
            0
        } else {
            (e1_start_signed as usize).min(self.end1_rows - 1)
        };

        let e1_end_signed =
            div_round_posinf(end0_row_end as i64 - self.start_row, self.stride_rows as i64);
        let e1_end = if e1_end_signed < 0 {
            0
        } else {
            (e1_end_signed as usize).min(self.end1_rows)
        };

        for end1_row in e1_start..e1_end {
            for filter_row in 0..self.filter_rows {
                let end0_row = (end1_row * self.stride_rows) as i64
                    + (filter_row * self.atrous_rows) as i64
                    + self.start_row;
                if end0_row >= end0_row_start as i64 && end0_row < end0_row_end as i64 {
                    self.row_row(filter_row, end1_row, f, false);
                }
            }
        }
    }

    fn initialize(&mut self) {
        if !self.dirty {
            return;
        }
        if self.end1_rows == 0 || self.filter_rows == 0 {
            // Incomplete parameters; wait for the rest.
            return;
        }
        self.cum_end0 = vec![0; self.end0_rows];
        self.cum_end1 = vec![0; self.end1_rows];

        // Every in-bounds (filter row, end-1 row) pairing visits the same
        // number of edges, so count one and reuse it.
        let mut row_row_size: u64 = 0;
        for end1_row in 0..self.end1_rows {
            for filter_row in 0..self.filter_rows {
                let end0_row = (end1_row * self.stride_rows) as i64
                    + self.start_row
                    + (filter_row * self.atrous_rows) as i64;
                if end0_row >= 0 && (end0_row as usize) < self.end0_rows {
                    if row_row_size == 0 {
                        let mut count = 0u64;
                        self.row_row(filter_row, end1_row, &mut |_| count += 1, true);
                        row_row_size = count;
                    }
                    self.cum_end0[end0_row as usize] += row_row_size;
                    self.cum_end1[end1_row] += row_row_size;
                }
            }
        }

        let mut cumulative = 0u64;
        for v in self.cum_end1.iter_mut() {
            let tmp = *v;
            *v += cumulative;
            cumulative += tmp;
        }
        cumulative = 0;
        for v in self.cum_end0.iter_mut() {
            let tmp = *v;
            *v += cumulative;
            cumulative += tmp;
        }

        self.resize_edge_data();
        self.dirty = false;
    }

    fn resize_edge_data(&self) {
        let Some(stores) = &self.edge_data else {
            return;
        };
        let dim1 = [self.end1_rows, self.end1_cols, self.end1_depth];
        let dim0 = [self.end0_rows, self.end0_cols, self.end0_depth];
        let size = self.end_data_len(&dim1, &dim0, End::One);
        stores[0].resize(size);
        stores[1].resize(size);
    }

    pub fn iterate<F: FnMut(EdgeIndices)>(&self, end: End, start: u64, stop: u64, mut f: F) {
        match end {
            End::One => {
                let cum = &self.cum_end1;
                if cum.is_empty() {
                    return;
                }
                let row_start = cum.partition_point(|&v| v < start + 1);
                let row_end = (cum.partition_point(|&v| v < stop) + 1).min(cum.len());
                for end1_row in row_start..row_end {
                    for filter_row in 0..self.filter_rows {
                        self.row_row(filter_row, end1_row, &mut f, true);
                    }
                }
            }
            End::Zero => {
                let cum = &self.cum_end0;
                if cum.is_empty() {
                    return;
                }
                let row_start = cum.partition_point(|&v| v < start + 1);
                let row_end = (cum.partition_point(|&v| v < stop) + 1).min(cum.len());
                self.row_finding(row_start, row_end, &mut f);
            }
        }
    }
}

impl LinkPattern for Local2dLink {
    fn identifier(&self) -> &'static str {
        "Local2D"
    }

    fn can_connect(&self, dim0: &[usize], dim1: &[usize]) -> bool {
        if dim0.len() != 2 && dim0.len() != 3 {
            return false;
        }
        if dim1.len() != 2 && dim1.len() != 3 {
            return false;
        }
        let Some(sq) = self.square else {
            return true;
        };
        match sq.padding {
            Padding::Same => {
                (dim0[0] - 1) / sq.stride + 1 == dim1[0] && (dim0[1] - 1) / sq.stride + 1 == dim1[1]
            }
            Padding::Valid => {
                dim0[0] >= sq.filter
                    && dim0[1] >= sq.filter
                    && (dim0[0] - sq.filter) / sq.stride + 1 == dim1[0]
                    && (dim0[1] - sq.filter) / sq.stride + 1 == dim1[1]
            }
        }
    }

    fn deduce_dims(&self, far_dims: &[usize], near: End) -> Option<Vec<usize>> {
        let sq = self.square?;
        if far_dims.len() != 2 && far_dims.len() != 3 {
            return None;
        }
        // Depth carries over unchanged.
        let mut result = far_dims.to_vec();
        match near {
            End::One => {
                for d in result.iter_mut().take(2) {
                    *d = match sq.padding {
                        Padding::Same => (*d - 1) / sq.stride + 1,
                        Padding::Valid => d.checked_sub(sq.filter)? / sq.stride + 1,
                    };
                }
            }
            End::Zero => {
                for d in result.iter_mut().take(2) {
                    *d = match sq.padding {
                        Padding::Same => (*d - 1) * sq.stride + 1,
                        Padding::Valid => (*d - 1) * sq.stride + sq.filter,
                    };
                }
            }
        }
        Some(result)
    }

    fn set_dimensions(&mut self, dim0: &[usize], dim1: &[usize]) {
        let (r0, c0, d0) = Self::split_dims(dim0);
        let (r1, c1, d1) = Self::split_dims(dim1);
        self.end0_rows = r0;
        self.end0_cols = c0;
        self.end0_depth = d0;
        self.end1_rows = r1;
        self.end1_cols = c1;
        self.end1_depth = d1;
        self.dirty = true;
        self.initialize();
    }

    fn end_data_len(&self, near_dims: &[usize], far_dims: &[usize], end: End) -> usize {
        let dim1 = if end == End::One { near_dims } else { far_dims };
        let dim0 = if end == End::Zero { near_dims } else { far_dims };
        let (_, _, depth1) = Self::split_dims(dim1);
        let (_, _, depth0) = Self::split_dims(dim0);
        dim1[0] * dim1[1] * depth1 * depth0 * self.filter_rows * self.filter_cols
    }

    fn attach_edge_data(&mut self, end0: Arc<dyn DataVec>, end1: Arc<dyn DataVec>) {
        self.edge_data = Some([end0, end1]);
    }

    fn max_progress(&self, _end: End) -> u64 {
        self.cum_end0.last().copied().unwrap_or(0)
    }

    fn next_split(&self, end: End, requested: u64) -> u64 {
        let arr = match end {
            End::Zero => &self.cum_end0,
            End::One => &self.cum_end1,
        };
        if arr.is_empty() {
            return 0;
        }
        let i = arr.partition_point(|&v| v < requested);
        if i == arr.len() {
            arr[arr.len() - 1]
        } else {
            arr[i]
        }
    }
}
