//! Shared fixtures for the unit tests.

use std::sync::Arc;

use crate::context::SharedResources;
use crate::group::Group;
use crate::memstore::MemStore;
use crate::options::OptionList;
use crate::types::{ExtendedDataType, NumericType};
use crate::variable::Variable;

/// Route test logs through the capture writer; repeated calls are fine.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A fresh in-memory store with one 2-D `Int32` variable named `grid`
/// over dimensions `y` and `x`.
pub(crate) fn grid_variable(rows: u64, cols: u64) -> (Arc<SharedResources>, Arc<Variable>) {
    init_tracing();
    let shared = SharedResources::for_created(Box::new(MemStore::new()));
    let root = Group::root(&shared);
    let y = root
        .create_dimension("y", rows, &OptionList::new())
        .unwrap();
    let x = root
        .create_dimension("x", cols, &OptionList::new())
        .unwrap();
    let var = root
        .create_variable(
            "grid",
            &[y, x],
            &ExtendedDataType::numeric(NumericType::Int32),
            &OptionList::new(),
        )
        .unwrap();
    (shared, var)
}

/// Extract a strided window from a row-major array, in window row-major
/// order. The independent oracle the transfer paths are checked against.
pub(crate) fn reference_window<T: Copy>(
    values: &[T],
    shape: &[usize],
    start: &[u64],
    count: &[usize],
    step: &[i64],
) -> Vec<T> {
    let rank = shape.len();
    let mut row_stride = vec![1usize; rank];
    for i in (0..rank.saturating_sub(1)).rev() {
        row_stride[i] = row_stride[i + 1] * shape[i + 1];
    }
    let total: usize = count.iter().product();
    let mut out = Vec::with_capacity(total);
    let mut pos = vec![0usize; rank];
    for _ in 0..total {
        let mut linear = 0usize;
        for i in 0..rank {
            let idx = (start[i] as i64 + pos[i] as i64 * step[i]) as usize;
            linear += idx * row_stride[i];
        }
        out.push(values[linear]);
        for axis in (0..rank).rev() {
            pos[axis] += 1;
            if pos[axis] < count[axis] {
                break;
            }
            pos[axis] = 0;
        }
    }
    out
}
