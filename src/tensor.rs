//! Dense host tensor used by the execution frame.

use crate::error::{ForgeResult, StreamForgeError};

/// Row-major f32 tensor.
///
/// Tensors move through the execution frame by value; each one is produced
/// by exactly one kernel (or a feed) and read by any number of consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl Tensor {
    /// Create a tensor from raw data and a shape.
    ///
    /// Fails if the element count implied by `shape` does not match
    /// `data.len()`.
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> ForgeResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(StreamForgeError::InvalidShape(format!(
                "shape {:?} implies {} elements, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Tensor { data, shape })
    }

    /// Create a zero-filled tensor with the given shape.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Tensor {
            data: vec![0.0; len],
            shape,
        }
    }

    /// Create a rank-1 tensor from a vector.
    pub fn from_vec(data: Vec<f32>) -> Self {
        let len = data.len();
        Tensor {
            data,
            shape: vec![len],
        }
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
