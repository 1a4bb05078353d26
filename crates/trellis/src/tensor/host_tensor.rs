//! Host-backed `f32` tensor carried through edge and chain evaluation.

use anyhow::{bail, ensure, Result};
use rand::Rng;

use super::shape::Shape;

/// Simple host-backed tensor. Activations flowing between nodes, probe
/// batches, and collaborator outputs all use this representation.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    data: Vec<f32>,
}

impl Tensor {
    /// Constructs a tensor from raw values, validating the length against the shape.
    pub fn from_vec(shape: Shape, data: Vec<f32>) -> Result<Self> {
        if data.len() != shape.num_elements() {
            bail!(
                "tensor data length ({}) does not match shape {:?}",
                data.len(),
                shape.dims()
            );
        }
        Ok(Tensor { shape, data })
    }

    /// Returns a zero-initialized tensor of the requested shape.
    pub fn zeros(shape: Shape) -> Self {
        let len = shape.num_elements();
        Tensor {
            shape,
            data: vec![0.0; len],
        }
    }

    /// Returns a zero tensor matching the shape of `self`.
    pub fn zeros_like(&self) -> Self {
        Tensor::zeros(self.shape.clone())
    }

    /// Samples from a normal distribution (`N(0, std^2)`) using the Box-Muller transform.
    pub fn randn(shape: Shape, std: f32, rng: &mut impl Rng) -> Self {
        let len = shape.num_elements();
        let mut values = Vec::with_capacity(len);
        while values.len() < len {
            let u1: f32 = rng.gen::<f32>().max(f32::MIN_POSITIVE);
            let u2: f32 = rng.gen::<f32>();
            let r = (-2.0 * u1.ln()).sqrt();
            let theta = 2.0 * std::f32::consts::PI * u2;
            values.push(r * theta.cos() * std);
            if values.len() < len {
                values.push(r * theta.sin() * std);
            }
        }
        Tensor {
            shape,
            data: values,
        }
    }

    /// Returns the total number of elements stored in the tensor.
    pub fn len(&self) -> usize {
        self.shape.num_elements()
    }

    /// Reports whether the tensor contains zero elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Provides access to the tensor shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Borrows the underlying data slice.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutably borrows the underlying data slice.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Elementwise sum of two tensors of identical shape.
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        ensure!(
            self.shape == other.shape,
            "shape mismatch in add: {:?} vs {:?}",
            self.shape.dims(),
            other.shape.dims()
        );
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a + b)
            .collect();
        Ok(Tensor {
            shape: self.shape.clone(),
            data,
        })
    }

    /// Accumulates `other` into `self` in place.
    pub fn add_assign(&mut self, other: &Tensor) -> Result<()> {
        ensure!(
            self.shape == other.shape,
            "shape mismatch in add_assign: {:?} vs {:?}",
            self.shape.dims(),
            other.shape.dims()
        );
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
        Ok(())
    }

    /// Multiplies every element by a scalar, returning a new tensor.
    pub fn scale(&self, factor: f32) -> Tensor {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|v| v * factor).collect(),
        }
    }

    /// Spatially subsamples an `[n, c, h, w]` tensor by `stride`, keeping every
    /// `stride`-th row and column. A stride of 1 is a plain copy.
    pub fn subsample_hw(&self, stride: usize) -> Result<Tensor> {
        ensure!(stride >= 1, "stride must be at least 1");
        if stride == 1 {
            return Ok(self.clone());
        }
        let dims = self.shape.dims();
        ensure!(
            dims.len() == 4,
            "strided subsampling expects [n, c, h, w], got shape {:?}",
            dims
        );
        let (n, c, h, w) = (dims[0], dims[1], dims[2], dims[3]);
        let oh = (h + stride - 1) / stride;
        let ow = (w + stride - 1) / stride;
        let mut data = Vec::with_capacity(n * c * oh * ow);
        for ni in 0..n {
            for ci in 0..c {
                let plane = (ni * c + ci) * h * w;
                for hi in (0..h).step_by(stride) {
                    let row = plane + hi * w;
                    for wi in (0..w).step_by(stride) {
                        data.push(self.data[row + wi]);
                    }
                }
            }
        }
        Tensor::from_vec(Shape::new([n, c, oh, ow]), data)
    }
}
