use rand::Rng;
use serde::{Serialize, Deserialize};
use std::f32::consts::PI;

/// Dense row-major n-dimensional array of `f32`.
///
/// Convolutional activations use the layout `(batch, channels, height, width)`;
/// dense activations use `(batch, features)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: vec![0.0; shape.iter().product()],
        }
    }

    pub fn filled(shape: &[usize], value: f32) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: vec![value; shape.iter().product()],
        }
    }

    /// Wraps `data` with the given shape.
    ///
    /// Panics if the element count does not match the shape.
    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> Tensor {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            panic!("Tensor shape {:?} needs {} elements, got {}", shape, expected, data.len())
        }
        Tensor { shape: shape.to_vec(), data }
    }

    /// Samples a single value from N(0, 1) using the Box-Muller transform.
    fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f32 {
        // Both uniforms on (0, 1] to avoid log(0).
        let u1: f32 = 1.0 - rng.gen::<f32>();
        let u2: f32 = 1.0 - rng.gen::<f32>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    /// He initialization: samples from N(0, sqrt(2 / fan_in)).
    ///
    /// Recommended before ReLU layers. The variance 2/fan_in accounts for
    /// the fact that ReLU zeroes half of its inputs on average.
    pub fn he<R: Rng + ?Sized>(shape: &[usize], fan_in: usize, rng: &mut R) -> Tensor {
        let std_dev = (2.0 / fan_in as f32).sqrt();
        Tensor::normal(shape, std_dev, rng)
    }

    /// Xavier (Glorot) initialization: samples from N(0, sqrt(1 / fan_in)).
    ///
    /// Recommended before Softmax/Identity layers.
    pub fn xavier<R: Rng + ?Sized>(shape: &[usize], fan_in: usize, rng: &mut R) -> Tensor {
        let std_dev = (1.0 / fan_in as f32).sqrt();
        Tensor::normal(shape, std_dev, rng)
    }

    fn normal<R: Rng + ?Sized>(shape: &[usize], std_dev: f32, rng: &mut R) -> Tensor {
        let n: usize = shape.iter().product();
        let data = (0..n)
            .map(|_| Tensor::sample_standard_normal(rng) * std_dev)
            .collect();
        Tensor { shape: shape.to_vec(), data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the same data viewed with a new shape.
    pub fn reshape(self, shape: &[usize]) -> Tensor {
        Tensor::from_vec(shape, self.data)
    }

    pub fn map<F>(&self, functor: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    /// Element-wise (Hadamard) product of two same-shape tensors.
    pub fn hadamard(&self, rhs: &Tensor) -> Tensor {
        assert_eq!(self.shape, rhs.shape, "Tensors are of incorrect sizes");
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().zip(rhs.data.iter()).map(|(a, b)| a * b).collect(),
        }
    }

    /// Row `i` of a 2-D tensor.
    pub fn row(&self, i: usize) -> &[f32] {
        assert_eq!(self.shape.len(), 2, "row() needs a 2-D tensor");
        let cols = self.shape[1];
        &self.data[i * cols..(i + 1) * cols]
    }

    /// Matrix product of two 2-D tensors: `(n, k) x (k, m) -> (n, m)`.
    pub fn matmul(&self, rhs: &Tensor) -> Tensor {
        assert_eq!(self.shape.len(), 2, "matmul() needs 2-D tensors");
        assert_eq!(rhs.shape.len(), 2, "matmul() needs 2-D tensors");
        let (n, k) = (self.shape[0], self.shape[1]);
        let m = rhs.shape[1];
        if rhs.shape[0] != k {
            panic!("Tensors are of incorrect sizes: {:?} x {:?}", self.shape, rhs.shape)
        }

        let mut res = Tensor::zeros(&[n, m]);
        for i in 0..n {
            let out_row = &mut res.data[i * m..(i + 1) * m];
            for p in 0..k {
                let a = self.data[i * k + p];
                if a == 0.0 {
                    continue;
                }
                let rhs_row = &rhs.data[p * m..(p + 1) * m];
                for (o, &b) in out_row.iter_mut().zip(rhs_row) {
                    *o += a * b;
                }
            }
        }
        res
    }

    pub fn transpose(&self) -> Tensor {
        assert_eq!(self.shape.len(), 2, "transpose() needs a 2-D tensor");
        let (rows, cols) = (self.shape[0], self.shape[1]);
        let mut res = Tensor::zeros(&[cols, rows]);
        for i in 0..rows {
            for j in 0..cols {
                res.data[j * rows + i] = self.data[i * cols + j];
            }
        }
        res
    }
}
