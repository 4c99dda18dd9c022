//! Layer primitives: forward/backward passes over ndarray tensors.
//!
//! The dense path flows 2-d activations `(batch, features)`, the conv path
//! 4-d activations `(batch, height, width, channels)`. `Flatten` and the
//! pooling layers convert between the two.

use ndarray::{Array1, Array2, Array4, ArrayViewD, ArrayViewMutD, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Activation batch flowing between layers.
#[derive(Debug, Clone)]
pub enum Tensor {
    D2(Array2<f32>),
    D4(Array4<f32>),
}

impl Tensor {
    pub fn batch_len(&self) -> usize {
        match self {
            Self::D2(a) => a.dim().0,
            Self::D4(a) => a.dim().0,
        }
    }

    fn into_d2(self) -> Array2<f32> {
        match self {
            Self::D2(a) => a,
            Self::D4(_) => panic!("layer wired to a 2-d activation received a 4-d one"),
        }
    }

    fn into_d4(self) -> Array4<f32> {
        match self {
            Self::D4(a) => a,
            Self::D2(_) => panic!("layer wired to a 4-d activation received a 2-d one"),
        }
    }
}

/// One parameter tensor with its last computed gradient, exposed through
/// `Layer::visit_params` in a stable order.
pub struct ParamSlot<'a> {
    pub value: ArrayViewMutD<'a, f32>,
    pub grad: ArrayViewD<'a, f32>,
    pub trainable: bool,
}

/// A differentiable layer. `backward` must follow a `forward` of the same
/// batch; layers cache whatever they need in between.
pub trait Layer {
    fn forward(&mut self, input: Tensor, train: bool) -> Tensor;
    fn backward(&mut self, grad: Tensor) -> Tensor;
    fn visit_params(&mut self, _f: &mut dyn FnMut(ParamSlot<'_>)) {}
}

/// Fully connected layer, Glorot-uniform initialized.
pub struct Dense {
    weights: Array2<f32>,
    bias: Array1<f32>,
    grad_weights: Array2<f32>,
    grad_bias: Array1<f32>,
    input: Option<Array2<f32>>,
    trainable: bool,
}

impl Dense {
    pub fn new(input_dim: usize, output_dim: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (input_dim + output_dim) as f32).sqrt();
        let weights =
            Array2::from_shape_fn((input_dim, output_dim), |_| rng.gen_range(-limit..limit));
        Self {
            weights,
            bias: Array1::zeros(output_dim),
            grad_weights: Array2::zeros((input_dim, output_dim)),
            grad_bias: Array1::zeros(output_dim),
            input: None,
            trainable: true,
        }
    }

    pub fn frozen(mut self) -> Self {
        self.trainable = false;
        self
    }
}

impl Layer for Dense {
    fn forward(&mut self, input: Tensor, _train: bool) -> Tensor {
        let x = input.into_d2();
        let z = x.dot(&self.weights) + &self.bias;
        self.input = Some(x);
        Tensor::D2(z)
    }

    fn backward(&mut self, grad: Tensor) -> Tensor {
        let dz = grad.into_d2();
        let x = self.input.take().expect("backward without a forward pass");
        self.grad_weights = x.t().dot(&dz);
        self.grad_bias = dz.sum_axis(Axis(0));
        Tensor::D2(dz.dot(&self.weights.t()))
    }

    fn visit_params(&mut self, f: &mut dyn FnMut(ParamSlot<'_>)) {
        f(ParamSlot {
            value: self.weights.view_mut().into_dyn(),
            grad: self.grad_weights.view().into_dyn(),
            trainable: self.trainable,
        });
        f(ParamSlot {
            value: self.bias.view_mut().into_dyn(),
            grad: self.grad_bias.view().into_dyn(),
            trainable: self.trainable,
        });
    }
}

/// Rectified linear activation.
#[derive(Default)]
pub struct Relu {
    mask: Option<Tensor>,
}

impl Relu {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for Relu {
    fn forward(&mut self, input: Tensor, _train: bool) -> Tensor {
        match input {
            Tensor::D2(x) => {
                self.mask = Some(Tensor::D2(x.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })));
                Tensor::D2(x.mapv(|v| v.max(0.0)))
            }
            Tensor::D4(x) => {
                self.mask = Some(Tensor::D4(x.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })));
                Tensor::D4(x.mapv(|v| v.max(0.0)))
            }
        }
    }

    fn backward(&mut self, grad: Tensor) -> Tensor {
        let mask = self.mask.take().expect("backward without a forward pass");
        match (grad, mask) {
            (Tensor::D2(g), Tensor::D2(m)) => Tensor::D2(g * m),
            (Tensor::D4(g), Tensor::D4(m)) => Tensor::D4(g * m),
            _ => panic!("activation mask rank mismatch"),
        }
    }
}

/// Inverted dropout on dense activations; identity outside training.
pub struct Dropout {
    rate: f32,
    rng: StdRng,
    mask: Option<Array2<f32>>,
}

impl Dropout {
    pub fn new(rate: f32, seed: u64) -> Self {
        Self {
            rate,
            rng: StdRng::seed_from_u64(seed),
            mask: None,
        }
    }
}

impl Layer for Dropout {
    fn forward(&mut self, input: Tensor, train: bool) -> Tensor {
        let x = input.into_d2();
        if !train || self.rate == 0.0 {
            self.mask = None;
            return Tensor::D2(x);
        }
        let keep = 1.0 - self.rate;
        let mask = Array2::from_shape_fn(x.dim(), |_| {
            if self.rng.gen::<f32>() < keep {
                1.0 / keep
            } else {
                0.0
            }
        });
        let out = &x * &mask;
        self.mask = Some(mask);
        Tensor::D2(out)
    }

    fn backward(&mut self, grad: Tensor) -> Tensor {
        let g = grad.into_d2();
        match self.mask.take() {
            Some(mask) => Tensor::D2(g * mask),
            None => Tensor::D2(g),
        }
    }
}

/// Collapse a 4-d activation into `(batch, features)`.
#[derive(Default)]
pub struct Flatten {
    input_dim: Option<(usize, usize, usize, usize)>,
}

impl Flatten {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for Flatten {
    fn forward(&mut self, input: Tensor, _train: bool) -> Tensor {
        let x = input.into_d4();
        let dim = x.dim();
        self.input_dim = Some(dim);
        let (batch, height, width, channels) = dim;
        let flat = x
            .into_shape_with_order((batch, height * width * channels))
            .expect("activation tensors are standard layout");
        Tensor::D2(flat)
    }

    fn backward(&mut self, grad: Tensor) -> Tensor {
        let g = grad.into_d2();
        let dim = self.input_dim.take().expect("backward without a forward pass");
        // Upstream layers can hand back reversed-stride gradients (a
        // transposed matrix product does), and reshaping requires
        // standard layout.
        let g = g.as_standard_layout().to_owned();
        Tensor::D4(
            g.into_shape_with_order(dim)
                .expect("gradient matches the flattened shape"),
        )
    }
}

/// Valid-padding convolution with stride 1, Glorot-uniform initialized.
pub struct Conv2d {
    kernels: Array4<f32>,
    bias: Array1<f32>,
    grad_kernels: Array4<f32>,
    grad_bias: Array1<f32>,
    input: Option<Array4<f32>>,
    trainable: bool,
}

impl Conv2d {
    pub fn new(kernel_size: usize, in_channels: usize, out_channels: usize, rng: &mut StdRng) -> Self {
        let fan_in = (kernel_size * kernel_size * in_channels) as f32;
        let fan_out = (kernel_size * kernel_size * out_channels) as f32;
        let limit = (6.0 / (fan_in + fan_out)).sqrt();
        let shape = (kernel_size, kernel_size, in_channels, out_channels);
        let kernels = Array4::from_shape_fn(shape, |_| rng.gen_range(-limit..limit));
        Self {
            kernels,
            bias: Array1::zeros(out_channels),
            grad_kernels: Array4::zeros(shape),
            grad_bias: Array1::zeros(out_channels),
            input: None,
            trainable: true,
        }
    }

    pub fn frozen(mut self) -> Self {
        self.trainable = false;
        self
    }
}

impl Layer for Conv2d {
    fn forward(&mut self, input: Tensor, _train: bool) -> Tensor {
        let x = input.into_d4();
        let (batch, height, width, in_channels) = x.dim();
        let (kh, kw, _, out_channels) = self.kernels.dim();
        let out_h = height - kh + 1;
        let out_w = width - kw + 1;
        let mut out = Array4::zeros((batch, out_h, out_w, out_channels));
        for b in 0..batch {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    for oc in 0..out_channels {
                        let mut acc = self.bias[oc];
                        for ki in 0..kh {
                            for kj in 0..kw {
                                for ic in 0..in_channels {
                                    acc += x[[b, oh + ki, ow + kj, ic]]
                                        * self.kernels[[ki, kj, ic, oc]];
                                }
                            }
                        }
                        out[[b, oh, ow, oc]] = acc;
                    }
                }
            }
        }
        self.input = Some(x);
        Tensor::D4(out)
    }

    fn backward(&mut self, grad: Tensor) -> Tensor {
        let dy = grad.into_d4();
        let x = self.input.take().expect("backward without a forward pass");
        let (batch, _, _, in_channels) = x.dim();
        let (kh, kw, _, out_channels) = self.kernels.dim();
        let (_, out_h, out_w, _) = dy.dim();

        self.grad_kernels.fill(0.0);
        self.grad_bias.fill(0.0);
        let mut dx = Array4::zeros(x.dim());
        for b in 0..batch {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    for oc in 0..out_channels {
                        let g = dy[[b, oh, ow, oc]];
                        self.grad_bias[oc] += g;
                        for ki in 0..kh {
                            for kj in 0..kw {
                                for ic in 0..in_channels {
                                    self.grad_kernels[[ki, kj, ic, oc]] +=
                                        x[[b, oh + ki, ow + kj, ic]] * g;
                                    dx[[b, oh + ki, ow + kj, ic]] +=
                                        self.kernels[[ki, kj, ic, oc]] * g;
                                }
                            }
                        }
                    }
                }
            }
        }
        Tensor::D4(dx)
    }

    fn visit_params(&mut self, f: &mut dyn FnMut(ParamSlot<'_>)) {
        f(ParamSlot {
            value: self.kernels.view_mut().into_dyn(),
            grad: self.grad_kernels.view().into_dyn(),
            trainable: self.trainable,
        });
        f(ParamSlot {
            value: self.bias.view_mut().into_dyn(),
            grad: self.grad_bias.view().into_dyn(),
            trainable: self.trainable,
        });
    }
}

/// 2x2 max pooling with stride 2; odd trailing rows/columns are dropped.
#[derive(Default)]
pub struct MaxPool2 {
    mask: Option<Array4<f32>>,
}

impl MaxPool2 {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for MaxPool2 {
    fn forward(&mut self, input: Tensor, _train: bool) -> Tensor {
        let x = input.into_d4();
        let (batch, height, width, channels) = x.dim();
        let out_h = height / 2;
        let out_w = width / 2;
        let mut out = Array4::zeros((batch, out_h, out_w, channels));
        let mut mask = Array4::zeros(x.dim());
        for b in 0..batch {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    for c in 0..channels {
                        let mut best = f32::NEG_INFINITY;
                        let mut best_at = (2 * oh, 2 * ow);
                        for di in 0..2 {
                            for dj in 0..2 {
                                let (i, j) = (2 * oh + di, 2 * ow + dj);
                                let v = x[[b, i, j, c]];
                                if v > best {
                                    best = v;
                                    best_at = (i, j);
                                }
                            }
                        }
                        out[[b, oh, ow, c]] = best;
                        mask[[b, best_at.0, best_at.1, c]] = 1.0;
                    }
                }
            }
        }
        self.mask = Some(mask);
        Tensor::D4(out)
    }

    fn backward(&mut self, grad: Tensor) -> Tensor {
        let dy = grad.into_d4();
        let mask = self.mask.take().expect("backward without a forward pass");
        let (batch, height, width, channels) = mask.dim();
        let (_, out_h, out_w, _) = dy.dim();
        let mut dx = Array4::zeros((batch, height, width, channels));
        for b in 0..batch {
            for i in 0..2 * out_h {
                for j in 0..2 * out_w {
                    for c in 0..channels {
                        if mask[[b, i, j, c]] != 0.0 {
                            dx[[b, i, j, c]] = dy[[b, i / 2, j / 2, c]];
                        }
                    }
                }
            }
        }
        Tensor::D4(dx)
    }
}

/// Per-channel max over the spatial extent; outputs `(batch, channels)`.
#[derive(Default)]
pub struct GlobalMaxPool {
    argmax: Option<Vec<(usize, usize)>>,
    input_dim: Option<(usize, usize, usize, usize)>,
}

impl GlobalMaxPool {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for GlobalMaxPool {
    fn forward(&mut self, input: Tensor, _train: bool) -> Tensor {
        let x = input.into_d4();
        let (batch, height, width, channels) = x.dim();
        let mut out = Array2::zeros((batch, channels));
        let mut argmax = vec![(0usize, 0usize); batch * channels];
        for b in 0..batch {
            for c in 0..channels {
                let mut best = f32::NEG_INFINITY;
                for i in 0..height {
                    for j in 0..width {
                        let v = x[[b, i, j, c]];
                        if v > best {
                            best = v;
                            argmax[b * channels + c] = (i, j);
                        }
                        best = best.max(v);
                    }
                }
                out[[b, c]] = best;
            }
        }
        self.argmax = Some(argmax);
        self.input_dim = Some(x.dim());
        Tensor::D2(out)
    }

    fn backward(&mut self, grad: Tensor) -> Tensor {
        let dy = grad.into_d2();
        let argmax = self.argmax.take().expect("backward without a forward pass");
        let dim = self.input_dim.take().expect("backward without a forward pass");
        let (batch, _, _, channels) = dim;
        let mut dx = Array4::zeros(dim);
        for b in 0..batch {
            for c in 0..channels {
                let (i, j) = argmax[b * channels + c];
                dx[[b, i, j, c]] = dy[[b, c]];
            }
        }
        Tensor::D4(dx)
    }
}
