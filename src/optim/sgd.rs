use crate::layers::param::Param;
use crate::optim::Optimizer;

pub struct Sgd {
    pub learning_rate: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32) -> Sgd {
        Sgd { learning_rate }
    }
}

impl Optimizer for Sgd {
    /// Plain gradient descent: θ ← θ − lr · ∇θ
    fn step(&mut self, params: Vec<&mut Param>) {
        for param in params {
            let lr = self.learning_rate;
            let grad = param.grad_mut().to_vec();
            for (v, g) in param.value.data.iter_mut().zip(grad) {
                *v -= lr * g;
            }
        }
    }
}
