use crate::layers::param::Param;
use crate::optim::Optimizer;

/// Adam with bias-corrected first and second moment estimates.
///
/// Moment buffers are allocated on the first `step` and matched to
/// parameters by position, so the same parameter order must be passed on
/// every call.
pub struct Adam {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    t: i32,
    moments: Vec<(Vec<f32>, Vec<f32>)>,
}

impl Adam {
    pub fn new(learning_rate: f32) -> Adam {
        Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            t: 0,
            moments: Vec::new(),
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: Vec<&mut Param>) {
        if self.moments.len() != params.len() {
            self.moments = params.iter()
                .map(|p| (vec![0.0; p.value.len()], vec![0.0; p.value.len()]))
                .collect();
            self.t = 0;
        }
        self.t += 1;
        let correction1 = 1.0 - self.beta1.powi(self.t);
        let correction2 = 1.0 - self.beta2.powi(self.t);
        let step_size = self.learning_rate * correction2.sqrt() / correction1;

        for (param, (m, v)) in params.into_iter().zip(self.moments.iter_mut()) {
            let grad = param.grad_mut().to_vec();
            for i in 0..grad.len() {
                m[i] = self.beta1 * m[i] + (1.0 - self.beta1) * grad[i];
                v[i] = self.beta2 * v[i] + (1.0 - self.beta2) * grad[i] * grad[i];
                param.value.data[i] -= step_size * m[i] / (v[i].sqrt() + self.epsilon);
            }
        }
    }
}
