use serde::{Deserialize, Serialize};

/// Cosine-annealed learning rate, stepped once per epoch.
///
/// `lr(t) = eta_min + (base_lr - eta_min) * (1 + cos(pi * t / t_max)) / 2`,
/// held at `eta_min` once `t >= t_max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CosineSchedule {
    pub base_lr: f64,
    pub eta_min: f64,
    pub t_max: usize,
    pub step: usize,
}

impl CosineSchedule {
    pub fn new(base_lr: f64, t_max: usize) -> Self {
        Self {
            base_lr,
            eta_min: 0.0,
            t_max,
            step: 0,
        }
    }

    pub fn lr(&self) -> f64 {
        self.lr_at(self.step)
    }

    pub fn lr_at(&self, step: usize) -> f64 {
        if self.t_max == 0 || step >= self.t_max {
            return if self.t_max == 0 { self.base_lr } else { self.eta_min };
        }
        let progress = step as f64 / self.t_max as f64;
        let cosine = (1.0 + (std::f64::consts::PI * progress).cos()) * 0.5;
        self.eta_min + (self.base_lr - self.eta_min) * cosine
    }

    pub fn advance(&mut self) {
        self.step = self.step.saturating_add(1);
    }
}
