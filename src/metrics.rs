//! Evaluation metrics for the emotion classifier.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Confusion matrix for a `K`-class classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub n_classes: usize,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![0; n_classes * n_classes],
        }
    }

    pub fn from_pairs(n_classes: usize, truth: &[usize], predicted: &[usize]) -> Self {
        let mut cm = Self::new(n_classes);
        for (&t, &p) in truth.iter().zip(predicted) {
            cm.add(t, p);
        }
        cm
    }

    pub fn add(&mut self, truth: usize, predicted: usize) {
        if truth >= self.n_classes || predicted >= self.n_classes {
            return;
        }
        let idx = truth * self.n_classes + predicted;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes + predicted]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&v| v as u64).sum()
    }

    pub fn rows(&self) -> Vec<Vec<u32>> {
        if self.n_classes == 0 {
            return Vec::new();
        }
        self.counts
            .chunks_exact(self.n_classes)
            .map(<[u32]>::to_vec)
            .collect()
    }
}

/// Precision/recall statistics for a single class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerClassStats {
    /// `TP / (TP + FP)`.
    pub precision: f32,
    /// `TP / (TP + FN)`.
    pub recall: f32,
    pub f1: f32,
    /// Total number of true examples for the class.
    pub support: u32,
}

/// Compute per-class precision, recall and F1 from a confusion matrix.
pub fn precision_recall_by_class(cm: &ConfusionMatrix) -> Vec<PerClassStats> {
    let k = cm.n_classes;
    let mut stats = Vec::with_capacity(k);
    for class_idx in 0..k {
        let tp = cm.get(class_idx, class_idx) as f32;
        let mut fp = 0f32;
        let mut fn_ = 0f32;
        let mut support = 0u32;
        for j in 0..k {
            let v = cm.get(class_idx, j);
            support = support.saturating_add(v);
            if j != class_idx {
                fn_ += v as f32;
            }
        }
        for i in 0..k {
            if i != class_idx {
                fp += cm.get(i, class_idx) as f32;
            }
        }
        let precision = if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) };
        let recall = if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) };
        stats.push(PerClassStats {
            precision,
            recall,
            f1: f1_score(precision, recall),
            support,
        });
    }
    stats
}

fn f1_score(precision: f32, recall: f32) -> f32 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// Compute overall accuracy from a confusion matrix.
pub fn accuracy(cm: &ConfusionMatrix) -> f32 {
    let correct: u64 = (0..cm.n_classes).map(|i| cm.get(i, i) as u64).sum();
    let total = cm.total();
    if total == 0 {
        0.0
    } else {
        (correct as f32) / (total as f32)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassReport {
    pub label: String,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub support: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AverageReport {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub support: u32,
}

/// Accuracy, per-class report and confusion matrix for one evaluation run.
///
/// Rows and columns of `matrix` follow the label encoding's class order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionStats {
    pub classes: Vec<String>,
    pub accuracy: f32,
    pub per_class: Vec<ClassReport>,
    pub macro_avg: AverageReport,
    pub weighted_avg: AverageReport,
    pub matrix: Vec<Vec<u32>>,
}

impl ConfusionStats {
    pub fn from_matrix(classes: &[String], cm: &ConfusionMatrix) -> Self {
        let stats = precision_recall_by_class(cm);
        let per_class: Vec<ClassReport> = classes
            .iter()
            .zip(&stats)
            .map(|(label, s)| ClassReport {
                label: label.clone(),
                precision: s.precision,
                recall: s.recall,
                f1: s.f1,
                support: s.support,
            })
            .collect();
        Self {
            classes: classes.to_vec(),
            accuracy: accuracy(cm),
            macro_avg: average(&per_class, false),
            weighted_avg: average(&per_class, true),
            per_class,
            matrix: cm.rows(),
        }
    }

    pub fn total_support(&self) -> u32 {
        self.per_class.iter().map(|c| c.support).sum()
    }

    /// Plain-text classification report in the familiar column layout.
    pub fn classification_report(&self) -> String {
        let width = self
            .classes
            .iter()
            .map(String::len)
            .chain(["weighted avg".len()])
            .max()
            .unwrap_or(12);
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}\n",
            "", "precision", "recall", "f1-score", "support"
        );
        for row in &self.per_class {
            let _ = writeln!(
                out,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                row.label, row.precision, row.recall, row.f1, row.support
            );
        }
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.total_support()
        );
        for (name, avg) in [("macro avg", self.macro_avg), ("weighted avg", self.weighted_avg)] {
            let _ = writeln!(
                out,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, avg.precision, avg.recall, avg.f1, avg.support
            );
        }
        out
    }

    /// Confusion matrix with true labels as rows and predictions as columns.
    pub fn confusion_table(&self) -> String {
        let width = self
            .classes
            .iter()
            .map(String::len)
            .chain(self.matrix.iter().flatten().map(|v| v.to_string().len()))
            .max()
            .unwrap_or(1);
        let mut out = String::new();
        let _ = write!(out, "{:>width$}", "");
        for class in &self.classes {
            let _ = write!(out, " {class:>width$}");
        }
        let _ = writeln!(out);
        for (class, row) in self.classes.iter().zip(&self.matrix) {
            let _ = write!(out, "{class:>width$}");
            for value in row {
                let _ = write!(out, " {value:>width$}");
            }
            let _ = writeln!(out);
        }
        out
    }
}

fn average(rows: &[ClassReport], weighted: bool) -> AverageReport {
    let support: u32 = rows.iter().map(|r| r.support).sum();
    let weight = |r: &ClassReport| {
        if weighted {
            r.support as f32
        } else {
            1.0
        }
    };
    let denom: f32 = rows.iter().map(weight).sum();
    if denom == 0.0 {
        return AverageReport {
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
            support,
        };
    }
    let mean = |field: fn(&ClassReport) -> f32| {
        rows.iter().map(|r| field(r) * weight(r)).sum::<f32>() / denom
    };
    AverageReport {
        precision: mean(|r| r.precision),
        recall: mean(|r| r.recall),
        f1: mean(|r| r.f1),
        support,
    }
}
