// ============================================================
// Layer 3 — Loss Terms and Coefficients
// ============================================================
// The inpainting objective is a weighted sum of five named terms:
//
//   valid — L1 error on known pixels
//   hole  — L1 error on missing pixels
//   tv    — total variation of the composited output
//   perc  — perceptual (feature space) distance
//   style — Gram-matrix distance of the same features
//
// This file only deals with the scalar side of those terms:
// their names, their weights, and how a step's values are
// reported. The tensor side lives in ml/loss.rs.

use serde::{Deserialize, Serialize};

/// One named term of the inpainting objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LossTerm {
    Valid,
    Hole,
    Tv,
    Perc,
    Style,
}

impl LossTerm {
    /// Every term, in report order.
    pub const ALL: [LossTerm; 5] = [
        LossTerm::Valid,
        LossTerm::Hole,
        LossTerm::Tv,
        LossTerm::Perc,
        LossTerm::Style,
    ];

    /// Key used in config files and the metrics CSV
    pub fn key(self) -> &'static str {
        match self {
            LossTerm::Valid => "valid",
            LossTerm::Hole  => "hole",
            LossTerm::Tv    => "tv",
            LossTerm::Perc  => "perc",
            LossTerm::Style => "style",
        }
    }

    /// Label used in the printed step report
    pub fn label(self) -> &'static str {
        match self {
            LossTerm::Valid => "Valid Loss",
            LossTerm::Hole  => "Hole Loss",
            LossTerm::Tv    => "TV Loss",
            LossTerm::Perc  => "Perc Loss",
            LossTerm::Style => "Style Loss",
        }
    }
}

// ─── LossCoefficients ─────────────────────────────────────────────────────────
/// Weight applied to each term before summation.
/// Defaults follow Liu et al. (2018).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LossCoefficients {
    pub valid: f64,
    pub hole:  f64,
    pub tv:    f64,
    pub perc:  f64,
    pub style: f64,
}

impl Default for LossCoefficients {
    fn default() -> Self {
        Self {
            valid: 1.0,
            hole:  6.0,
            tv:    0.1,
            perc:  0.05,
            style: 120.0,
        }
    }
}

impl LossCoefficients {
    pub fn get(&self, term: LossTerm) -> f64 {
        match term {
            LossTerm::Valid => self.valid,
            LossTerm::Hole  => self.hole,
            LossTerm::Tv    => self.tv,
            LossTerm::Perc  => self.perc,
            LossTerm::Style => self.style,
        }
    }

    /// Iterate (term, coefficient) pairs in report order
    pub fn iter(&self) -> impl Iterator<Item = (LossTerm, f64)> + '_ {
        LossTerm::ALL.into_iter().map(move |t| (t, self.get(t)))
    }

    /// Weighted sum of already-extracted scalar values
    #[cfg(test)]
    pub fn weighted_total(&self, losses: &LossBreakdown) -> f64 {
        self.iter().map(|(term, coef)| coef * losses.get(term)).sum()
    }
}

// ─── LossBreakdown ────────────────────────────────────────────────────────────
/// Scalar value of every term for one training step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LossBreakdown {
    pub valid: f64,
    pub hole:  f64,
    pub tv:    f64,
    pub perc:  f64,
    pub style: f64,
}

impl LossBreakdown {
    pub fn get(&self, term: LossTerm) -> f64 {
        match term {
            LossTerm::Valid => self.valid,
            LossTerm::Hole  => self.hole,
            LossTerm::Tv    => self.tv,
            LossTerm::Perc  => self.perc,
            LossTerm::Style => self.style,
        }
    }

    pub fn set(&mut self, term: LossTerm, value: f64) {
        match term {
            LossTerm::Valid => self.valid = value,
            LossTerm::Hole  => self.hole  = value,
            LossTerm::Tv    => self.tv    = value,
            LossTerm::Perc  => self.perc  = value,
            LossTerm::Style => self.style = value,
        }
    }
}

/// Format the one-line step report.
///
/// Example:
///   STEP: 10 / Valid Loss: 0.1 / Hole Loss: 0.3 / ... / TOTAL LOSS: 2.4
pub fn format_report(step: usize, losses: &LossBreakdown, total: f64) -> String {
    let mut line = format!("STEP: {step}");
    for term in LossTerm::ALL {
        line.push_str(&format!(" / {}: {}", term.label(), losses.get(term)));
    }
    line.push_str(&format!(" / TOTAL LOSS: {total}"));
    line
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LossBreakdown {
        LossBreakdown { valid: 1.0, hole: 2.0, tv: 3.0, perc: 4.0, style: 5.0 }
    }

    #[test]
    fn test_weighted_total_uses_every_coefficient() {
        let coef = LossCoefficients { valid: 1.0, hole: 10.0, tv: 0.0, perc: 0.5, style: 2.0 };
        // 1*1 + 10*2 + 0*3 + 0.5*4 + 2*5
        assert_eq!(coef.weighted_total(&sample()), 33.0);
    }

    #[test]
    fn test_report_order_and_labels() {
        let line = format_report(7, &sample(), 15.0);
        assert_eq!(
            line,
            "STEP: 7 / Valid Loss: 1 / Hole Loss: 2 / TV Loss: 3 / Perc Loss: 4 / Style Loss: 5 / TOTAL LOSS: 15"
        );
    }

    #[test]
    fn test_partial_coefficients_keep_defaults() {
        let coef: LossCoefficients = serde_json::from_str(r#"{"hole": 3.0}"#).unwrap();
        assert_eq!(coef.hole, 3.0);
        assert_eq!(coef.style, 120.0);
    }

    #[test]
    fn test_unknown_coefficient_rejected() {
        let res = serde_json::from_str::<LossCoefficients>(r#"{"prc": 0.05}"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_set_then_get() {
        let mut b = LossBreakdown::default();
        for (i, term) in LossTerm::ALL.into_iter().enumerate() {
            b.set(term, i as f64);
        }
        assert_eq!(b, LossBreakdown { valid: 0.0, hole: 1.0, tv: 2.0, perc: 3.0, style: 4.0 });
    }
}
