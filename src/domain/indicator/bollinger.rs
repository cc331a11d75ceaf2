//! Bollinger Bands.
//!
//! Middle is the n-period SMA of closes; upper/lower are middle ± deviation
//! × population standard deviation. The first (n-1) values are `None`.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

pub fn calculate_bollinger(closes: &[f64], period: usize, deviation: f64) -> Vec<Option<Band>> {
    if period == 0 {
        return vec![None; closes.len()];
    }

    (0..closes.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let window = &closes[i + 1 - period..=i];
            let middle = window.iter().sum::<f64>() / period as f64;
            let variance = window
                .iter()
                .map(|c| (c - middle) * (c - middle))
                .sum::<f64>()
                / period as f64;
            let stddev = variance.sqrt();
            Some(Band {
                upper: middle + deviation * stddev,
                middle,
                lower: middle - deviation * stddev,
            })
        })
        .collect()
}
