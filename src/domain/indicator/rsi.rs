//! Relative Strength Index with Wilder's smoothing.
//!
//! First average gain/loss is the simple mean of the first n changes; after
//! that avg = (prev_avg * (n-1) + current) / n. RSI = 100 - 100/(1 + RS),
//! and 100 when the average loss is zero. The first n values are `None`.

pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut values = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return values;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let gain = |c: f64| if c > 0.0 { c } else { 0.0 };
    let loss = |c: f64| if c < 0.0 { -c } else { 0.0 };

    let mut avg_gain = changes[..period].iter().copied().map(gain).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period].iter().copied().map(loss).sum::<f64>() / period as f64;
    values[period] = Some(rsi_from(avg_gain, avg_loss));

    for (i, &change) in changes.iter().enumerate().skip(period) {
        avg_gain = (avg_gain * (period - 1) as f64 + gain(change)) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss(change)) / period as f64;
        values[i + 1] = Some(rsi_from(avg_gain, avg_loss));
    }

    values
}

fn rsi_from(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}
