// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// Formula:
//   k      = 2 / (period + 1)
//   EMA_t  = (x_t - EMA_{t-1}) * k + EMA_{t-1}
//
// The first EMA value is the SMA of the first `period` samples and sits at
// index `period - 1`. Earlier positions are undefined.
// =============================================================================

/// Compute the EMA of `values`, index-aligned with the input.
///
/// Returns a vector of the same length as `values`; entries before index
/// `period - 1` are `None`. When `period == 0` or the input is shorter than
/// `period` every entry is `None`.
///
/// A non-finite intermediate value stops the series: later entries stay
/// `None` rather than carrying a broken value forward.
pub fn calculate_ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let k = 2.0 / (period + 1) as f64;

    let seed = values[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return out;
    }
    out[period - 1] = Some(seed);

    let mut prev = seed;
    for (i, &x) in values.iter().enumerate().skip(period) {
        let ema = (x - prev) * k + prev;
        if !ema.is_finite() {
            break;
        }
        out[i] = Some(ema);
        prev = ema;
    }

    out
}

/// Most recent defined value of an index-aligned series.
pub fn last_defined(series: &[Option<f64>]) -> Option<f64> {
    series.iter().rev().find_map(|v| *v)
}

/// Defined values only, in order.
pub fn defined(series: &[Option<f64>]) -> Vec<f64> {
    series.iter().filter_map(|v| *v).collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn ascending(n: usize) -> Vec<f64> {
        (1..=n).map(|i| i as f64).collect()
    }

    #[test]
    fn ema_empty_input() {
        assert!(calculate_ema(&[], 5).is_empty());
    }

    #[test]
    fn ema_period_zero_is_all_undefined() {
        let ema = calculate_ema(&[1.0, 2.0, 3.0], 0);
        assert_eq!(ema, vec![None, None, None]);
    }

    #[test]
    fn ema_insufficient_data() {
        let ema = calculate_ema(&[1.0, 2.0], 5);
        assert_eq!(ema.len(), 2);
        assert!(ema.iter().all(Option::is_none));
    }

    #[test]
    fn ema_seed_is_sma_at_period_minus_one() {
        for period in 1..=10 {
            let values = ascending(25);
            let ema = calculate_ema(&values, period);
            assert_eq!(ema.len(), values.len());
            assert!(ema[..period - 1].iter().all(Option::is_none));
            let sma = values[..period].iter().sum::<f64>() / period as f64;
            assert!((ema[period - 1].unwrap() - sma).abs() < 1e-10);
            assert!(ema[period - 1..].iter().all(Option::is_some));
        }
    }

    #[test]
    fn ema_known_values() {
        // 5-period EMA of [10..20]: seed 12 at index 4, k = 1/3.
        let values: Vec<f64> = (10..=20).map(|x| x as f64).collect();
        let ema = calculate_ema(&values, 5);

        let k = 2.0 / 6.0;
        let mut expected = 12.0;
        assert!((ema[4].unwrap() - expected).abs() < 1e-10);
        for i in 5..values.len() {
            expected = (values[i] - expected) * k + expected;
            assert!((ema[i].unwrap() - expected).abs() < 1e-10);
        }
        assert!((ema[10].unwrap() - 18.0).abs() < 0.5);
    }

    #[test]
    fn ema_stops_on_nan() {
        let values = vec![1.0, 2.0, 3.0, f64::NAN, 5.0];
        let ema = calculate_ema(&values, 3);
        assert_eq!(ema[2], Some(2.0));
        assert_eq!(ema[3], None);
        assert_eq!(ema[4], None);
    }

    #[test]
    fn last_defined_and_defined() {
        let series = vec![None, Some(1.0), Some(2.5), None];
        assert_eq!(last_defined(&series), Some(2.5));
        assert_eq!(defined(&series), vec![1.0, 2.5]);
        assert_eq!(last_defined(&[None, None]), None);
    }

    #[test]
    fn flat_series_ema_equals_price() {
        let ema = calculate_ema(&vec![100.0; 60], 20);
        assert!((last_defined(&ema).unwrap() - 100.0).abs() < 1e-10);
    }
}
