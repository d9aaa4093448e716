/// Round to a fixed number of decimal places.
#[inline]
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_decimals() {
        assert_eq!(round_to(12.345678, 2), 12.35);
        assert_eq!(round_to(-0.0126, 3), -0.013);
        assert_eq!(round_to(7.0, 3), 7.0);
    }
}
