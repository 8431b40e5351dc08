//! Per-token price table for cost estimation.

/// `(model, input $/token, output $/token)`.
const PRICES: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.15e-6, 0.60e-6),
    ("gpt-4o", 2.50e-6, 10.00e-6),
    ("gpt-4o-2024-05-13", 5.00e-6, 15.00e-6),
    ("gpt-4-turbo-2024-04-09", 10.00e-6, 30.00e-6),
    ("gpt-4-0613", 10.00e-6, 30.00e-6),
    ("gpt-4", 10.00e-6, 30.00e-6),
    ("gpt-3.5-turbo-0125", 0.50e-6, 1.50e-6),
];

/// `(input, output)` price per token, or `None` for unknown models.
pub fn pricing(model: &str) -> Option<(f64, f64)> {
    PRICES
        .iter()
        .find(|(name, _, _)| *name == model)
        .map(|(_, input, output)| (*input, *output))
}

/// Estimated dollar cost of one call; `None` when the model is not priced.
pub fn estimate(model: &str, input_tokens: u64, output_tokens: u64) -> Option<f64> {
    let (input_price, output_price) = pricing(model)?;
    Some(input_price * input_tokens as f64 + output_price * output_tokens as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_costs_are_summed() {
        let cost = estimate("gpt-4o-mini", 1_000_000, 1_000_000).expect("priced");
        assert!((cost - 0.75).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_has_no_cost() {
        assert_eq!(estimate("experimental-model-x", 10, 10), None);
    }
}
