//! Per-token pricing for the models we know about (USD).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// (model prefix, input cost per token, output cost per token).
///
/// Matched by prefix so dated snapshots share their family's price.
const MODEL_COSTS: &[(&str, Decimal, Decimal)] = &[
    ("claude-opus-4", dec!(0.000015), dec!(0.000075)),
    ("claude-sonnet-4", dec!(0.000003), dec!(0.000015)),
    ("claude-3-7-sonnet", dec!(0.000003), dec!(0.000015)),
    ("claude-3-5-sonnet", dec!(0.000003), dec!(0.000015)),
    ("claude-3-5-haiku", dec!(0.0000008), dec!(0.000004)),
    ("gpt-4o-mini", dec!(0.00000015), dec!(0.0000006)),
    ("gpt-4o", dec!(0.0000025), dec!(0.00001)),
    ("gpt-4.1-mini", dec!(0.0000004), dec!(0.0000016)),
    ("gpt-4.1", dec!(0.000002), dec!(0.000008)),
];

/// Look up (input, output) cost per token for a model.
pub(crate) fn model_cost(model: &str) -> Option<(Decimal, Decimal)> {
    MODEL_COSTS
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|(_, input, output)| (*input, *output))
}

/// Estimated cost of one call.
pub(crate) fn estimate(cost_per_token: (Decimal, Decimal), input: u32, output: u32) -> Decimal {
    cost_per_token.0 * Decimal::from(input) + cost_per_token.1 * Decimal::from(output)
}
