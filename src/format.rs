use rust_decimal::{Decimal, RoundingStrategy};

/// Plain decimal text for raw exports: full precision, no trailing zeros,
/// never scientific notation.
pub fn format_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

fn group_int_digits(int_part: &str) -> String {
    // Insert commas every 3 digits.
    let mut out = String::with_capacity(int_part.len() + int_part.len() / 3);
    let len = int_part.len();
    for (i, ch) in int_part.chars().enumerate() {
        out.push(ch);
        let remaining = len.saturating_sub(i + 1);
        if remaining > 0 && remaining % 3 == 0 {
            out.push(',');
        }
    }
    out
}

/// Exactly `dp` fraction digits.
fn pad_fraction_to_dp(s: &str, dp: u32) -> String {
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
    if dp == 0 {
        return int_part.to_string();
    }

    let mut frac: String = frac_part.chars().take(dp as usize).collect();
    while frac.len() < dp as usize {
        frac.push('0');
    }
    format!("{int_part}.{frac}")
}

/// USD amount for log and terminal output, e.g. `$1,234,567.50`.
pub fn format_usd(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();

    let s = pad_fraction_to_dp(&rounded.abs().normalize().to_string(), 2);
    let (int_part, frac_part) = s.split_once('.').unwrap_or((&s, "00"));

    let sign = if negative { "-" } else { "" };
    format!("{sign}${}.{frac_part}", group_int_digits(int_part))
}

/// Share in 0..=1 rendered as a percentage with two decimals.
pub fn format_percentage(share: Decimal) -> String {
    let pct = (share * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{}%", pad_fraction_to_dp(&pct.normalize().to_string(), 2))
}
