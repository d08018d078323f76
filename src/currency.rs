//! Display strings for money amounts.

use std::sync::OnceLock;

use numfmt::{Formatter, Precision};

/// Format `number` as dollars with two decimal places, e.g. "-$1,234.50".
pub fn format_currency(number: f64) -> String {
    if number < 0.0 {
        format!("-{}", format_magnitude(number.abs()))
    } else {
        format_magnitude(number)
    }
}

/// Format a transaction amount from the account holder's point of view.
///
/// Plaid amounts are positive when money leaves the account, so positive
/// amounts are rendered with a minus sign and negative amounts with a plus.
pub fn format_transaction_amount(amount: f64) -> String {
    if amount > 0.0 {
        format!("-{}", format_magnitude(amount))
    } else {
        format!("+{}", format_magnitude(amount.abs()))
    }
}

fn format_magnitude(number: f64) -> String {
    static FMT: OnceLock<Formatter> = OnceLock::new();

    let fmt = FMT.get_or_init(|| {
        Formatter::currency("$")
            .expect("the currency prefix is valid")
            .precision(Precision::Decimals(2))
    });

    // Zero is hardcoded as "0", so we must specify the formatted string for zero
    if number == 0.0 {
        return "$0.00".to_owned();
    }

    let mut formatted_string = fmt.fmt_string(number);

    // numfmt drops trailing zeros, e.g. "12.30" is rendered as "12.3".
    match formatted_string.rfind('.') {
        None => formatted_string.push_str(".00"),
        Some(point) if formatted_string.len() - point == 2 => formatted_string.push('0'),
        Some(_) => {}
    }

    formatted_string
}

#[cfg(test)]
mod tests {
    use super::{format_currency, format_transaction_amount};

    #[test]
    fn zero() {
        assert_eq!(format_currency(0.0), "$0.00");
    }

    #[test]
    fn pads_to_two_decimal_places() {
        assert_eq!(format_currency(12.5), "$12.50");
        assert_eq!(format_currency(-3.0), "-$3.00");
    }

    #[test]
    fn transaction_amounts_flip_sign() {
        assert_eq!(format_transaction_amount(4.25), "-$4.25");
        assert_eq!(format_transaction_amount(-100.0), "+$100.00");
    }
}
