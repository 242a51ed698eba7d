//! Exact text encoding of `f64` in C99 `%a` notation.

const MANTISSA_BITS: u32 = 52;
const MANTISSA_MASK: u64 = (1 << MANTISSA_BITS) - 1;
const EXPONENT_BIAS: i32 = 1023;

/// Format `value` the way C's `printf("%a")` does.
pub fn format(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    let sign = if value.is_sign_negative() { "-" } else { "" };
    if value.is_infinite() {
        return format!("{sign}inf");
    }
    if value == 0.0 {
        return format!("{sign}0x0p+0");
    }

    let bits = value.to_bits();
    let biased = ((bits >> MANTISSA_BITS) & 0x7ff) as i32;
    let mantissa = bits & MANTISSA_MASK;
    let (lead, exponent) = if biased == 0 {
        (0, 1 - EXPONENT_BIAS)
    } else {
        (1, biased - EXPONENT_BIAS)
    };

    let digits = format!("{mantissa:013x}");
    let digits = digits.trim_end_matches('0');
    if digits.is_empty() {
        format!("{sign}0x{lead}p{exponent:+}")
    } else {
        format!("{sign}0x{lead}.{digits}p{exponent:+}")
    }
}

/// Parse `%a` notation plus `inf`/`nan`. Returns `None` for anything else.
pub fn parse(text: &str) -> Option<f64> {
    let text = text.trim();
    let (negative, body) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let signed = |v: f64| if negative { -v } else { v };

    let lower = body.to_ascii_lowercase();
    if lower == "inf" || lower == "infinity" {
        return Some(signed(f64::INFINITY));
    }
    if lower == "nan" {
        return Some(f64::NAN);
    }

    let hex = lower.strip_prefix("0x")?;
    let (digits, exponent) = hex.split_once('p')?;
    let exponent: i32 = exponent.parse().ok()?;
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }

    let mut mantissa: u64 = 0;
    let mut significant = 0;
    for c in whole.chars().chain(fraction.chars()) {
        let digit = c.to_digit(16)?;
        if mantissa != 0 || digit != 0 {
            significant += 1;
        }
        // 14 hex digits cover every finite f64 exactly
        if significant > 14 {
            return None;
        }
        mantissa = (mantissa << 4) | u64::from(digit);
    }

    let shift = exponent.checked_sub(4 * fraction.len() as i32)?;
    Some(signed(scale(mantissa as f64, shift)))
}

/// `value * 2^exponent` without overflowing the intermediate power.
fn scale(mut value: f64, mut exponent: i32) -> f64 {
    const STEP: i32 = 1000;
    while exponent > STEP {
        value *= 2f64.powi(STEP);
        exponent -= STEP;
    }
    while exponent < -STEP {
        value *= 2f64.powi(-STEP);
        exponent += STEP;
    }
    value * 2f64.powi(exponent)
}
