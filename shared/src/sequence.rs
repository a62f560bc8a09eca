//! Advisory code generators for SKUs and invoice numbers
//!
//! Values are not reserved. Uniqueness is enforced by the store at write time.

/// Width of generated SKUs
pub const SKU_WIDTH: usize = 10;

/// Digits of the largest purely numeric code among `codes`, without leading zeros.
///
/// Codes are compared as digit strings, so values wider than any integer type still count.
pub fn max_numeric_code<'a, I>(codes: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    codes
        .into_iter()
        .filter(|code| !code.is_empty() && code.bytes().all(|b| b.is_ascii_digit()))
        .map(|code| match code.trim_start_matches('0') {
            "" => "0",
            digits => digits,
        })
        .max_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
        .map(str::to_string)
}

/// Adds one to a decimal digit string
fn increment(digits: &str) -> String {
    let mut out: Vec<u8> = digits.bytes().collect();
    for digit in out.iter_mut().rev() {
        if *digit == b'9' {
            *digit = b'0';
        } else {
            *digit += 1;
            return String::from_utf8_lossy(&out).into_owned();
        }
    }
    format!("1{}", String::from_utf8_lossy(&out))
}

/// Smallest code strictly above every numeric code, zero padded to `width`
pub fn next_numeric_code<'a, I>(codes: I, width: usize) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let next = max_numeric_code(codes)
        .map(|digits| increment(&digits))
        .unwrap_or_else(|| "1".to_string());
    format!("{:0>width$}", next, width = width)
}

pub fn next_sku<'a, I>(skus: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    next_numeric_code(skus, SKU_WIDTH)
}

pub fn next_invoice_number<'a, I>(invoices: I, width: usize) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    next_numeric_code(invoices, width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_sku_skips_non_numeric() {
        let skus = ["A1", "0000000041", "17", "X-99", ""];
        assert_eq!(next_sku(skus), "0000000042");
    }

    #[test]
    fn test_next_sku_on_empty_store() {
        assert_eq!(next_sku(Vec::<&str>::new()), "0000000001");
    }

    #[test]
    fn test_next_sku_past_integer_range() {
        assert_eq!(
            next_sku(["123456789012345678901234", "0000000001"]),
            "123456789012345678901235"
        );
        assert_eq!(next_sku(["99999999999999999999"]), "100000000000000000000");
        assert_eq!(next_sku(["0000000000"]), "0000000001");
    }

    #[test]
    fn test_invoice_width() {
        assert_eq!(next_invoice_number(["000009", "INV-12"], 6), "000010");
        // Values wider than the pad are kept whole
        assert_eq!(next_invoice_number(["9999999"], 6), "10000000");
    }
}
