//! Luhn (mod-10) validation for order numbers.

/// Checks a candidate order number against the Luhn checksum.
///
/// ASCII spaces and hyphens are ignored, so `"4992-7398-716"` and
/// `"49927398716"` validate identically. Anything else that is not a
/// decimal digit fails the check, as does an empty remainder.
pub fn is_valid(number: &str) -> bool {
    let mut sum = 0u32;
    let mut double = false;
    let mut digits = 0usize;

    for ch in number.chars().rev() {
        if ch == ' ' || ch == '-' {
            continue;
        }
        let Some(digit) = ch.to_digit(10) else {
            return false;
        };
        let digit = if double {
            let doubled = digit * 2;
            if doubled > 9 { doubled - 9 } else { doubled }
        } else {
            digit
        };
        sum += digit;
        double = !double;
        digits += 1;
    }

    digits > 0 && sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_numbers() {
        assert!(is_valid("79927398713"));
        assert!(is_valid("49927398716"));
        assert!(is_valid("4561261212345467"));
        assert!(is_valid("0"));
    }

    #[test]
    fn rejects_invalid_checksums() {
        assert!(!is_valid("79927398710"));
        assert!(!is_valid("1234567890"));
        assert!(!is_valid("49927398717"));
    }

    #[test]
    fn separators_do_not_change_the_result() {
        assert!(is_valid("7992 7398 713"));
        assert!(is_valid("4992-7398-716"));
        assert_eq!(is_valid("79927398713"), is_valid("79-92 73 98-713"));
    }

    #[test]
    fn rejects_empty_and_non_digit_input() {
        assert!(!is_valid(""));
        assert!(!is_valid("   "));
        assert!(!is_valid("---"));
        assert!(!is_valid("7992a398713"));
        assert!(!is_valid("order"));
    }
}
