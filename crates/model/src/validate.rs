use once_cell::sync::Lazy;
use regex::Regex;

/// 11-digit mobile numbers: 09 followed by a recognized operator prefix.
static MOBILE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^09(1[0-9]|3[0-9]|2[0-9]|0[1-9]|9[0-9])[0-9]{7}$")
        .expect("mobile number pattern is valid")
});

pub fn is_valid_mobile_number(number: &str) -> bool {
    MOBILE_NUMBER.is_match(number)
}
