use super::*;

#[test]
fn test_format_number_comma() {
    let options = NumberFormatOptions {
        use_comma: true,
        use_human: false,
        locale: "en".to_string(),
        decimal_places: 2,
    };

    assert_eq!(format_number(1000u64, &options), "1,000");
    assert_eq!(format_number(1000000u64, &options), "1,000,000");
    assert_eq!(format_number(123u64, &options), "123");
}

#[test]
fn test_format_number_human() {
    let options = NumberFormatOptions {
        use_comma: false,
        use_human: true,
        locale: "en".to_string(),
        decimal_places: 1,
    };

    assert_eq!(format_number(100u64, &options), "100");
    assert_eq!(format_number(1500u64, &options), "1.5k");
    assert_eq!(format_number(1_500_000u64, &options), "1.5m");
    assert_eq!(format_number(1_500_000_000u64, &options), "1.5b");
    assert_eq!(format_number(1_500_000_000_000u64, &options), "1.5t");
}

#[test]
fn test_format_number_plain() {
    let options = NumberFormatOptions {
        use_comma: false,
        use_human: false,
        locale: "en".to_string(),
        decimal_places: 2,
    };

    assert_eq!(format_number(1000u64, &options), "1000");
}

#[test]
fn test_format_signed() {
    let options = NumberFormatOptions::default();
    assert_eq!(format_signed(1500, &options), "1,500");
    assert_eq!(format_signed(-1500, &options), "-1,500");
    assert_eq!(format_signed(0, &options), "0");
}

#[test]
fn test_format_quantity() {
    assert_eq!(format_quantity(0.0, 2), "0");
    assert_eq!(format_quantity(0.18, 2), "0.180");
    assert_eq!(format_quantity(0.00045, 2), "0.000450");
    assert_eq!(format_quantity(12.3456, 2), "12.35");
    assert_eq!(format_quantity(1.0, 1), "1.0");
}

#[test]
fn test_format_duration() {
    assert_eq!(format_duration(Duration::seconds(42)), "42s");
    assert_eq!(format_duration(Duration::seconds(750)), "12m 30s");
    assert_eq!(format_duration(Duration::seconds(3900)), "1h 05m");
    assert_eq!(format_duration(Duration::seconds(-5)), "0s");
}
