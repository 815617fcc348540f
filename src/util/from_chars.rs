//! Radix-aware integer parsing for AT response bodies (`+CSQ: 0x1f`-style
//! fields, decimal status codes), tolerant of a leading `0x` regardless of
//! the requested base.

/// Parses `str` as `T` in the given `base`, stripping a leading `0x`/`0X` if
/// present. Returns `None` on any malformed input rather than panicking,
/// since the source is always untrusted modem output.
pub fn from_chars<T: FromStrRadix>(str: &str, base: u32) -> Option<T> {
    let str = str.trim();
    let str = str.strip_prefix("0x").or_else(|| str.strip_prefix("0X")).unwrap_or(str);
    T::from_str_radix(str, base).ok()
}

/// Implemented by the integer types `from_chars` supports.
pub trait FromStrRadix: Sized {
    fn from_str_radix(str: &str, radix: u32) -> Result<Self, std::num::ParseIntError>;
}

macro_rules! impl_from_str_radix {
    ($($t:ty),*) => {
        $(
            impl FromStrRadix for $t {
                fn from_str_radix(str: &str, radix: u32) -> Result<Self, std::num::ParseIntError> {
                    <$t>::from_str_radix(str, radix)
                }
            }
        )*
    };
}

impl_from_str_radix!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal() {
        assert_eq!(from_chars::<u32>("42", 10), Some(42));
    }

    #[test]
    fn parses_hex_with_0x_prefix_regardless_of_base() {
        assert_eq!(from_chars::<u32>("0x1f", 10), Some(31));
        assert_eq!(from_chars::<u32>("0x1f", 16), Some(31));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(from_chars::<u32>("not a number", 10), None);
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(from_chars::<i32>("  -7 ", 10), Some(-7));
    }
}
