// Compile-time literals for token amounts. Rust can't write `1_000e6` as an
// integer literal, so these macros parse float-looking literals and expand
// them to exact 256-bit integers.

use ethers::types::U256;
use proc_macro::TokenStream;
use quote::quote;
use syn::{
    parse::{Parse, ParseStream},
    parse_macro_input, LitFloat, LitInt, Result, Token,
};

struct Number {
    digits: String,
}

impl Parse for Number {
    /// This parser uses the LitFloat and LitInt parsers to clean the input.
    fn parse(input: ParseStream) -> Result<Self> {
        let digits = if input.peek(LitFloat) {
            input.parse::<LitFloat>()?.base10_digits().to_string()
        } else if input.peek(LitInt) {
            input.parse::<LitInt>()?.base10_digits().to_string()
        } else {
            return Err(input.error("expected a float or an integer"));
        };
        Ok(Self { digits })
    }
}

impl Number {
    /// Splits the literal into its integer mantissa, the number of digits
    /// after the dot, and the exponent.
    fn split(&self) -> (U256, usize, usize) {
        let mut found_dot = false;
        let mut found_e = false;
        let mut mantissa = U256::zero();
        let mut exponent = 0_usize;
        let mut fraction_digits = 0_usize;
        for digit in self.digits.chars() {
            match digit {
                '0'..='9' => {
                    let d = digit.to_digit(10).unwrap();
                    if found_e {
                        exponent = exponent * 10 + d as usize;
                    } else {
                        mantissa = mantissa * 10 + d;
                        if found_dot {
                            fraction_digits += 1;
                        }
                    }
                }
                'e' if !found_e => found_e = true,
                '.' if !found_dot && !found_e => found_dot = true,
                _ => panic!("unexpected character in amount literal: {}", digit),
            }
        }
        (mantissa, fraction_digits, exponent)
    }

    /// Scales the literal by `10^shift` and requires the result to be an
    /// integer.
    fn to_u256(&self, shift: usize) -> U256 {
        let (mantissa, fraction_digits, exponent) = self.split();
        let exponent = exponent + shift;
        if exponent < fraction_digits {
            panic!(
                "amount literal {} has more fractional digits than its exponent allows",
                self.digits
            );
        }
        mantissa * U256::from(10).pow(U256::from(exponent - fraction_digits))
    }
}

/// A literal followed by the number of decimals of the token it is
/// denominated in, e.g. `units!(1_000.5, 6)`.
struct Units {
    amount: Number,
    decimals: usize,
}

impl Parse for Units {
    fn parse(input: ParseStream) -> Result<Self> {
        let amount = input.parse::<Number>()?;
        input.parse::<Token![,]>()?;
        let decimals = input.parse::<LitInt>()?.base10_parse::<usize>()?;
        Ok(Self { amount, decimals })
    }
}

fn expand_u256(value: U256) -> proc_macro2::TokenStream {
    let bytes: [u8; 32] = value.into();
    quote!(ethers::types::U256::from([ #(#bytes),* ]))
}

#[proc_macro]
pub fn uint256(input: TokenStream) -> TokenStream {
    let number = parse_macro_input!(input as Number);
    expand_u256(number.to_u256(0)).into()
}

#[proc_macro]
pub fn fixed(input: TokenStream) -> TokenStream {
    let number = parse_macro_input!(input as Number);
    let bytes: [u8; 32] = number.to_u256(0).into();
    quote!(FixedPoint::from([ #(#bytes),* ])).into()
}

/// Expands to the raw `U256` amount of a token with the given decimals:
/// `units!(2.5, 6) == U256::from(2_500_000)`.
#[proc_macro]
pub fn units(input: TokenStream) -> TokenStream {
    let Units { amount, decimals } = parse_macro_input!(input as Units);
    expand_u256(amount.to_u256(decimals)).into()
}
