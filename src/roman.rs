//! Roman numeral rendering for subarticle titles.
//!
//! Digit-by-digit conversion following the Mozilla nsBulletFrame algorithm.
//! Ordinals outside 1..=3999 fall back to decimal.

const CHARS_A: [char; 4] = ['I', 'X', 'C', 'M'];
const CHARS_B: [char; 3] = ['V', 'L', 'D'];

pub fn roman_ordinal(ordinal: u32) -> String {
    let dec = ordinal.to_string();

    if !(1..=3999).contains(&ordinal) {
        return dec;
    }

    let mut result = String::new();
    let mut roman_pos = dec.len();

    for digit in dec.chars() {
        roman_pos -= 1;

        match digit {
            '1'..='3' => {
                let count = digit as usize - '0' as usize;
                for _ in 0..count {
                    result.push(CHARS_A[roman_pos]);
                }
            }
            '4' => {
                result.push(CHARS_A[roman_pos]);
                result.push(CHARS_B[roman_pos]);
            }
            '5'..='8' => {
                result.push(CHARS_B[roman_pos]);
                let count = digit as usize - '5' as usize;
                for _ in 0..count {
                    result.push(CHARS_A[roman_pos]);
                }
            }
            '9' => {
                result.push(CHARS_A[roman_pos]);
                result.push(CHARS_A[roman_pos + 1]);
            }
            _ => {}
        }
    }

    result
}
