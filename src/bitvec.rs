//! This module contains convenience functions for turning MPSSE operand bytes
//! into the bit sequences clocked onto the JTAG lines.

/// Convert the low `n` bits of a byte to a Vec of bool, least-significant-bit first.
///
/// MPSSE bit counts can exceed the width of the operand byte; any bits
/// requested past bit 7 are 0, as the byte has been shifted out.
pub fn byte_to_bits(byte: u8, n: usize) -> Vec<bool> {
    (0..n).map(|idx| idx < 8 && (byte >> idx) & 1 == 1).collect()
}

/// Render a bit sequence as a string of '0'/'1' characters, in order.
pub fn bits_to_string(bits: &[bool]) -> String {
    bits.iter().map(|&b| if b { '1' } else { '0' }).collect()
}

/// Convenience macro for creating a &[bool] from &[u8] of 0/1.
macro_rules! bv {
    ($($x:expr),*) => {
        &[ $(($x != 0),)* ] as &[bool]
    }
}

#[test]
fn test_byte_to_bits() {
    assert_eq!(byte_to_bits(0x00, 0),  bv![]);
    assert_eq!(byte_to_bits(0x05, 3),  bv![1, 0, 1]);
    assert_eq!(byte_to_bits(0x80, 8),  bv![0, 0, 0, 0, 0, 0, 0, 1]);
    assert_eq!(byte_to_bits(0xFF, 10), bv![1, 1, 1, 1, 1, 1, 1, 1, 0, 0]);
}
