//! PMBus command codes and numeric data formats.

/// Standard PMBus command codes used on this board.
pub mod cmd {
    pub const PAGE: u8 = 0x00;
    pub const OPERATION: u8 = 0x01;
    pub const ON_OFF_CONFIG: u8 = 0x02;
    pub const CLEAR_FAULTS: u8 = 0x03;
    pub const WRITE_PROTECT: u8 = 0x10;
    pub const READ_VIN: u8 = 0x88;
    pub const READ_IIN: u8 = 0x89;
    pub const READ_VOUT: u8 = 0x8b;
    pub const READ_IOUT: u8 = 0x8c;
    pub const READ_TEMPERATURE_1: u8 = 0x8d;
    pub const READ_TEMPERATURE_2: u8 = 0x8e;
}

/// Decode a Linear11 word: 5-bit two's complement exponent in bits 15..11,
/// 11-bit two's complement mantissa in bits 10..0.
pub fn l11_to_float(word: u16) -> f32 {
    // Shift the fields to the top of a signed integer, then shift back to
    // sign extend.
    let exponent = ((word as i16) >> 11) as i32;
    let mantissa = (((word << 5) as i16) >> 5) as i32;
    mantissa as f32 * 2.0_f32.powi(exponent)
}

/// Decode a Linear16 word with the fixed exponent -12 used by VOUT_MODE on
/// the regulators of this board.
pub fn l16_to_float(word: u16) -> f32 {
    f32::from(word) * 2.0_f32.powi(-12)
}

/// Word value of a PMBus read, low byte first on the wire.
pub fn word(data: [u8; 2]) -> u16 {
    u16::from_le_bytes(data)
}
