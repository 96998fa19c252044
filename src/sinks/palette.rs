//! Colors used by the HTML sink

/// An RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const DEBUG: Rgb = Rgb::new(50, 50, 50);
    pub const INFO: Rgb = Rgb::new(0, 0, 0);
    pub const WARNING: Rgb = Rgb::new(255, 127, 0);
    pub const ERROR: Rgb = Rgb::new(128, 0, 0);
    /// Maroon
    pub const STACKTRACE: Rgb = Rgb::new(128, 0, 0);

    /// Uppercase hex without a leading `#`, e.g. `FF7F00`
    pub fn to_hex(&self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_hex() {
        assert_eq!(Rgb::WARNING.to_hex(), "FF7F00");
        assert_eq!(Rgb::DEBUG.to_hex(), "323232");
        assert_eq!(Rgb::INFO.to_hex(), "000000");
        assert_eq!(Rgb::ERROR.to_hex(), "800000");
    }
}
